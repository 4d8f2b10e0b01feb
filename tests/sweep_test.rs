//! Integration tests for the deadline sweep and the outbox relay

mod common;

use chrono::{Duration, Utc};

use std::sync::atomic::Ordering;

use brgy_events::lifecycle::{SweepReport, TransitionEvent};
use brgy_events::models::notification::NoticeKind;
use brgy_events::models::outbox::OutboxEvent;
use brgy_events::models::proposal::{Proposal, ProposalStatus, VoteChoice};
use brgy_events::store::{new_id, Store};
use common::*;

#[tokio::test]
async fn test_sweep_declines_pending_past_deadline() {
    let app = setup().await;
    let yesterday = local_today(Utc::now()) - Duration::days(1);
    app.store
        .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Pending, yesterday))
        .await;

    let report = app.manager.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            declined: 1,
            completed: 0,
            failed: 0
        }
    );

    let p = app.proposal("p1").await;
    assert_eq!(p.status, ProposalStatus::DeclinedMissedDeadline);
    assert!(!p.notified);
    // Nothing is sent until the relay runs.
    assert!(app.store.notifications_for(STAFF_1).await.is_empty());
}

#[tokio::test]
async fn test_sweep_twice_changes_nothing_more() {
    let app = setup().await;
    let yesterday = local_today(Utc::now()) - Duration::days(1);
    app.store
        .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Pending, yesterday))
        .await;

    app.manager.sweep_expired(Utc::now()).await.unwrap();
    let after_first = app.proposal("p1").await;
    let events = app.store.events().await.len();

    let second = app.manager.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(second, SweepReport::default());
    assert_eq!(app.proposal("p1").await, after_first);
    assert_eq!(app.store.events().await.len(), events);
}

#[tokio::test]
async fn test_sweep_leaves_voted_and_future_proposals() {
    let app = setup().await;
    let today = local_today(Utc::now());

    let mut voted = stored_proposal("voted", STAFF_1, ProposalStatus::Pending, today - Duration::days(2));
    voted.votes.cast(OFFICIAL_1, VoteChoice::Approve);
    app.store.put_proposal(voted).await;
    app.store
        .put_proposal(stored_proposal("future", STAFF_1, ProposalStatus::Pending, today + Duration::days(3)))
        .await;

    let report = app.manager.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(report.declined, 0);
    assert_eq!(app.proposal("voted").await.status, ProposalStatus::Pending);
    assert_eq!(app.proposal("future").await.status, ProposalStatus::Pending);
}

#[tokio::test]
async fn test_sweep_completes_finished_events_silently() {
    let app = setup().await;
    let yesterday = local_today(Utc::now()) - Duration::days(1);
    app.store
        .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Approved, yesterday))
        .await;

    let report = app.manager.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(report.completed, 1);

    let p = app.proposal("p1").await;
    assert_eq!(p.status, ProposalStatus::Done);
    assert!(p.completed_date.is_some());
    assert!(p.notified);
    assert!(app.store.events().await.is_empty());
}

#[tokio::test]
async fn test_relay_delivers_swept_decline_once() {
    let app = setup().await;
    let yesterday = local_today(Utc::now()) - Duration::days(1);
    app.store
        .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Pending, yesterday))
        .await;
    app.manager.sweep_expired(Utc::now()).await.unwrap();

    let report = app.relay.drain(Utc::now(), 50).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.pending, 0);

    let owner = app.store.notifications_for(STAFF_1).await;
    assert_eq!(owner.len(), 1);
    assert_eq!(owner[0].data.kind, NoticeKind::MissedDeadline);
    assert_eq!(owner[0].title, "Proposal Declined");
    assert!(app.proposal("p1").await.notified);
    assert_eq!(app.store.emails().await.len(), 1);

    let again = app.relay.drain(Utc::now(), 50).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(app.store.notifications_for(STAFF_1).await.len(), 1);
}

#[tokio::test]
async fn test_relay_skips_recipients_already_served() {
    let app = setup().await;
    let yesterday = local_today(Utc::now()) - Duration::days(1);
    app.store
        .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Pending, yesterday))
        .await;
    app.manager.sweep_expired(Utc::now()).await.unwrap();

    // Same event processed twice, as after a crash before it was marked done.
    let event = app.store.events().await.remove(0);
    let first = app.relay.process(&event, Utc::now()).await.unwrap();
    let second = app.relay.process(&event, Utc::now()).await.unwrap();

    assert_eq!(first.persisted, 1);
    assert_eq!(second.persisted, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(app.store.notifications_for(STAFF_1).await.len(), 1);
    assert_eq!(app.store.emails().await.len(), 1);
}

#[tokio::test]
async fn test_relay_sets_notified_after_a_neutral_vote() {
    let app = setup().await;
    // Written but never announced, as after a crash right after the insert.
    let p = Proposal::from_draft(new_id(), STAFF_1, draft(5), Utc::now());
    let event = OutboxEvent::new(new_id(), &p.id, NoticeKind::NewPending, p.revision, Utc::now());
    app.store.insert_proposal(&p, &event).await.unwrap();

    let outcome = app
        .manager
        .apply_transition(
            &p.id,
            TransitionEvent::Vote { choice: VoteChoice::Approve },
            &app.actor(OFFICIAL_1),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.proposal.status, ProposalStatus::Pending);
    assert!(outcome.proposal.revision > p.revision);

    let report = app.relay.drain(Utc::now(), 50).await.unwrap();
    assert_eq!(report.processed, 1);

    let stored = app.proposal(&p.id).await;
    assert_eq!(stored.status, ProposalStatus::Pending);
    assert!(stored.notified);
    assert_eq!(app.store.notifications_for(OFFICIAL_1).await.len(), 1);
    assert_eq!(app.store.notifications_for(OFFICIAL_2).await.len(), 1);
}

#[tokio::test]
async fn test_stale_event_leaves_notified_to_the_newer_status() {
    let app = setup().await;
    let p = Proposal::from_draft(new_id(), STAFF_1, draft(5), Utc::now());
    let event = OutboxEvent::new(new_id(), &p.id, NoticeKind::NewPending, p.revision, Utc::now());
    app.store.insert_proposal(&p, &event).await.unwrap();

    // The decision lands and is announced while the old event is still open.
    app.manager
        .apply_transition(&p.id, TransitionEvent::Decline, &app.actor(ADMIN), Utc::now())
        .await
        .unwrap();
    let mut declined = app.proposal(&p.id).await;
    declined.notified = false;
    app.store.put_proposal(declined).await;

    app.relay.drain(Utc::now(), 50).await.unwrap();
    assert!(!app.proposal(&p.id).await.notified);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_relays_deliver_each_notice_once() {
    for _ in 0..25 {
        let app = setup().await;
        let yesterday = local_today(Utc::now()) - Duration::days(1);
        app.store
            .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Pending, yesterday))
            .await;
        app.manager.sweep_expired(Utc::now()).await.unwrap();
        let event = app.store.events().await.remove(0);

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let relay = app.relay.clone();
                let event = event.clone();
                tokio::spawn(async move { relay.process(&event, Utc::now()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(app.store.notifications_for(STAFF_1).await.len(), 1);
        assert_eq!(app.store.emails().await.len(), 1);
    }
}

#[tokio::test]
async fn test_failed_email_retries_without_repeating_the_notice() {
    let app = setup_faulty().await;
    let yesterday = local_today(Utc::now()) - Duration::days(1);
    app.store
        .inner
        .put_proposal(stored_proposal("p1", STAFF_1, ProposalStatus::Pending, yesterday))
        .await;
    app.manager.sweep_expired(Utc::now()).await.unwrap();

    app.store.fail_enqueue.store(true, Ordering::SeqCst);
    let first = app.relay.drain(Utc::now(), 50).await.unwrap();
    assert_eq!(first.processed, 0);
    assert_eq!(first.pending, 1);
    assert_eq!(app.store.inner.notifications_for(STAFF_1).await.len(), 1);
    assert!(app.store.inner.emails().await.is_empty());
    assert!(!app.store.get_proposal("p1").await.unwrap().unwrap().notified);

    app.store.fail_enqueue.store(false, Ordering::SeqCst);
    let second = app.relay.drain(Utc::now(), 50).await.unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(app.store.inner.notifications_for(STAFF_1).await.len(), 1);
    assert_eq!(app.store.inner.emails().await.len(), 1);
    assert!(app.store.get_proposal("p1").await.unwrap().unwrap().notified);
}
