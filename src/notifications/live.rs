use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::models::notification::Notification;

pub type ConnectionMap = Arc<RwLock<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>>;

/// Open websocket sessions keyed by user id. An alert reaches a user only if
/// they have a session open right now; nothing is persisted here.
#[derive(Clone, Default)]
pub struct LiveAlerts {
    connections: ConnectionMap,
}

impl LiveAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut map) = self.connections.write() {
            map.entry(user_id.to_string()).or_default().push(tx);
        }
        rx
    }

    /// Drop closed senders after a session ends.
    pub fn prune(&self, user_id: &str) {
        if let Ok(mut map) = self.connections.write() {
            if let Some(senders) = map.get_mut(user_id) {
                senders.retain(|s| !s.is_closed());
                if senders.is_empty() {
                    map.remove(user_id);
                }
            }
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.connections
            .read()
            .map(|map| map.get(user_id).is_some_and(|s| s.iter().any(|tx| !tx.is_closed())))
            .unwrap_or(false)
    }

    /// Push a notification to every open session of its owner.
    /// Returns whether at least one session received it.
    pub fn alert(&self, notification: &Notification, unread: i64) -> bool {
        let map = match self.connections.read() {
            Ok(m) => m,
            Err(_) => return false,
        };
        let Some(senders) = map.get(&notification.user_id) else {
            return false;
        };
        let msg = serde_json::json!({
            "type": "notification",
            "notification": notification,
            "unread_count": unread,
        })
        .to_string();
        let mut delivered = false;
        for sender in senders {
            delivered |= sender.send(msg.clone()).is_ok();
        }
        delivered
    }

    pub fn send_count_update(&self, user_id: &str, unread: i64) {
        let map = match self.connections.read() {
            Ok(m) => m,
            Err(_) => return,
        };
        if let Some(senders) = map.get(user_id) {
            let msg = serde_json::json!({
                "type": "count_update",
                "unread_count": unread,
            })
            .to_string();
            for sender in senders {
                let _ = sender.send(msg.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{NoticeKind, NotificationData};
    use chrono::{Duration, Utc};

    fn notification(user_id: &str) -> Notification {
        let now = Utc::now();
        Notification {
            id: "n1".into(),
            user_id: user_id.into(),
            title: "t".into(),
            body: "b".into(),
            icon: "/icon.png".into(),
            data: NotificationData {
                proposal_id: "p1".into(),
                kind: NoticeKind::Approved,
                timestamp: now,
                extra: Default::default(),
            },
            read: false,
            deleted: false,
            created_at: now,
            expires_at: now + Duration::days(30),
        }
    }

    #[test]
    fn test_alert_reaches_only_connected_owner() {
        let live = LiveAlerts::new();
        let mut rx = live.register("u1");

        assert!(live.alert(&notification("u1"), 1));
        assert!(!live.alert(&notification("u2"), 1));

        let msg = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["notification"]["data"]["type"], "approved");
        assert_eq!(value["unread_count"], 1);
    }

    #[test]
    fn test_prune_forgets_closed_sessions() {
        let live = LiveAlerts::new();
        let rx = live.register("u1");
        assert!(live.is_connected("u1"));
        drop(rx);
        live.prune("u1");
        assert!(!live.is_connected("u1"));
    }
}
