pub mod email_queue;
pub mod notification;
pub mod outbox;
pub mod proposal;
pub mod user;
