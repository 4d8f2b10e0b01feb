pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod notifications;
pub mod store;
pub mod templates_structs;
