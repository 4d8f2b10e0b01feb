//! Single pass over the email queue. Schedule it externally (cron, systemd
//! timer) every few minutes.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;

use brgy_events::config::MailConfig;
use brgy_events::db;
use brgy_events::email::relay::SmtpRelay;
use brgy_events::email::Drainer;
use brgy_events::store::postgres::PgStore;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match MailConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let pool = match db::init_pool(&config.database_url, 2).await {
        Ok(p) => p,
        Err(e) => {
            log::error!("Database connection failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let relay = match SmtpRelay::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            log::error!("SMTP setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let drainer = Drainer::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(relay),
        config.mail_from.clone(),
        config.retry,
        config.batch_size,
    );
    match drainer.drain_once(Utc::now()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Email drain failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
