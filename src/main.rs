use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};

use brgy_events::config::AppConfig;
use brgy_events::handlers::{self, AppState};
use brgy_events::lifecycle::LifecycleManager;
use brgy_events::notifications::live::LiveAlerts;
use brgy_events::notifications::relay::OutboxRelay;
use brgy_events::notifications::{scheduler, Dispatcher};
use brgy_events::store::postgres::PgStore;
use brgy_events::store::Store;
use brgy_events::db;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().map_err(std::io::Error::other)?;
    let offset = config.timezone_offset().map_err(std::io::Error::other)?;

    let pool = db::init_pool(&config.database_url, config.max_connections)
        .await
        .map_err(std::io::Error::other)?;
    db::run_migrations(&pool).await.map_err(std::io::Error::other)?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let dispatcher = Dispatcher::new(store.clone(), LiveAlerts::new(), config.notification_ttl(), offset);
    let relay = OutboxRelay::new(store.clone(), dispatcher.clone());
    let manager = LifecycleManager::new(store.clone(), relay.clone(), offset);

    // Sweeps, outbox drain and reminders every SWEEP_INTERVAL_SECS
    scheduler::spawn_scheduler(
        manager.clone(),
        relay,
        Duration::from_secs(config.sweep_interval_secs),
    );

    let state = web::Data::new(AppState {
        store,
        manager,
        dispatcher,
    });

    log::info!("Starting server at http://{}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
