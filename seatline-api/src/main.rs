use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seatline_api::{app, state::{AppState, AuthConfig}, worker};
use seatline_booking::{
    BookingOrchestrator, BookingRules, GatewayRegistry, PaymentReconciler, PaymentUrls, Repositories,
    SeatBroadcaster,
};
use seatline_store::{
    app_config::Config, DbClient, PgBookingRepository, PgPaymentRepository, PgSeatStore,
    PgTicketRepository, PgTripRepository, RedisClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "seatline_api=debug,seatline_booking=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Seatline API on port {}", config.server.port);

    // Postgres Connection
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis Connection
    let redis = Arc::new(
        RedisClient::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?,
    );

    let repos = Repositories {
        trips: Arc::new(PgTripRepository::new(db.pool.clone())),
        seats: Arc::new(PgSeatStore::new(db.pool.clone())),
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        payments: Arc::new(PgPaymentRepository::new(db.pool.clone())),
        tickets: Arc::new(PgTicketRepository::new(db.pool.clone())),
    };

    // Booking core
    let rules = BookingRules::from_config(&config.business_rules, &config.payments.currency);
    let orchestrator = Arc::new(BookingOrchestrator::new(repos.clone(), redis.clone(), rules));

    let gateways = Arc::new(GatewayRegistry::from_config(&config.payments));
    let reconciler = Arc::new(PaymentReconciler::new(
        repos.payments.clone(),
        gateways,
        orchestrator.clone(),
        PaymentUrls {
            return_url_base: config.payments.return_url_base.clone(),
            webhook_url_base: config.payments.webhook_url_base.clone(),
        },
    ));

    let broadcaster = SeatBroadcaster::new(redis.clone(), config.business_rules.viewer_buffer);

    // Background expiry sweep
    let shutdown = CancellationToken::new();
    let sweeper = worker::start_expiry_worker(
        orchestrator.clone(),
        config.business_rules.sweep_interval(),
        shutdown.clone(),
    );

    let app_state = AppState {
        orchestrator,
        reconciler,
        broadcaster,
        rate_limiter: redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        business_rules: config.business_rules.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("Server error")?;

    shutdown.cancel();
    sweeper.await.context("Expiry worker panicked")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
    shutdown.cancel();
}
