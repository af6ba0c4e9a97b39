//! Rento backend server
//!
//! Booking core for short-term apartment rentals: pricing, availability,
//! the booking lifecycle and smart-lock access behind one HTTP API.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use rento_api::{configure_routes, AppState};
use rento_auth::{JwtService, WebhookVerifier};
use rento_core::{AppConfig, Clock, OperatingHours, SystemClock};
use rento_db::{create_pool, run_migrations, MemoryStore, Stores};
use rento_gateways::Gateways;
use rento_services::{
    AvailabilityEngine, BookingService, ChannelPublisher, EventDispatcher, LockAccessService,
    PricingEngine,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rento={lvl},rento_api={lvl},rento_services={lvl},rento_db={lvl},rento_gateways={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();
    }
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.database.is_memory() {
        warn!("Using the in-memory store; data is lost on restart");
        return Ok(Stores::memory(&MemoryStore::new()));
    }

    info!("Connecting to database...");
    let pool = create_pool(&config.database).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
        info!("Migrations applied");
    }
    Ok(Stores::postgres(pool))
}

/// Periodically start due bookings and close finished ones
fn spawn_sweeper(bookings: Arc<BookingService>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match bookings.activate_due().await {
                Ok(0) => {}
                Ok(n) => info!(activated = n, "Sweep activated bookings"),
                Err(e) => error!("Activation sweep failed: {}", e),
            }
            match bookings.complete_expired().await {
                Ok(0) => {}
                Ok(n) => info!(completed = n, "Sweep completed bookings"),
                Err(e) => error!("Completion sweep failed: {}", e),
            }
        }
    });
}

fn cors(origins: &str) -> Cors {
    let origins: Vec<String> = origins.split(',').map(|o| o.trim().to_string()).collect();
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            origin
                .to_str()
                .map(|o| origins.iter().any(|allowed| allowed == o))
                .unwrap_or(false)
        })
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting Rento v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;
    let hours = OperatingHours::from_config(&config.booking)?;
    info!(
        timezone = %config.booking.timezone,
        open = config.booking.open_hour,
        close = config.booking.close_hour,
        "Operating hours"
    );

    let stores = open_stores(&config).await?;
    let gateways = Gateways::from_config(&config.gateways)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let lock_access = Arc::new(LockAccessService::new(
        &stores,
        gateways.lock_vendor.clone(),
        clock.clone(),
        &config.booking,
        &config.gateways,
    ));

    let (publisher, events) = ChannelPublisher::channel();
    let dispatcher = Arc::new(EventDispatcher::new(
        lock_access.clone(),
        gateways.notifications.clone(),
    ));
    tokio::spawn(dispatcher.run(events));

    let pricing = Arc::new(PricingEngine::new(
        stores.settings.clone(),
        hours.clone(),
        &config.booking,
    ));
    let availability = Arc::new(AvailabilityEngine::new(
        stores.apartments.clone(),
        stores.bookings.clone(),
        clock.clone(),
        hours,
        &config.booking,
    ));
    let bookings = Arc::new(BookingService::new(
        &stores,
        pricing.clone(),
        availability.clone(),
        gateways.payments.clone(),
        Arc::new(publisher),
        clock.clone(),
        &config.booking,
        &config.gateways,
    ));

    spawn_sweeper(
        bookings.clone(),
        Duration::from_secs(config.booking.sweep_interval_secs.max(1)),
    );

    let webhooks = WebhookVerifier::new(config.gateways.webhook_secret.as_deref());
    if !webhooks.is_configured() {
        warn!("No webhook secret configured; lock telemetry pushes will be refused");
    }

    let state = AppState {
        bookings,
        availability,
        pricing,
        lock_access,
        clock,
        webhooks,
    };
    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    ));

    let bind_addr = config.server_addr();
    let cors_origins = config.server.cors_origins.clone();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .wrap(cors(&cors_origins))
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(config.server.workers)
    .client_request_timeout(Duration::from_secs(config.server.timeout_secs))
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
