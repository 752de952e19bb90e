//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, line::LineMessagingAdapter},
    config::{Config, StoreBackend},
    error::ApiError,
    timer::ReminderTimer,
    web::{
        health_handler, late_reminder_handler, list_users_handler, midday_reminder_handler,
        rest::api_doc, state::AppState, unchecked_notice_handler, verify_line_signature,
        webhook_handler,
    },
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use study_tracker_core::{
    ConversationEngine, InMemoryUserStore, MessagingService, ReminderScheduler, UserStore,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the User Store ---
    let store: Arc<dyn UserStore> = match &config.store {
        StoreBackend::Postgres { database_url } => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory user store; all records are lost on restart.");
            Arc::new(InMemoryUserStore::new())
        }
    };

    // --- 3. Initialize the Messaging Adapter ---
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let messenger: Arc<dyn MessagingService> = Arc::new(LineMessagingAdapter::new(
        http_client,
        config.line_api_base.clone(),
        config.line_channel_access_token.clone(),
    ));

    // --- 4. Build the Core Services and Shared AppState ---
    let clock = config.study_day_clock();
    let engine = Arc::new(ConversationEngine::new(store.clone(), messenger.clone(), clock));
    let scheduler = Arc::new(ReminderScheduler::new(store.clone(), messenger, clock));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        store,
        engine,
        scheduler: scheduler.clone(),
    });

    // --- 5. Start the Optional Reminder Timer ---
    let shutdown = CancellationToken::new();
    let timer_handle = if config.reminder_timer_enabled {
        let timer = ReminderTimer::new(scheduler, &config.reminder_times, config.utc_offset);
        Some(tokio::spawn(timer.run(shutdown.clone())))
    } else {
        info!("In-process reminder timer disabled; use the /jobs endpoints.");
        None
    };

    // --- 6. Create the Web Router ---
    // The webhook is the only route that needs the signature check.
    let webhook_routes = Router::new()
        .route("/webhook", post(webhook_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            verify_line_signature,
        ));

    let mut job_routes = Router::new()
        .route("/jobs/unchecked-notice", get(unchecked_notice_handler))
        .route("/jobs/midday-reminder", get(midday_reminder_handler))
        .route("/jobs/late-reminder", get(late_reminder_handler))
        .route("/healthz", get(health_handler));
    if config.expose_user_list {
        job_routes = job_routes.route("/users", get(list_users_handler));
    }

    let api_router = Router::new()
        .merge(webhook_routes)
        .merge(job_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api_doc(config.expose_user_list)),
        );

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 8. Stop Background Work ---
    shutdown.cancel();
    if let Some(handle) = timer_handle {
        if let Err(e) = handle.await {
            warn!("Reminder timer ended abnormally: {}", e);
        }
    }
    info!("Server stopped.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
