use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pipeline_coordinator::agents::approvals::{ApprovalSource, AutoApprove, PendingApprovals};
use pipeline_coordinator::agents::audit::AuditRecorder;
use pipeline_coordinator::agents::manager::WorkflowCoordinator;
use pipeline_coordinator::api::{self, AppState};
use pipeline_coordinator::config::CoordinatorConfig;
use pipeline_coordinator::infrastructure::repositories::PostgresAuditRepository;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CoordinatorConfig::from_env().expect("Invalid configuration");

    // Audit trail, mirrored to Postgres when configured
    let audit = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");
            let repository = PostgresAuditRepository::new(pool);
            repository
                .migrate()
                .await
                .expect("Failed to run migrations");
            tracing::info!("Database connected successfully");
            AuditRecorder::with_repository(config.audit_capacity, Arc::new(repository))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, audit trail is kept in memory only");
            AuditRecorder::new(config.audit_capacity)
        }
    };

    let pending = Arc::new(PendingApprovals::new());
    let approvals: Arc<dyn ApprovalSource> = if config.auto_approve {
        tracing::warn!("COORDINATOR_AUTO_APPROVE is set, human approval is skipped");
        Arc::new(AutoApprove)
    } else {
        Arc::clone(&pending) as Arc<dyn ApprovalSource>
    };

    let coordinator = Arc::new(WorkflowCoordinator::from_config(
        &config,
        approvals,
        Arc::new(audit),
    ));

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = api::router(AppState {
        coordinator,
        approvals: pending,
    })
    .layer(TraceLayer::new_for_http())
    .layer(cors);

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed");
}
