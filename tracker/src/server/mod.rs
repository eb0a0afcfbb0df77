//! Reconciliation server
//!
//! Routes, one group per entity type under `/api`:
//! - `GET|POST /api/<entity>`, `GET|PUT|DELETE /api/<entity>/:id`
//! - `POST /api/<entity>/sync/batch`
//! - habit completion and stats, note search, focus summaries
//! - `GET /health`

pub mod handlers;
pub mod reconcile;

pub use reconcile::Reconciler;

use crate::config::API_PREFIX;
use crate::database::{self, Habit, Note, Record, RecordStore, Session, Task};
use crate::domain::{CalendarPolicy, SystemClock};
use crate::error::Result;
use crate::services::settings::ServerSettings;
use axum::routing::{get, post};
use axum::Router;
use handlers::SharedReconciler;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

fn entity_routes<T: Record>() -> Router<SharedReconciler> {
    Router::new()
        .route("/", get(handlers::list::<T>).post(handlers::create::<T>))
        .route(
            "/:id",
            get(handlers::fetch::<T>)
                .put(handlers::update::<T>)
                .delete(handlers::remove::<T>),
        )
        .route("/sync/batch", post(handlers::batch_sync::<T>))
}

fn nest_path<T: Record>() -> String {
    format!("{}/{}", API_PREFIX, T::KIND.route())
}

/// Build the full router around a shared reconciler
pub fn build_router(reconciler: SharedReconciler, enable_cors: bool) -> Router {
    let habits = entity_routes::<Habit>()
        .route("/stats/summary", get(handlers::habit_stats))
        .route("/:id/complete", post(handlers::complete_habit))
        .route("/:id/reset", post(handlers::reset_habit));

    let notes = entity_routes::<Note>().route("/search/query", get(handlers::search_notes));

    let sessions = entity_routes::<Session>()
        .route("/today", get(handlers::today_sessions))
        .route("/stats", get(handlers::focus_stats));

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .nest(&nest_path::<Task>(), entity_routes::<Task>())
        .nest(&nest_path::<Note>(), notes)
        .nest(&nest_path::<Habit>(), habits)
        .nest(&nest_path::<Session>(), sessions)
        .with_state(reconciler);

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http())
}

/// Serve `router` on an already bound listener until the task is dropped
pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
    tracing::info!("Reconciliation server listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

/// Open the server store and run the server with the given settings
pub async fn run(settings: &ServerSettings, policy: CalendarPolicy) -> Result<()> {
    let pool = database::create_pool(&settings.database_path).await?;
    let reconciler = Arc::new(Reconciler::new(
        RecordStore::new(pool),
        Arc::new(SystemClock),
        policy,
    ));

    let router = build_router(reconciler, settings.enable_cors);
    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    serve(listener, router).await
}
