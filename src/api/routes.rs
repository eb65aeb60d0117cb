use crate::api::handlers::{casual, health, rag};
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Upper bound on request bodies; `add_texts` batches can be large.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn create_router() -> Router<AppState> {
    let rag_routes = Router::new()
        .route("/chat", post(rag::chat))
        .route("/search", post(rag::search))
        .route("/add_texts", post(rag::add_texts))
        .route("/delete_by_index", post(rag::delete_by_index))
        .route("/delete_all", post(rag::delete_all))
        .route(
            "/change_embedding_model",
            post(rag::change_embedding_model),
        )
        .route("/update_text", post(rag::update_text));

    Router::new()
        .nest("/rag", rag_routes)
        .route("/casual/chat", post(casual::casual_chat))
        .route("/health", get(health::health))
}

/// Router with state and the HTTP middleware stack applied.
pub fn build_app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    create_router().layer(middleware).with_state(state)
}
