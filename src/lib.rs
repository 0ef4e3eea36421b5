// Content Forge - keyword-to-article generation pipeline with a durable job queue

pub mod agents;
pub mod client;
pub mod config;
pub mod content;
pub mod control;
pub mod db;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod routes;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
