//! Postgres backends for the job store and the content collaborators.

pub mod content;
pub mod jobs;
pub mod pool;

pub use content::PgContentStore;
pub use jobs::PgJobStore;
pub use pool::{create_pool, run_migrations};
