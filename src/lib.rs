pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;

pub use config::AppConfig;
pub use error::{AuditError, CacheError, QueueError, StoreError};
pub use service::{AuditEngine, AuditService, JobHandle, JobQueue, ResultCache};
pub use store::load_catalog;
