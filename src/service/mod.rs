pub mod audit;
pub mod auditor;
pub mod cache;
pub mod classifier;
pub mod matcher;
pub mod queue;

pub use audit::{AuditEngine, BatchAudit, CatalogSnapshot, ItemAuditor};
pub use auditor::AuditService;
pub use cache::{CacheBackend, CacheEntry, CacheSplit, CacheStats, MemoryBackend, ResultCache};
pub use matcher::MatchStrategy;
pub use queue::{JobHandle, JobOutcome, JobQueue, QueueStats};
