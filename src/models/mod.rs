pub mod catalog;
pub mod item;
pub mod job;
pub mod verdict;

pub use catalog::{Catalog, CatalogEntry};
pub use item::{IndexedItem, LineItem};
pub use job::{BatchJob, BatchResult, JobEvent, JobProgress, JobStatus};
pub use verdict::{AuditSummary, AuditVerdict, MatchedVerdict, PriceFlag, Severity, UnmatchedVerdict};
