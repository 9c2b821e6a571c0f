//! Infrastructure layer: persistence, the transactional inventory engine,
//! reconciliation jobs, collaborator sinks and configuration.

pub mod config;
pub mod engine;
pub mod reconciliation;
pub mod scheduler;
pub mod sinks;
pub mod store;

pub use engine::{CoreSettings, InventoryCore};
pub use reconciliation::{ExpiredSweepReport, LowStockReport, SweepOptions};
pub use scheduler::{JobHandle, JobScheduler, RecurringJob, TokioJobScheduler};
pub use store::{InMemoryInventoryStore, InventoryStore, InventoryTx, PostgresInventoryStore};
