pub mod currency;
pub mod document;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod models;
pub mod publish;
pub mod queue;
pub mod rate;
pub mod source;
pub mod traits;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use document::{DocumentIndex, NodeSelector};
pub use error::AppError;
pub use job::{JobRecord, LifecyclePolicy, Outcome, WorkerConfig};
pub use lifecycle::{JobLifecycleManager, Resolution, ReservedJob};
pub use models::{ExchangeRecord, ExtractionResult};
pub use queue::{QueueHandle, QueueTransport};
pub use rate::RateExtractor;
pub use source::XeCom;
pub use traits::{ExchangeSource, Fetcher, PersistenceSink};
