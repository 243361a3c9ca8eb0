use std::future::Future;
use std::num::ParseFloatError;

use crate::document::NodeSelector;
use crate::error::AppError;
use crate::models::ExchangeRecord;

/// Fetches the raw bytes of a page.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// A web page that publishes exchange rates.
///
/// Each source knows where its page lives, which node carries the rate and
/// how to turn that node's text into a number.
pub trait ExchangeSource: Send + Sync + Clone {
    /// Short identifier used in logs and stored records.
    fn name(&self) -> &str;

    fn build_url(&self, from: &str, to: &str) -> String;

    fn selector(&self) -> NodeSelector;

    fn parse_rate(&self, text: &str) -> Result<f64, ParseFloatError>;
}

/// Insert-only store for emitted exchange records.
pub trait PersistenceSink: Send + Sync + Clone {
    fn insert(&self, record: &ExchangeRecord) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Health check used to wait out a store outage.
    fn ping(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
