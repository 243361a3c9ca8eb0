use crate::document::{DocumentIndex, text_of};
use crate::error::AppError;
use crate::traits::{ExchangeSource, Fetcher};

/// Reads an exchange rate off a source page: build url → fetch → parse →
/// select node → read text → parse number.
///
/// Makes exactly one attempt; retrying is left to the job lifecycle.
#[derive(Clone)]
pub struct RateExtractor<F, S>
where
    F: Fetcher,
    S: ExchangeSource,
{
    fetcher: F,
    source: S,
}

impl<F, S> RateExtractor<F, S>
where
    F: Fetcher,
    S: ExchangeSource,
{
    pub fn new(fetcher: F, source: S) -> Self {
        Self { fetcher, source }
    }

    pub async fn extract_rate(&self, from: &str, to: &str) -> Result<f64, AppError> {
        let url = self.source.build_url(from, to);
        tracing::debug!(source = self.source.name(), %url, "Fetching rate page");

        let raw = self.fetcher.fetch(&url).await?;
        tracing::debug!(bytes = raw.len(), "Fetched rate page");

        self.rate_from_page(&raw, from, to)
    }

    /// Extract the rate from an already fetched page.
    pub fn rate_from_page(&self, raw: &[u8], from: &str, to: &str) -> Result<f64, AppError> {
        let doc = DocumentIndex::parse(raw)?;
        let selector = self.source.selector();
        let nodes = doc.find_nodes(&selector);

        let Some(node) = nodes.get(selector.occurrence) else {
            return Err(AppError::NodeNotFound {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!(
                    "wanted <{}> occurrence {}, page has {} matching nodes",
                    selector.element_kind,
                    selector.occurrence,
                    nodes.len()
                ),
            });
        };

        let text = text_of(node);
        self.source
            .parse_rate(&text)
            .map_err(|source| AppError::RateFormat {
                text,
                from: from.to_string(),
                to: to.to_string(),
                source,
            })
    }
}
