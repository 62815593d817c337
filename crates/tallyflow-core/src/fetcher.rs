//! Fetch contract between the orchestration core and a backend collaborator
//!
//! The core never knows the wire protocol. Anything HTTP or RPC specific
//! lives behind this trait.

use crate::{PartialResult, Result};
use std::future::Future;

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch daily rows for `entity_ids` over `dates` (ISO-8601)
    async fn fetch(&self, entity_ids: &[String], dates: &[String]) -> Result<PartialResult>;

    /// Endpoint name folded into request signatures
    fn endpoint(&self) -> &str {
        "daily-totals"
    }
}

/// Adapts an async closure into a [`Fetcher`]
pub struct FnFetcher<F> {
    endpoint: String,
    f: F,
}

impl<F> FnFetcher<F> {
    pub fn new(endpoint: impl Into<String>, f: F) -> Self {
        Self {
            endpoint: endpoint.into(),
            f,
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut> Fetcher for FnFetcher<F>
where
    F: Fn(Vec<String>, Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<PartialResult>> + Send + 'static,
{
    async fn fetch(&self, entity_ids: &[String], dates: &[String]) -> Result<PartialResult> {
        (self.f)(entity_ids.to_vec(), dates.to_vec()).await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DayRow, EntitySeries, Error, PartialResult};

    #[tokio::test]
    async fn test_fn_fetcher_passes_arguments_through() {
        let fetcher = FnFetcher::new("sales", |ids: Vec<String>, dates: Vec<String>| async move {
            Ok::<PartialResult, Error>(ids
                .into_iter()
                .map(|id| {
                    EntitySeries::new(id, dates.iter().map(|d| DayRow::new(d.clone())).collect())
                })
                .collect())
        });

        let ids = vec!["a".to_string(), "b".to_string()];
        let dates = vec!["2025-01-01".to_string()];
        let result = fetcher.fetch(&ids, &dates).await.unwrap();

        assert_eq!(fetcher.endpoint(), "sales");
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].entity_id, "b");
        assert_eq!(result[1].days[0].date, "2025-01-01");
    }

    #[tokio::test]
    async fn test_fn_fetcher_propagates_errors() {
        let fetcher = FnFetcher::new("sales", |_ids: Vec<String>, _dates: Vec<String>| async {
            Err::<PartialResult, Error>(Error::Backend("503".to_string()))
        });

        let err = fetcher.fetch(&[], &[]).await.unwrap_err();
        assert_eq!(err, Error::Backend("503".to_string()));
    }
}
