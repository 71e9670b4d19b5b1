//! Screening orchestration.
//!
//! A [`Screener`] owns one screening session:
//! 1. Resolve the category taxonomy once (cached, single-flight)
//! 2. Fan out one task per address, all sharing the client's gate
//! 3. Normalize each response into a [`ScreeningResult`]
//! 4. Return results in input order
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{RiskApiClient, CATEGORIES_ENDPOINT};
use crate::config::Config;
use crate::errors::ScreenError;
use crate::input::dedup_addresses;
use crate::models::{
    CategoriesResponse, EntityResponse, ExposureValue, ScreeningResult, ScreeningRow,
};

const TAXONOMY_KEY: &str = "categories";

/// Entry point for screening addresses against the risk API.
///
/// Cheap to clone; clones share the HTTP client, the gate and the taxonomy
/// cache.
#[derive(Clone)]
pub struct Screener {
    client: Arc<RiskApiClient>,
    include_indirect: bool,
    taxonomy: Cache<&'static str, Arc<Vec<String>>>,
}

impl Screener {
    pub fn new(config: &Config) -> Result<Self, ScreenError> {
        config.validate()?;
        Ok(Self {
            client: Arc::new(RiskApiClient::new(config)?),
            include_indirect: config.include_indirect_exposure,
            taxonomy: Cache::builder().max_capacity(1).build(),
        })
    }

    pub fn include_indirect(&self) -> bool {
        self.include_indirect
    }

    /// Returns the sorted category taxonomy, fetching it on first use.
    ///
    /// Concurrent first callers share a single request. A failed fetch is
    /// not cached.
    pub async fn fetch_categories(&self) -> Result<Arc<Vec<String>>, ScreenError> {
        let client = Arc::clone(&self.client);
        self.taxonomy
            .try_get_with(TAXONOMY_KEY, async move {
                let categories = load_categories(&client).await?;
                tracing::info!("Fetched {} categories from API", categories.len());
                Ok::<_, ScreenError>(Arc::new(categories))
            })
            .await
            .map_err(|e| {
                let err = match e.as_ref() {
                    ScreenError::Taxonomy(_) => e.as_ref().clone(),
                    other => ScreenError::Taxonomy(other.to_string()),
                };
                tracing::error!("Failed to fetch categories from API: {}", err);
                err
            })
    }

    /// Screens one address. Failures become an error result for that
    /// address and are never propagated.
    pub async fn screen_address(&self, address: &str) -> ScreeningResult {
        let taxonomy = match self.fetch_categories().await {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                tracing::error!("Failed to screen address {}: {}", address, e);
                return ScreeningResult::error(address, e.to_string(), &[], self.include_indirect);
            }
        };

        match self.fetch_entity(address).await {
            Ok(entity) => ScreeningResult::success(format_screening_result(
                address,
                &entity,
                &taxonomy,
                self.include_indirect,
            )),
            Err(e) => {
                tracing::error!("Failed to screen address {}: {}", address, e);
                ScreeningResult::error(address, e.to_string(), &taxonomy, self.include_indirect)
            }
        }
    }

    async fn fetch_entity(&self, address: &str) -> Result<EntityResponse, ScreenError> {
        let url = self.client.entity_url(address)?;
        let raw = self.client.execute_url(url, &[]).await?;
        serde_json::from_value(raw).map_err(|e| ScreenError::Request {
            status: None,
            message: format!("Malformed screening response: {}", e),
            retryable: false,
        })
    }

    /// Screens a batch of addresses concurrently.
    ///
    /// Duplicates are screened once. Results come back in input order. Only
    /// a taxonomy failure fails the batch, and it does so before any
    /// address is requested.
    pub async fn screen_addresses(
        &self,
        addresses: Vec<String>,
    ) -> Result<Vec<ScreeningResult>, ScreenError> {
        self.screen_addresses_until(addresses, CancellationToken::new())
            .await
    }

    /// Like [`screen_addresses`](Self::screen_addresses), aborting every
    /// in-flight task and returning [`ScreenError::Cancelled`] as soon as
    /// `cancel` fires.
    pub async fn screen_addresses_until(
        &self,
        addresses: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<Vec<ScreeningResult>, ScreenError> {
        let addresses = dedup_addresses(addresses);
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let taxonomy = tokio::select! {
            _ = cancel.cancelled() => return Err(ScreenError::Cancelled),
            taxonomy = self.fetch_categories() => taxonomy?,
        };

        let mut tasks = JoinSet::new();
        for (index, address) in addresses.iter().cloned().enumerate() {
            let screener = self.clone();
            tasks.spawn(async move { (index, screener.screen_address(&address).await) });
        }

        let mut slots: Vec<Option<ScreeningResult>> = vec![None; addresses.len()];
        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => None,
                joined = tasks.join_next() => Some(joined),
            };

            match joined {
                None => {
                    tasks.abort_all();
                    tracing::warn!("Screening cancelled, aborted {} in-flight tasks", tasks.len());
                    return Err(ScreenError::Cancelled);
                }
                Some(Some(Ok((index, result)))) => slots[index] = Some(result),
                Some(Some(Err(e))) => tracing::error!("Screening task failed: {}", e),
                Some(None) => break,
            }
        }

        // A task that panicked left its slot empty.
        let results = addresses
            .iter()
            .zip(slots)
            .map(|(address, slot)| {
                slot.unwrap_or_else(|| {
                    ScreeningResult::error(
                        address,
                        "screening task terminated unexpectedly",
                        &taxonomy,
                        self.include_indirect,
                    )
                })
            })
            .collect();

        Ok(results)
    }
}

async fn load_categories(client: &RiskApiClient) -> Result<Vec<String>, ScreenError> {
    let raw = client.execute(CATEGORIES_ENDPOINT, &[]).await?;
    let response: CategoriesResponse = serde_json::from_value(raw)
        .map_err(|e| ScreenError::Taxonomy(format!("Unexpected categories API response format: {}", e)))?;

    let categories: BTreeSet<String> = response
        .categories
        .into_iter()
        .filter_map(|c| c.category_name)
        .filter(|name| !name.is_empty())
        .collect();

    if categories.is_empty() {
        return Err(ScreenError::Taxonomy("No categories returned from API".to_string()));
    }

    Ok(categories.into_iter().collect())
}

/// Normalizes a raw entity response into a row over `taxonomy`.
///
/// With `include_indirect`, each category records the direct and indirect
/// values separately (the last entry of each type wins). Without it, the
/// first entry that is not indirect is used. Categories with no entry get an
/// absent value.
pub fn format_screening_result(
    address: &str,
    entity: &EntityResponse,
    taxonomy: &[String],
    include_indirect: bool,
) -> ScreeningRow {
    let cluster = entity.cluster.as_ref();
    let exposures = entity.exposures.as_deref().unwrap_or_default();

    let mut values = BTreeMap::new();
    for cat in taxonomy {
        let matching = exposures.iter().filter(|e| e.is_category(cat));
        let value = if include_indirect {
            let mut direct = None;
            let mut indirect = None;
            for exposure in matching {
                if exposure.is_type("direct") {
                    direct = exposure.value;
                } else if exposure.is_type("indirect") {
                    indirect = exposure.value;
                }
            }
            ExposureValue::Split { direct, indirect }
        } else {
            ExposureValue::Single(
                matching
                    .into_iter()
                    .find(|e| !e.is_type("indirect"))
                    .and_then(|e| e.value),
            )
        };
        values.insert(cat.clone(), value);
    }

    ScreeningRow {
        address: address.to_string(),
        screen_status: entity
            .status
            .as_deref()
            .unwrap_or("complete")
            .to_lowercase(),
        risk: entity.risk.clone().unwrap_or_default(),
        risk_reason: entity.risk_reason.clone().unwrap_or_default(),
        category: cluster.and_then(|c| c.category.clone()).unwrap_or_default(),
        name: cluster.and_then(|c| c.name.clone()).unwrap_or_default(),
        exposures: values,
    }
}

/// Success and error counts for one batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn new(
        results: &[ScreeningResult],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            started_at,
            finished_at,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn log(&self) {
        tracing::info!(
            "Screening complete: {} successful, {} errors ({} addresses in {:.1}s)",
            self.succeeded,
            self.failed,
            self.total,
            self.elapsed().num_milliseconds() as f64 / 1000.0
        );
        if self.failed > 0 {
            tracing::warn!(
                "{} addresses failed to screen - check output file for details",
                self.failed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn taxonomy() -> Vec<String> {
        vec!["mixing".to_string(), "sanctions".to_string()]
    }

    fn entity(value: serde_json::Value) -> EntityResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_split_exposures_mark_missing_values_absent() {
        let raw = entity(json!({
            "exposures": [{"category": "sanctions", "exposureType": "direct", "value": 5}]
        }));
        let row = format_screening_result("0xabc", &raw, &taxonomy(), true);

        assert_eq!(
            row.exposures["sanctions"],
            ExposureValue::Split {
                direct: Some(5.0),
                indirect: None
            }
        );
        assert_eq!(
            row.exposures["mixing"],
            ExposureValue::Split {
                direct: None,
                indirect: None
            }
        );
    }

    #[test]
    fn test_single_exposure_skips_indirect_entries() {
        let raw = entity(json!({
            "exposures": [
                {"category": "mixing", "exposureType": "indirect", "value": 9},
                {"category": "mixing", "exposureType": "direct", "value": 2.5},
                {"category": "mixing", "exposureType": "direct", "value": 7}
            ]
        }));
        let row = format_screening_result("0xabc", &raw, &taxonomy(), false);

        assert_eq!(row.exposures["mixing"], ExposureValue::Single(Some(2.5)));
        assert_eq!(row.exposures["sanctions"], ExposureValue::Single(None));
    }

    #[test]
    fn test_split_exposure_takes_last_entry_of_each_type() {
        let raw = entity(json!({
            "exposures": [
                {"category": "mixing", "exposureType": "direct", "value": 1},
                {"category": "mixing", "exposureType": "indirect", "value": 3},
                {"category": "mixing", "exposureType": "direct", "value": 2}
            ]
        }));
        let row = format_screening_result("0xabc", &raw, &taxonomy(), true);

        assert_eq!(
            row.exposures["mixing"],
            ExposureValue::Split {
                direct: Some(2.0),
                indirect: Some(3.0)
            }
        );
    }

    #[test]
    fn test_header_fields_defaults() {
        let row = format_screening_result("0xabc", &EntityResponse::default(), &taxonomy(), true);
        assert_eq!(row.screen_status, "complete");
        assert_eq!(row.risk, "");
        assert_eq!(row.risk_reason, "");
        assert_eq!(row.category, "");
        assert_eq!(row.name, "");
    }

    #[test]
    fn test_header_fields_from_payload() {
        let raw = entity(json!({
            "status": "COMPLETE",
            "risk": "Severe",
            "riskReason": "Identified as sanctioned entity",
            "cluster": {"category": "exchange", "name": "Example Exchange"}
        }));
        let row = format_screening_result("0xabc", &raw, &taxonomy(), true);

        assert_eq!(row.address, "0xabc");
        assert_eq!(row.screen_status, "complete");
        assert_eq!(row.risk, "Severe");
        assert_eq!(row.risk_reason, "Identified as sanctioned entity");
        assert_eq!(row.category, "exchange");
        assert_eq!(row.name, "Example Exchange");
    }

    #[test]
    fn test_batch_summary_counts() {
        let tax = taxonomy();
        let ok = ScreeningResult::success(format_screening_result(
            "a",
            &EntityResponse::default(),
            &tax,
            true,
        ));
        let err = ScreeningResult::error("b", "404 Not Found", &tax, true);
        let now = Utc::now();

        let summary = BatchSummary::new(&[ok.clone(), err, ok], now, now);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }
}
