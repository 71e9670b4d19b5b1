use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

// ============ Risk API Payloads ============

/// Response of `GET /api/kyt/v2/categories`.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryDescriptor>,
}

/// One entry of the category taxonomy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDescriptor {
    #[serde(default)]
    pub category_id: Option<serde_json::Value>,
    #[serde(default)]
    pub category_name: Option<String>,
}

/// Response of `GET /api/risk/v2/entities/{address}`.
///
/// Every field is optional; normalization supplies the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(default)]
    pub risk_reason: Option<String>,
    #[serde(default)]
    pub cluster: Option<Cluster>,
    #[serde(default)]
    pub exposures: Option<Vec<Exposure>>,
}

/// Upstream entity grouping the address belongs to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exposure {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub exposure_type: Option<String>,
    /// Numeric strings are parsed; any other non-number reads as absent.
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

impl Exposure {
    pub fn is_category(&self, category: &str) -> bool {
        self.category.as_deref() == Some(category)
    }

    pub fn is_type(&self, exposure_type: &str) -> bool {
        self.exposure_type.as_deref() == Some(exposure_type)
    }
}

// ============ Screening Results ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreeningStatus {
    Success,
    Error,
}

/// Exposure value(s) recorded for one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExposureValue {
    /// Indirect exposure excluded: the first non-indirect value.
    Single(Option<f64>),
    /// Indirect exposure included.
    Split {
        direct: Option<f64>,
        indirect: Option<f64>,
    },
}

impl ExposureValue {
    /// An absent value of the shape selected by `include_indirect`.
    pub fn absent(include_indirect: bool) -> Self {
        if include_indirect {
            ExposureValue::Split {
                direct: None,
                indirect: None,
            }
        } else {
            ExposureValue::Single(None)
        }
    }
}

/// The tabular projection of a screening outcome.
///
/// Success and error results share this shape; an error row carries the
/// error marker fields and an absent value for every category.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningRow {
    pub address: String,
    pub screen_status: String,
    pub risk: String,
    pub risk_reason: String,
    pub category: String,
    pub name: String,
    /// Keyed by category name, iterated in sorted order.
    pub exposures: BTreeMap<String, ExposureValue>,
}

/// One record per screened address.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningResult {
    pub address: String,
    pub status: ScreeningStatus,
    pub error: Option<String>,
    pub row: ScreeningRow,
}

impl ScreeningResult {
    pub fn success(row: ScreeningRow) -> Self {
        Self {
            address: row.address.clone(),
            status: ScreeningStatus::Success,
            error: None,
            row,
        }
    }

    /// Builds an error record whose row mirrors a success row over
    /// `taxonomy`.
    pub fn error(
        address: &str,
        message: impl Into<String>,
        taxonomy: &[String],
        include_indirect: bool,
    ) -> Self {
        let message = message.into();
        let exposures = taxonomy
            .iter()
            .map(|cat| (cat.clone(), ExposureValue::absent(include_indirect)))
            .collect();

        Self {
            address: address.to_string(),
            status: ScreeningStatus::Error,
            error: Some(message.clone()),
            row: ScreeningRow {
                address: address.to_string(),
                screen_status: "error".to_string(),
                risk: "Error".to_string(),
                risk_reason: message,
                category: String::new(),
                name: String::new(),
                exposures,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ScreeningStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_response_tolerates_missing_and_null_fields() {
        let payload = serde_json::json!({
            "risk": "High",
            "cluster": null,
            "exposures": null
        });
        let entity: EntityResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(entity.risk.as_deref(), Some("High"));
        assert!(entity.status.is_none());
        assert!(entity.cluster.is_none());
        assert!(entity.exposures.is_none());
    }

    #[test]
    fn test_categories_response_requires_list() {
        let bad = serde_json::json!({"categories": "sanctions"});
        assert!(serde_json::from_value::<CategoriesResponse>(bad).is_err());

        let good = serde_json::json!({
            "categories": [{"categoryId": 1, "categoryName": "sanctions"}, {"categoryId": 2}]
        });
        let parsed: CategoriesResponse = serde_json::from_value(good).unwrap();
        assert_eq!(parsed.categories.len(), 2);
        assert_eq!(parsed.categories[0].category_name.as_deref(), Some("sanctions"));
        assert!(parsed.categories[1].category_name.is_none());
    }

    #[test]
    fn test_exposure_value_tolerates_non_numbers() {
        let payload = serde_json::json!({
            "exposures": [
                {"category": "sanctions", "exposureType": "direct", "value": "7.5"},
                {"category": "mixing", "exposureType": "direct", "value": "n/a"},
                {"category": "gambling", "exposureType": "direct", "value": {"usd": 3}},
                {"category": "scam", "exposureType": "direct", "value": null},
                {"category": "theft", "exposureType": "direct", "value": 4}
            ]
        });
        let entity: EntityResponse = serde_json::from_value(payload).unwrap();
        let values: Vec<Option<f64>> = entity
            .exposures
            .unwrap()
            .iter()
            .map(|e| e.value)
            .collect();
        assert_eq!(values, vec![Some(7.5), None, None, None, Some(4.0)]);
    }

    #[test]
    fn test_error_result_mirrors_taxonomy() {
        let taxonomy = vec!["mixing".to_string(), "sanctions".to_string()];
        let result = ScreeningResult::error("0xabc", "503 Service Unavailable", &taxonomy, true);

        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("503 Service Unavailable"));
        assert_eq!(result.row.screen_status, "error");
        assert_eq!(result.row.risk, "Error");
        assert_eq!(result.row.risk_reason, "503 Service Unavailable");
        assert_eq!(result.row.exposures.len(), 2);
        assert_eq!(
            result.row.exposures["sanctions"],
            ExposureValue::Split {
                direct: None,
                indirect: None
            }
        );
    }
}
