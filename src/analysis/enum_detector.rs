//! Enumeration candidate detection.
//!
//! NOTE: column-name pattern detection and reference-table detection are
//! deliberately disabled. They create conflicts downstream: reference
//! tables (CLIENT_TYPE, TRADE_STATUS) should become classes, not enums,
//! and FK columns like CLIENT_TYPE_ID should stay integers, not enum
//! types. Only cardinality detection and the suggestion channel are used,
//! which find actual enum-valued string columns.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::warn;
use serde::Deserialize;

use crate::llm::json_extract::parse_items;
use crate::llm::prompts::{format_enum_prompt, ENUM_SYSTEM_PROMPT};
use crate::llm::SuggestionChannel;
use crate::schema_model::Database;

use super::models::{AnalysisSource, EnumerationCandidate};

pub const DEFAULT_MAX_ENUM_VALUES: usize = 20;

/// Fetches the distinct non-null values of `(table, column)`, or None when
/// the column cannot be sampled.
pub type ValueFetcher = Arc<dyn Fn(&str, &str) -> Option<Vec<String>> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct RawEnum {
    #[serde(default)]
    name: String,
    #[serde(default)]
    source_table: String,
    #[serde(default)]
    source_column: String,
    #[serde(default)]
    values: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    value_descriptions: BTreeMap<String, String>,
}

fn default_confidence() -> f64 {
    0.5
}

pub struct EnumDetector {
    channel: Option<Arc<dyn SuggestionChannel>>,
    max_enum_values: usize,
}

impl EnumDetector {
    pub fn new(channel: Option<Arc<dyn SuggestionChannel>>) -> Self {
        EnumDetector {
            channel,
            max_enum_values: DEFAULT_MAX_ENUM_VALUES,
        }
    }

    pub fn with_max_enum_values(mut self, max_enum_values: usize) -> Self {
        self.max_enum_values = max_enum_values;
        self
    }

    pub async fn detect(
        &self,
        database: &Database,
        documentation: Option<&str>,
        sample_values: Option<&BTreeMap<String, Vec<String>>>,
        value_fetcher: Option<&ValueFetcher>,
        use_llm: bool,
    ) -> Vec<EnumerationCandidate> {
        let mut candidates = Vec::new();

        if sample_values.is_some() || value_fetcher.is_some() {
            candidates.extend(self.detect_from_cardinality(database, sample_values, value_fetcher));
        }

        if use_llm {
            if let Some(channel) = &self.channel {
                candidates.extend(
                    detect_with_llm(channel.as_ref(), database, documentation, sample_values).await,
                );
            }
        }

        merge_candidates(candidates)
    }

    /// Columns whose observed distinct value count fits inside
    /// `max_enum_values`. Confidence rises as the set gets smaller:
    /// `0.7 + 0.2 * (1 - distinct/max)`.
    fn detect_from_cardinality(
        &self,
        database: &Database,
        sample_values: Option<&BTreeMap<String, Vec<String>>>,
        value_fetcher: Option<&ValueFetcher>,
    ) -> Vec<EnumerationCandidate> {
        let mut candidates = Vec::new();

        for table in database.all_tables() {
            for col in &table.columns {
                let key = format!("{}.{}", table.name, col.name);
                let values: Option<Vec<String>> = match sample_values.and_then(|s| s.get(&key)) {
                    Some(values) => Some(values.clone()),
                    None => value_fetcher.and_then(|fetch| fetch(&table.name, &col.name)),
                };
                let Some(values) = values else {
                    continue;
                };

                let distinct = distinct_in_order(&values);
                if distinct.is_empty() || distinct.len() > self.max_enum_values {
                    continue;
                }

                let normalized: Vec<String> =
                    distinct.iter().map(|v| normalize_enum_value(v)).collect();
                let value_descriptions: BTreeMap<String, String> = distinct
                    .iter()
                    .map(|v| (normalize_enum_value(v), v.clone()))
                    .collect();
                let confidence =
                    0.7 + 0.2 * (1.0 - distinct.len() as f64 / self.max_enum_values as f64);

                candidates.push(EnumerationCandidate {
                    name: generate_enum_name(&col.name),
                    source_table: table.name.clone(),
                    source_column: col.name.clone(),
                    values: normalized,
                    confidence,
                    description: Some(format!(
                        "Low cardinality column ({} values)",
                        distinct.len()
                    )),
                    source: AnalysisSource::SchemaPattern,
                    value_descriptions,
                });
            }
        }
        candidates
    }
}

async fn detect_with_llm(
    channel: &dyn SuggestionChannel,
    database: &Database,
    documentation: Option<&str>,
    sample_values: Option<&BTreeMap<String, Vec<String>>>,
) -> Vec<EnumerationCandidate> {
    let prompt = format_enum_prompt(database, documentation, sample_values);
    let response = match channel.complete(ENUM_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("LLM-based enum detection failed: {e}");
            return Vec::new();
        }
    };

    parse_items::<RawEnum>(&response)
        .into_iter()
        .filter(|raw| !raw.name.is_empty() && !raw.source_table.is_empty())
        .map(|raw| EnumerationCandidate {
            name: raw.name,
            source_table: raw.source_table,
            source_column: raw.source_column,
            values: raw.values,
            confidence: raw.confidence,
            description: raw.description,
            source: AnalysisSource::LlmInference,
            value_descriptions: raw.value_descriptions,
        })
        .collect()
}

/// Normalize a raw value into an UPPER_SNAKE_CASE enum member name.
pub fn normalize_enum_value(value: &str) -> String {
    if value.trim().is_empty() {
        return "UNKNOWN".to_string();
    }

    let mut normalized: String = value
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    while normalized.contains("__") {
        normalized = normalized.replace("__", "_");
    }
    let normalized = normalized.trim_matches('_').to_string();

    if normalized.is_empty() {
        return "UNKNOWN".to_string();
    }
    if normalized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return format!("VALUE_{normalized}");
    }
    normalized
}

/// PascalCase enum name from the column name, with a Status/Type/Category
/// hint appended when the stripped stem lost it.
fn generate_enum_name(column_name: &str) -> String {
    let upper = column_name.to_uppercase();
    let mut stem = upper.as_str();
    for suffix in ["_TYPE", "_STATUS", "_CODE", "_CD", "_CATEGORY"] {
        if let Some(stripped) = stem.strip_suffix(suffix) {
            stem = stripped;
            break;
        }
    }

    let mut pascal: String = stem
        .split('_')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    let has_hint = ["Status", "Type", "Category", "Code"]
        .iter()
        .any(|s| pascal.ends_with(s));
    if !has_hint {
        if upper.contains("STATUS") {
            pascal.push_str("Status");
        } else if upper.contains("TYPE") {
            pascal.push_str("Type");
        } else if upper.contains("CATEGORY") {
            pascal.push_str("Category");
        }
    }
    pascal
}

fn distinct_in_order(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut distinct = Vec::new();
    for value in values {
        if seen.insert(value.clone()) {
            distinct.push(value.clone());
        }
    }
    distinct
}

/// Collapse candidates for the same table.column: union the values,
/// keep the name/description of the most confident one.
fn merge_candidates(candidates: Vec<EnumerationCandidate>) -> Vec<EnumerationCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut by_source: HashMap<String, Vec<EnumerationCandidate>> = HashMap::new();
    for cand in candidates {
        let key = format!(
            "{}.{}",
            cand.source_table.to_uppercase(),
            cand.source_column.to_uppercase()
        );
        if !by_source.contains_key(&key) {
            order.push(key.clone());
        }
        by_source.entry(key).or_default().push(cand);
    }

    let mut merged = Vec::new();
    for key in order {
        let Some(group) = by_source.remove(&key) else {
            continue;
        };
        if group.len() == 1 {
            merged.extend(group);
            continue;
        }

        let mut all_values: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        let mut all_descriptions: BTreeMap<String, String> = BTreeMap::new();
        let mut best_name = group[0].name.clone();
        let mut best_description = None;
        let mut best_confidence: f64 = 0.0;
        let source_table = group[0].source_table.clone();
        let source_column = group[0].source_column.clone();

        for cand in group {
            all_values.extend(cand.values);
            all_descriptions.extend(cand.value_descriptions);
            if cand.confidence > best_confidence {
                best_confidence = cand.confidence;
                best_name = cand.name;
                best_description = cand.description;
            }
        }

        merged.push(EnumerationCandidate {
            name: best_name,
            source_table,
            source_column,
            values: all_values.into_iter().collect(),
            confidence: best_confidence,
            description: best_description,
            // mixed evidence
            source: AnalysisSource::LlmInference,
            value_descriptions: all_descriptions,
        });
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_model::{Column, Schema, Table};
    use test_case::test_case;

    fn make_db() -> Database {
        Database {
            name: "demo".to_string(),
            schemas: vec![Schema {
                name: "PUBLIC".to_string(),
                tables: vec![Table {
                    name: "ORDERS".to_string(),
                    schema: "PUBLIC".to_string(),
                    columns: vec![
                        Column {
                            name: "STATUS".to_string(),
                            data_type: "VARCHAR".to_string(),
                            is_nullable: true,
                            is_primary_key: false,
                        },
                        Column {
                            name: "NOTES".to_string(),
                            data_type: "VARCHAR".to_string(),
                            is_nullable: true,
                            is_primary_key: false,
                        },
                    ],
                    primary_key_columns: vec![],
                    relationships: vec![],
                }],
            }],
            relationships: vec![],
        }
    }

    #[test_case("active", "ACTIVE")]
    #[test_case("In Progress", "IN_PROGRESS")]
    #[test_case("semi-final", "SEMI_FINAL")]
    #[test_case("a  b", "A_B")]
    #[test_case("3rd_party", "VALUE_3RD_PARTY")]
    #[test_case("", "UNKNOWN" ; "empty_input")]
    #[test_case("***", "UNKNOWN" ; "symbols_only")]
    #[test_case("_edge_", "EDGE")]
    fn normalization(input: &str, expected: &str) {
        assert_eq!(normalize_enum_value(input), expected);
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["active", "In Progress", "3rd_party", "", "***", "_edge_"] {
            let once = normalize_enum_value(raw);
            assert_eq!(normalize_enum_value(&once), once);
        }
    }

    #[test]
    fn enum_names_get_type_hints() {
        assert_eq!(generate_enum_name("ORDER_STATUS"), "OrderStatus");
        assert_eq!(generate_enum_name("TRADE_TYPE"), "TradeType");
        assert_eq!(generate_enum_name("RISK_CATEGORY"), "RiskCategory");
        assert_eq!(generate_enum_name("CURRENCY_CD"), "Currency");
    }

    #[tokio::test]
    async fn cardinality_confidence_formula() {
        let mut samples = BTreeMap::new();
        samples.insert(
            "ORDERS.STATUS".to_string(),
            vec![
                "open".to_string(),
                "closed".to_string(),
                "open".to_string(),
                "cancelled".to_string(),
            ],
        );
        let detector = EnumDetector::new(None);
        let candidates = detector
            .detect(&make_db(), None, Some(&samples), None, false)
            .await;
        assert_eq!(candidates.len(), 1);
        let cand = &candidates[0];
        assert_eq!(cand.name, "Status");
        assert_eq!(cand.values, vec!["OPEN", "CLOSED", "CANCELLED"]);
        // 3 distinct of 20: 0.7 + 0.2 * (1 - 3/20) = 0.87
        assert!((cand.confidence - 0.87).abs() < 1e-9);
        assert_eq!(cand.value_descriptions["CANCELLED"], "cancelled");
    }

    #[tokio::test]
    async fn high_cardinality_is_skipped() {
        let mut samples = BTreeMap::new();
        samples.insert(
            "ORDERS.NOTES".to_string(),
            (0..25).map(|i| format!("note {i}")).collect::<Vec<_>>(),
        );
        let detector = EnumDetector::new(None);
        let candidates = detector
            .detect(&make_db(), None, Some(&samples), None, false)
            .await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn value_fetcher_feeds_detection() {
        let fetcher: ValueFetcher = Arc::new(|table, column| {
            if table == "ORDERS" && column == "STATUS" {
                Some(vec!["NEW".to_string(), "DONE".to_string()])
            } else {
                None
            }
        });
        let detector = EnumDetector::new(None);
        let candidates = detector
            .detect(&make_db(), None, None, Some(&fetcher), false)
            .await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].values, vec!["NEW", "DONE"]);
    }

    #[test]
    fn merge_unions_values_and_keeps_best_name() {
        let a = EnumerationCandidate {
            name: "Status".to_string(),
            source_table: "ORDERS".to_string(),
            source_column: "STATUS".to_string(),
            values: vec!["OPEN".to_string(), "CLOSED".to_string()],
            confidence: 0.87,
            description: Some("cardinality".to_string()),
            source: AnalysisSource::SchemaPattern,
            value_descriptions: BTreeMap::new(),
        };
        let b = EnumerationCandidate {
            name: "OrderStatus".to_string(),
            source_table: "orders".to_string(),
            source_column: "status".to_string(),
            values: vec!["OPEN".to_string(), "CANCELLED".to_string()],
            confidence: 0.9,
            description: Some("llm".to_string()),
            source: AnalysisSource::LlmInference,
            value_descriptions: BTreeMap::new(),
        };
        let merged = merge_candidates(vec![a, b]);
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert_eq!(m.name, "OrderStatus");
        assert_eq!(m.values, vec!["CANCELLED", "CLOSED", "OPEN"]);
        assert!((m.confidence - 0.9).abs() < 1e-9);
    }
}
