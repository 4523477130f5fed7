//! Derived (computed) property detection from column naming, known
//! relationships, SQL SELECT expressions, and an optional LLM pass.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::warn;
use regex::{NoExpand, Regex};
use serde::Deserialize;

use crate::analysis::models::{AnalysisSource, DerivedPropertySuggestion};
use crate::llm::json_extract::parse_items;
use crate::llm::prompts::{format_derived_prompt, DERIVED_SYSTEM_PROMPT};
use crate::llm::SuggestionChannel;
use crate::schema_model::models::{Database, Table};
use crate::schema_model::naming::to_camel_case;

/// SQL aggregate function to Pure collection method and result type.
const AGGREGATION_FUNCTIONS: &[(&str, &str, &str)] = &[
    ("SUM", "->sum()", "Float"),
    ("COUNT", "->size()", "Integer"),
    ("AVG", "->average()", "Float"),
    ("MIN", "->min()", "Float"),
    ("MAX", "->max()", "Float"),
];

/// A computed property implied by a combination of columns. Each entry
/// in `requires` is a group of alternative markers; every group must be
/// matched by some column for the rule to fire.
struct DerivedRule {
    property_name: &'static str,
    requires: &'static [&'static [&'static str]],
    expression: &'static str,
    return_type: &'static str,
    description: &'static str,
}

const DERIVED_RULES: &[DerivedRule] = &[
    DerivedRule {
        property_name: "fullName",
        requires: &[&["FIRST_NAME", "FIRSTNAME"], &["LAST_NAME", "LASTNAME"]],
        expression: "$this.firstName + ' ' + $this.lastName",
        return_type: "String",
        description: "Full name combining first and last name",
    },
    DerivedRule {
        property_name: "age",
        requires: &[&["BIRTH_DATE", "DOB", "DATE_OF_BIRTH", "BIRTHDATE"]],
        expression: "$this.birthDate->dateDiff(today(), DurationUnit.YEARS)",
        return_type: "Integer",
        description: "Age calculated from birth date",
    },
    DerivedRule {
        property_name: "isExpired",
        requires: &[&["EXPIRY_DATE", "EXPIRATION_DATE", "VALID_UNTIL"]],
        expression: "$this.expiryDate < today()",
        return_type: "Boolean",
        description: "Whether the item has expired",
    },
    DerivedRule {
        property_name: "durationDays",
        requires: &[&["START_DATE", "BEGIN_DATE"], &["END_DATE", "FINISH_DATE"]],
        expression: "$this.endDate->dateDiff($this.startDate, DurationUnit.DAYS)",
        return_type: "Integer",
        description: "Duration in days between start and end dates",
    },
];

lazy_static! {
    static ref AGGREGATION_RE: Regex =
        Regex::new(r"(?i)\b(SUM|COUNT|AVG|MIN|MAX)\s*\(\s*(\w+(?:\.\w+)?)\s*\)(?:\s+AS\s+(\w+))?")
            .unwrap();
    static ref CALCULATION_RE: Regex =
        Regex::new(r"(?i)\b(\w+)\s*([+\-*/])\s*(\w+)(?:\s+AS\s+(\w+))?").unwrap();
    static ref FROM_TABLE_RE: Regex = Regex::new(r"(?i)\bFROM\s+([\w.]+)").unwrap();
    static ref SELECT_CLAUSE_RE: Regex =
        Regex::new(r"(?is)\bSELECT\s+(.+?)\s+FROM\b").unwrap();
}

#[derive(Debug, Deserialize)]
struct RawDerived {
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    property_name: String,
    #[serde(default)]
    expression: String,
    #[serde(default = "default_return_type")]
    return_type: String,
    #[serde(default = "default_multiplicity")]
    multiplicity: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    source_sql: Option<String>,
}

fn default_return_type() -> String {
    "String".to_string()
}

fn default_multiplicity() -> String {
    "[1]".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

pub struct DerivedAnalyzer {
    channel: Option<Arc<dyn SuggestionChannel>>,
}

impl DerivedAnalyzer {
    pub fn new(channel: Option<Arc<dyn SuggestionChannel>>) -> Self {
        DerivedAnalyzer { channel }
    }

    pub async fn detect(
        &self,
        database: &Database,
        documentation: Option<&str>,
        sql_queries: &[String],
        use_llm: bool,
    ) -> Vec<DerivedPropertySuggestion> {
        let mut suggestions = detect_from_column_names(database);
        suggestions.extend(detect_relationship_counts(database));
        suggestions.extend(extract_from_sql(sql_queries, database));

        if use_llm {
            if let Some(channel) = &self.channel {
                suggestions.extend(
                    detect_with_llm(channel.as_ref(), database, documentation, sql_queries)
                        .await,
                );
            }
        }

        deduplicate(suggestions)
    }
}

fn detect_from_column_names(database: &Database) -> Vec<DerivedPropertySuggestion> {
    let mut suggestions = Vec::new();

    for table in database.all_tables() {
        let class_name = table.class_name();
        let upper_names: Vec<String> =
            table.columns.iter().map(|c| c.name.to_uppercase()).collect();

        for rule in DERIVED_RULES {
            let satisfied = rule.requires.iter().all(|group| {
                upper_names
                    .iter()
                    .any(|name| group.iter().any(|marker| name.contains(marker)))
            });
            if !satisfied {
                continue;
            }

            suggestions.push(DerivedPropertySuggestion {
                class_name: class_name.clone(),
                property_name: rule.property_name.to_string(),
                expression: map_placeholders(rule.expression, table),
                return_type: rule.return_type.to_string(),
                multiplicity: "[1]".to_string(),
                description: Some(rule.description.to_string()),
                confidence: 0.7,
                source: AnalysisSource::SchemaPattern,
                source_sql: None,
            });
        }
    }

    suggestions
}

/// A `xsCount` property on the "one" side of each known relationship,
/// counting the reverse association.
fn detect_relationship_counts(database: &Database) -> Vec<DerivedPropertySuggestion> {
    let mut suggestions = Vec::new();

    for rel in &database.relationships {
        let target = match database.find_table(&rel.target_table) {
            Some(t) => t,
            None => continue,
        };
        let source = match database.find_table(&rel.source_table) {
            Some(t) => t,
            None => continue,
        };

        let reverse_prop = rel.reverse_property_name();
        suggestions.push(DerivedPropertySuggestion {
            class_name: target.class_name(),
            property_name: format!("{}Count", reverse_prop),
            expression: format!("$this.{}->size()", reverse_prop),
            return_type: "Integer".to_string(),
            multiplicity: "[1]".to_string(),
            description: Some(format!(
                "Count of associated {} records",
                source.class_name()
            )),
            confidence: 0.6,
            source: AnalysisSource::SchemaPattern,
            source_sql: None,
        });
    }

    suggestions
}

fn extract_from_sql(
    sql_queries: &[String],
    database: &Database,
) -> Vec<DerivedPropertySuggestion> {
    let mut suggestions = Vec::new();

    for query in sql_queries {
        let table_name = match FROM_TABLE_RE.captures(query) {
            Some(caps) => caps[1].rsplit('.').next().unwrap_or(&caps[1]).to_string(),
            None => continue,
        };
        let table = match database.find_table(&table_name) {
            Some(t) => t,
            None => continue,
        };
        let source_sql = snippet(query, 200);

        for caps in AGGREGATION_RE.captures_iter(query) {
            let function = caps[1].to_uppercase();
            let column = caps[2].rsplit('.').next().unwrap_or(&caps[2]).to_string();
            let alias = caps.get(3).map(|m| m.as_str().to_string());

            let (pure_method, return_type) = AGGREGATION_FUNCTIONS
                .iter()
                .find(|(name, _, _)| *name == function)
                .map(|(_, method, ty)| (*method, *ty))
                .unwrap_or(("->sum()", "Float"));

            let property_name = match alias {
                Some(a) => to_camel_case(&a),
                None => to_camel_case(&format!("{}_{}", column, function)),
            };

            suggestions.push(DerivedPropertySuggestion {
                class_name: table.class_name(),
                property_name,
                expression: format!("$this.{}{}", to_camel_case(&column), pure_method),
                return_type: return_type.to_string(),
                multiplicity: "[1]".to_string(),
                description: Some(format!("{} aggregation of {}", function, column)),
                confidence: 0.8,
                source: AnalysisSource::SqlPattern,
                source_sql: Some(source_sql.clone()),
            });
        }

        let select_clause = match SELECT_CLAUSE_RE.captures(query) {
            Some(caps) => caps[1].to_string(),
            None => continue,
        };

        for caps in CALCULATION_RE.captures_iter(&select_clause) {
            let left = &caps[1];
            let operator = &caps[2];
            let right = &caps[3];
            let alias = caps.get(4).map(|m| m.as_str().to_string());

            if AGGREGATION_FUNCTIONS
                .iter()
                .any(|(name, _, _)| name.eq_ignore_ascii_case(left))
            {
                continue;
            }

            let sql_expression = format!("{} {} {}", left, operator, right);
            let property_name = match alias {
                Some(a) => to_camel_case(&a),
                None => "calculated".to_string(),
            };

            suggestions.push(DerivedPropertySuggestion {
                class_name: table.class_name(),
                property_name,
                expression: columns_to_properties(&sql_expression, table),
                return_type: "Float".to_string(),
                multiplicity: "[1]".to_string(),
                description: Some(format!("Calculated: {}", sql_expression)),
                confidence: 0.7,
                source: AnalysisSource::SqlPattern,
                source_sql: Some(source_sql.clone()),
            });
        }
    }

    suggestions
}

async fn detect_with_llm(
    channel: &dyn SuggestionChannel,
    database: &Database,
    documentation: Option<&str>,
    sql_queries: &[String],
) -> Vec<DerivedPropertySuggestion> {
    let prompt = format_derived_prompt(database, documentation, sql_queries);
    let response = match channel.complete(DERIVED_SYSTEM_PROMPT, &prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!("LLM derived property analysis failed: {}", e);
            return Vec::new();
        }
    };

    parse_items::<RawDerived>(&response)
        .into_iter()
        .filter(|raw| {
            !raw.class_name.is_empty()
                && !raw.property_name.is_empty()
                && !raw.expression.is_empty()
        })
        .map(|raw| DerivedPropertySuggestion {
            class_name: raw.class_name,
            property_name: raw.property_name,
            expression: raw.expression,
            return_type: raw.return_type,
            multiplicity: raw.multiplicity,
            description: raw.description,
            confidence: raw.confidence,
            source: AnalysisSource::LlmInference,
            source_sql: raw.source_sql,
        })
        .collect()
}

/// Swap the rule expressions' generic property placeholders for the
/// table's actual property names.
fn map_placeholders(expression: &str, table: &Table) -> String {
    let mut result = expression.to_string();

    for column in &table.columns {
        let prop = column.property_name();
        let upper = column.name.to_uppercase();

        if upper.contains("FIRST") && upper.contains("NAME") {
            result = result.replace("firstName", &prop);
        }
        if upper.contains("LAST") && upper.contains("NAME") {
            result = result.replace("lastName", &prop);
        }
        if upper.contains("BIRTH") || upper.contains("DOB") {
            result = result.replace("birthDate", &prop);
        }
        if upper.contains("START") && upper.contains("DATE") {
            result = result.replace("startDate", &prop);
        }
        if upper.contains("END") && upper.contains("DATE") {
            result = result.replace("endDate", &prop);
        }
        if upper.contains("EXPIR") && upper.contains("DATE") {
            result = result.replace("expiryDate", &prop);
        }
    }

    result
}

/// Rewrite bare column references in a SQL expression as
/// `$this.property`.
fn columns_to_properties(expression: &str, table: &Table) -> String {
    let mut result = expression.to_string();
    for column in &table.columns {
        let word = format!(r"(?i)\b{}\b", regex::escape(&column.name));
        let re = match Regex::new(&word) {
            Ok(re) => re,
            Err(_) => continue,
        };
        let replacement = format!("$this.{}", column.property_name());
        result = re.replace_all(&result, NoExpand(&replacement)).into_owned();
    }
    result
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// One suggestion per (class, property); higher confidence wins.
fn deduplicate(suggestions: Vec<DerivedPropertySuggestion>) -> Vec<DerivedPropertySuggestion> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut unique: Vec<DerivedPropertySuggestion> = Vec::new();

    for suggestion in suggestions {
        let key = (suggestion.class_name.clone(), suggestion.property_name.clone());
        match index.get(&key) {
            Some(&i) => {
                if suggestion.confidence > unique[i].confidence {
                    unique[i] = suggestion;
                }
            }
            None => {
                index.insert(key, unique.len());
                unique.push(suggestion);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_model::models::{Column, Relationship, RelationshipType, Schema};

    fn column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            is_primary_key: false,
        }
    }

    fn sample_database() -> Database {
        Database {
            name: "crm".to_string(),
            schemas: vec![Schema {
                name: "public".to_string(),
                tables: vec![
                    Table {
                        name: "PERSONS".to_string(),
                        schema: "public".to_string(),
                        columns: vec![
                            column("PERSON_ID", "INTEGER"),
                            column("FIRST_NAME", "VARCHAR"),
                            column("LAST_NAME", "VARCHAR"),
                            column("BIRTH_DATE", "DATE"),
                        ],
                        primary_key_columns: vec!["PERSON_ID".to_string()],
                        relationships: vec![],
                    },
                    Table {
                        name: "ORDERS".to_string(),
                        schema: "public".to_string(),
                        columns: vec![
                            column("ORDER_ID", "INTEGER"),
                            column("TOTAL_AMOUNT", "DECIMAL"),
                        ],
                        primary_key_columns: vec!["ORDER_ID".to_string()],
                        relationships: vec![],
                    },
                    Table {
                        name: "ORDER_ITEMS".to_string(),
                        schema: "public".to_string(),
                        columns: vec![
                            column("ITEM_ID", "INTEGER"),
                            column("ORDER_ID", "INTEGER"),
                            column("PRICE", "DECIMAL"),
                            column("QUANTITY", "INTEGER"),
                        ],
                        primary_key_columns: vec!["ITEM_ID".to_string()],
                        relationships: vec![],
                    },
                ],
            }],
            relationships: vec![Relationship {
                source_table: "ORDER_ITEMS".to_string(),
                source_column: "ORDER_ID".to_string(),
                target_table: "ORDERS".to_string(),
                target_column: "ORDER_ID".to_string(),
                relationship_type: RelationshipType::ManyToOne,
                property_name: "order".to_string(),
            }],
        }
    }

    #[test]
    fn column_names_imply_full_name_and_age() {
        let suggestions = detect_from_column_names(&sample_database());
        let names: Vec<&str> = suggestions.iter().map(|s| s.property_name.as_str()).collect();
        assert!(names.contains(&"fullName"));
        assert!(names.contains(&"age"));
        let full_name = suggestions
            .iter()
            .find(|s| s.property_name == "fullName")
            .unwrap();
        assert_eq!(full_name.class_name, "Persons");
        assert_eq!(full_name.expression, "$this.firstName + ' ' + $this.lastName");
        assert_eq!(full_name.return_type, "String");
    }

    #[test]
    fn relationships_produce_count_properties() {
        let suggestions = detect_relationship_counts(&sample_database());
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].class_name, "Orders");
        assert_eq!(suggestions[0].property_name, "orderItemsCount");
        assert_eq!(suggestions[0].expression, "$this.orderItems->size()");
        assert_eq!(suggestions[0].return_type, "Integer");
        assert_eq!(suggestions[0].confidence, 0.6);
    }

    #[test]
    fn sql_aggregation_with_alias_becomes_property() {
        let db = sample_database();
        let queries = vec!["SELECT SUM(TOTAL_AMOUNT) AS revenue FROM ORDERS".to_string()];
        let suggestions = extract_from_sql(&queries, &db);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].class_name, "Orders");
        assert_eq!(suggestions[0].property_name, "revenue");
        assert_eq!(suggestions[0].expression, "$this.totalAmount->sum()");
        assert_eq!(suggestions[0].return_type, "Float");
        assert_eq!(suggestions[0].confidence, 0.8);
    }

    #[test]
    fn sql_aggregation_without_alias_gets_generated_name() {
        let db = sample_database();
        let queries = vec!["SELECT COUNT(ORDER_ID) FROM ORDERS".to_string()];
        let suggestions = extract_from_sql(&queries, &db);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].property_name, "orderIdCount");
        assert_eq!(suggestions[0].expression, "$this.orderId->size()");
        assert_eq!(suggestions[0].return_type, "Integer");
    }

    #[test]
    fn sql_calculation_maps_columns_to_properties() {
        let db = sample_database();
        let queries =
            vec!["SELECT PRICE * QUANTITY AS line_total FROM ORDER_ITEMS".to_string()];
        let suggestions = extract_from_sql(&queries, &db);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].class_name, "OrderItems");
        assert_eq!(suggestions[0].property_name, "lineTotal");
        assert_eq!(suggestions[0].expression, "$this.price * $this.quantity");
        assert_eq!(suggestions[0].confidence, 0.7);
    }

    #[test]
    fn dedup_prefers_higher_confidence() {
        let make = |conf: f64, source: AnalysisSource| DerivedPropertySuggestion {
            class_name: "Orders".to_string(),
            property_name: "revenue".to_string(),
            expression: "$this.totalAmount->sum()".to_string(),
            return_type: "Float".to_string(),
            multiplicity: "[1]".to_string(),
            description: None,
            confidence: conf,
            source,
            source_sql: None,
        };
        let unique = deduplicate(vec![
            make(0.5, AnalysisSource::LlmInference),
            make(0.8, AnalysisSource::SqlPattern),
        ]);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].confidence, 0.8);
    }
}
