//! Constraint suggestion from column semantics, database metadata, SQL
//! WHERE clauses, and an optional LLM pass.
//!
//! Every suggestion is expressed as a Pure-style boolean over `$this`
//! properties, e.g. `$this.amount > 0`. SQL-derived expressions go
//! through a best-effort translation; anything the translation cannot
//! express is left out rather than emitted half-converted.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::warn;
use regex::{NoExpand, Regex};
use serde::Deserialize;

use crate::analysis::models::{AnalysisSource, ConstraintSuggestion};
use crate::llm::json_extract::parse_items;
use crate::llm::prompts::{format_constraint_prompt, CONSTRAINT_SYSTEM_PROMPT};
use crate::llm::SuggestionChannel;
use crate::schema_model::models::{Database, Table};
use crate::schema_model::naming::to_pascal_case;

/// A constraint reported by database metadata.
#[derive(Debug, Clone)]
pub struct DatabaseConstraint {
    pub table: String,
    pub kind: ConstraintKind,
    pub definition: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Check,
    Unique,
    NotNull,
}

/// Column-name markers and the expression they imply. `{p}` is replaced
/// with the camelCase property name.
struct SemanticRule {
    name_suffix: &'static str,
    markers: &'static [&'static str],
    expression: &'static str,
    description: &'static str,
}

const SEMANTIC_RULES: &[SemanticRule] = &[
    SemanticRule {
        name_suffix: "Positive",
        markers: &["AMOUNT", "PRICE", "COST", "TOTAL", "BALANCE", "FEE", "VALUE"],
        expression: "$this.{p} > 0",
        description: "{p} must be positive",
    },
    SemanticRule {
        name_suffix: "Nonnegative",
        markers: &["COUNT", "QTY", "QUANTITY", "NUM", "NUMBER"],
        expression: "$this.{p} >= 0",
        description: "{p} must be non-negative",
    },
    SemanticRule {
        name_suffix: "Percentage",
        markers: &["PERCENT", "RATE", "PCT", "PERCENTAGE"],
        expression: "$this.{p} >= 0 && $this.{p} <= 100",
        description: "{p} must be between 0 and 100",
    },
    SemanticRule {
        name_suffix: "NotEmpty",
        markers: &["_CODE", "_CD"],
        expression: "$this.{p}->length() >= 1",
        description: "{p} must not be empty",
    },
];

/// Start/end column pairs that imply an ordering constraint.
const DATE_RANGE_PAIRS: &[(&str, &str)] = &[
    ("START_DATE", "END_DATE"),
    ("BEGIN_DATE", "END_DATE"),
    ("FROM_DATE", "TO_DATE"),
    ("EFFECTIVE_DATE", "EXPIRY_DATE"),
    ("VALID_FROM", "VALID_TO"),
    ("START_TIME", "END_TIME"),
];

lazy_static! {
    static ref CHECK_PREFIX_RE: Regex = Regex::new(r"(?i)^\s*CHECK\s*\(").unwrap();
    static ref TRAILING_PAREN_RE: Regex = Regex::new(r"\)\s*$").unwrap();
    static ref IS_NOT_NULL_RE: Regex =
        Regex::new(r"(?i)\$this\.(\w+)\s+IS\s+NOT\s+NULL").unwrap();
    static ref IS_NULL_RE: Regex = Regex::new(r"(?i)\$this\.(\w+)\s+IS\s+NULL").unwrap();
    static ref IN_LIST_RE: Regex =
        Regex::new(r"(?i)\$this\.(\w+)\s+IN\s*\(([^)]+)\)").unwrap();
    static ref BETWEEN_RE: Regex =
        Regex::new(r"(?i)\$this\.(\w+)\s+BETWEEN\s+(\S+)\s+AND\s+(\S+)").unwrap();
    static ref FROM_TABLE_RE: Regex = Regex::new(r"(?i)\bFROM\s+([\w.]+)").unwrap();
    static ref WHERE_CLAUSE_RE: Regex =
        Regex::new(r"(?is)\bWHERE\s+(.+?)(?:\bGROUP\s+BY\b|\bORDER\s+BY\b|\bLIMIT\b|$)")
            .unwrap();
    static ref AND_SPLIT_RE: Regex = Regex::new(r"(?i)\s+AND\s+").unwrap();
}

#[derive(Debug, Deserialize)]
struct RawConstraint {
    #[serde(default)]
    class_name: String,
    #[serde(default)]
    constraint_name: String,
    #[serde(default)]
    expression: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    source_sql: Option<String>,
}

fn default_confidence() -> f64 {
    0.5
}

pub struct ConstraintAnalyzer {
    channel: Option<Arc<dyn SuggestionChannel>>,
}

impl ConstraintAnalyzer {
    pub fn new(channel: Option<Arc<dyn SuggestionChannel>>) -> Self {
        ConstraintAnalyzer { channel }
    }

    /// Run every constraint source and return the deduplicated union.
    pub async fn detect(
        &self,
        database: &Database,
        documentation: Option<&str>,
        sql_queries: &[String],
        db_constraints: &[DatabaseConstraint],
        use_llm: bool,
    ) -> Vec<ConstraintSuggestion> {
        let mut suggestions = detect_semantic_patterns(database);
        suggestions.extend(detect_date_ranges(database));
        suggestions.extend(convert_db_constraints(db_constraints, database));
        suggestions.extend(extract_sql_constraints(sql_queries, database));

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

/// Constraints implied by what a column is called.
fn detect_semantic_patterns(database: &Database) -> Vec<ConstraintSuggestion> {
    let mut suggestions = Vec::new();

    for table in database.all_tables() {
        let class_name = table.class_name();
        for column in &table.columns {
            let col_upper = column.name.to_uppercase();
            let prop = column.property_name();

            for rule in SEMANTIC_RULES {
                if rule.markers.iter().any(|m| col_upper.contains(m)) {
                    suggestions.push(ConstraintSuggestion {
                        class_name: class_name.clone(),
                        constraint_name: format!("{}{}", prop, rule.name_suffix),
                        expression: rule.expression.replace("{p}", &prop),
                        description: rule.description.replace("{p}", &prop),
                        confidence: 0.6,
                        source: AnalysisSource::SchemaPattern,
                        source_sql: None,
                    });
                }
            }
        }
    }

    suggestions
}

/// `end >= start` constraints for recognizable date column pairs.
fn detect_date_ranges(database: &Database) -> Vec<ConstraintSuggestion> {
    let mut suggestions = Vec::new();

    for table in database.all_tables() {
        let class_name = table.class_name();

        for (start_pattern, end_pattern) in DATE_RANGE_PAIRS {
            let start_col = table
                .columns
                .iter()
                .find(|c| c.name.to_uppercase().contains(start_pattern));
            let end_col = table
                .columns
                .iter()
                .find(|c| c.name.to_uppercase().contains(end_pattern));

            let (start_col, end_col) = match (start_col, end_col) {
                (Some(s), Some(e)) => (s, e),
                _ => continue,
            };

            let start_prop = start_col.property_name();
            let end_prop = end_col.property_name();

            // A nullable end means "still open", which is valid.
            let expression = if end_col.is_nullable {
                format!(
                    "$this.{end}->isEmpty() || $this.{end} >= $this.{start}",
                    end = end_prop,
                    start = start_prop
                )
            } else {
                format!("$this.{} >= $this.{}", end_prop, start_prop)
            };

            suggestions.push(ConstraintSuggestion {
                class_name: class_name.clone(),
                constraint_name: format!(
                    "{}{}Valid",
                    start_prop,
                    to_pascal_case(&end_col.name)
                ),
                expression,
                description: format!("{} must be after or equal to {}", end_prop, start_prop),
                confidence: 0.8,
                source: AnalysisSource::SchemaPattern,
                source_sql: None,
            });
        }
    }

    suggestions
}

/// Translate CHECK and UNIQUE metadata into suggestions. NOT NULL is
/// skipped: it belongs in property multiplicity, not a constraint.
fn convert_db_constraints(
    db_constraints: &[DatabaseConstraint],
    database: &Database,
) -> Vec<ConstraintSuggestion> {
    let mut suggestions = Vec::new();

    for constraint in db_constraints {
        let table = match database.find_table(&constraint.table) {
            Some(t) => t,
            None => continue,
        };
        let class_name = table.class_name();

        match constraint.kind {
            ConstraintKind::Check => {
                let expression = convert_check_expression(&constraint.definition, table);
                if expression.is_empty() {
                    continue;
                }
                suggestions.push(ConstraintSuggestion {
                    class_name,
                    constraint_name: name_from_condition(&constraint.definition, "checkConstraint"),
                    expression,
                    description: format!("Database CHECK: {}", constraint.definition),
                    confidence: 0.9,
                    source: AnalysisSource::DatabaseConstraint,
                    source_sql: Some(constraint.definition.clone()),
                });
            }
            ConstraintKind::Unique => {
                // Uniqueness is a set-level property, so this is only
                // informational for the modeler.
                let columns = constraint.columns.join(", ");
                let name_part = constraint
                    .columns
                    .iter()
                    .map(|c| to_pascal_case(c))
                    .collect::<Vec<_>>()
                    .join("And");
                suggestions.push(ConstraintSuggestion {
                    class_name,
                    constraint_name: format!("unique{}", name_part),
                    expression: format!("/* UNIQUE constraint on: {} */", columns),
                    description: format!("Unique constraint on {}", columns),
                    confidence: 0.5,
                    source: AnalysisSource::DatabaseConstraint,
                    source_sql: None,
                });
            }
            ConstraintKind::NotNull => {}
        }
    }

    suggestions
}

/// Mine WHERE clauses for per-table conditions worth keeping as
/// constraints.
fn extract_sql_constraints(
    sql_queries: &[String],
    database: &Database,
) -> Vec<ConstraintSuggestion> {
    let mut suggestions = Vec::new();

    for query in sql_queries {
        for (table_name, condition) in extract_where_conditions(query) {
            let table = match database.find_table(&table_name) {
                Some(t) => t,
                None => continue,
            };

            let expression = convert_check_expression(&condition, table);
            if expression.is_empty() {
                continue;
            }

            let description = if condition.len() > 100 {
                format!("Derived from SQL: {}", &condition[..100])
            } else {
                format!("Derived from SQL: {}", condition)
            };

            suggestions.push(ConstraintSuggestion {
                class_name: table.class_name(),
                constraint_name: name_from_condition(&condition, "sqlDerivedConstraint"),
                expression,
                description,
                confidence: 0.7,
                source: AnalysisSource::SqlPattern,
                source_sql: Some(condition),
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
) -> Vec<ConstraintSuggestion> {
    let prompt = format_constraint_prompt(database, documentation, sql_queries);
    let response = match channel.complete(CONSTRAINT_SYSTEM_PROMPT, &prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!("LLM constraint analysis failed: {}", e);
            return Vec::new();
        }
    };

    parse_items::<RawConstraint>(&response)
        .into_iter()
        .filter(|raw| !raw.class_name.is_empty() && !raw.expression.is_empty())
        .map(|raw| ConstraintSuggestion {
            class_name: raw.class_name,
            constraint_name: raw.constraint_name,
            expression: raw.expression,
            description: raw.description,
            confidence: raw.confidence,
            source: AnalysisSource::LlmInference,
            source_sql: raw.source_sql,
        })
        .collect()
}

/// Best-effort SQL boolean expression to Pure expression translation.
///
/// Column references become `$this.property`, then SQL-only forms
/// (BETWEEN, IN, IS [NOT] NULL, AND/OR/<>) are rewritten. BETWEEN runs
/// before the AND rewrite or its own AND would already be gone.
fn convert_check_expression(definition: &str, table: &Table) -> String {
    let mut expr = definition.trim().to_string();
    expr = CHECK_PREFIX_RE.replace(&expr, "").into_owned();
    expr = TRAILING_PAREN_RE.replace(&expr, "").into_owned();

    for column in &table.columns {
        let word = format!(r"(?i)\b{}\b", regex::escape(&column.name));
        let re = match Regex::new(&word) {
            Ok(re) => re,
            Err(_) => continue,
        };
        let replacement = format!("$this.{}", column.property_name());
        expr = re.replace_all(&expr, NoExpand(&replacement)).into_owned();
    }

    expr = IS_NOT_NULL_RE
        .replace_all(&expr, "$$this.${1}->isNotEmpty()")
        .into_owned();
    expr = IS_NULL_RE
        .replace_all(&expr, "$$this.${1}->isEmpty()")
        .into_owned();
    expr = IN_LIST_RE
        .replace_all(&expr, "$$this.${1}->in([${2}])")
        .into_owned();
    expr = BETWEEN_RE
        .replace_all(&expr, "$$this.${1} >= ${2} && $$this.${1} <= ${3}")
        .into_owned();

    expr = expr.replace(" AND ", " && ");
    expr = expr.replace(" OR ", " || ");
    expr = expr.replace("<>", "!=");

    expr.trim().to_string()
}

/// Pull `(table, condition)` pairs out of a query's WHERE clause.
/// Conditions with placeholders or subqueries are dropped.
fn extract_where_conditions(sql: &str) -> Vec<(String, String)> {
    let table_name = match FROM_TABLE_RE.captures(sql) {
        Some(caps) => caps[1]
            .rsplit('.')
            .next()
            .unwrap_or(&caps[1])
            .to_string(),
        None => return Vec::new(),
    };

    let clause = match WHERE_CLAUSE_RE.captures(sql) {
        Some(caps) => caps[1].trim().to_string(),
        None => return Vec::new(),
    };

    AND_SPLIT_RE
        .split(&clause)
        .map(str::trim)
        .filter(|cond| !cond.is_empty())
        .filter(|cond| !cond.contains('?') && !cond.to_uppercase().contains("SELECT"))
        .map(|cond| (table_name.clone(), cond.to_string()))
        .collect()
}

fn name_from_condition(condition: &str, fallback: &str) -> String {
    let lower = condition.to_lowercase();
    if condition.contains(">=") {
        "valueNonNegative".to_string()
    } else if condition.contains('>') {
        "valuePositive".to_string()
    } else if lower.contains("between") {
        "valueInRange".to_string()
    } else if lower.contains(" in ") {
        "valueInSet".to_string()
    } else if lower.contains("not null") {
        "valueRequired".to_string()
    } else {
        fallback.to_string()
    }
}

/// Keep one suggestion per (class, normalized expression); on a clash
/// the higher confidence wins in place.
fn deduplicate(suggestions: Vec<ConstraintSuggestion>) -> Vec<ConstraintSuggestion> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut unique: Vec<ConstraintSuggestion> = Vec::new();

    for suggestion in suggestions {
        let key = (
            suggestion.class_name.clone(),
            suggestion
                .expression
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>(),
        );
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
