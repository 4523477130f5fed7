//! Suggestion value objects produced by the analyzers.
//!
//! Everything here is a plain confidence-scored value: analyzers produce
//! them, the orchestrator caps and filters them, downstream generators
//! consume them. Nothing in this module mutates the schema model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which kind of evidence produced a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    SchemaPattern,
    Documentation,
    SqlPattern,
    LlmInference,
    DatabaseConstraint,
}

/// A proposed base class over structurally similar tables, or over the
/// subtypes a discriminator column implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritanceOpportunity {
    pub base_class_name: String,
    pub base_class_properties: Vec<String>,
    pub derived_classes: Vec<String>,
    pub discriminator_column: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub source: AnalysisSource,
    /// Properties specific to each derived class, keyed by class name.
    #[serde(default)]
    pub derived_class_properties: BTreeMap<String, Vec<String>>,
}

/// A column that appears to hold a small closed set of codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumerationCandidate {
    pub name: String,
    pub source_table: String,
    pub source_column: String,
    pub values: Vec<String>,
    pub confidence: f64,
    pub description: Option<String>,
    pub source: AnalysisSource,
    /// Normalized value -> original/raw form or meaning.
    #[serde(default)]
    pub value_descriptions: BTreeMap<String, String>,
}

/// A validation constraint expressed over `$this` properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSuggestion {
    pub class_name: String,
    pub constraint_name: String,
    pub expression: String,
    pub description: String,
    pub confidence: f64,
    pub source: AnalysisSource,
    /// The SQL this was derived from, when applicable.
    pub source_sql: Option<String>,
}

/// A computed property proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedPropertySuggestion {
    pub class_name: String,
    pub property_name: String,
    pub expression: String,
    pub return_type: String,
    /// Pure-style multiplicity, `[1]` unless stated otherwise.
    #[serde(default = "default_multiplicity")]
    pub multiplicity: String,
    pub description: Option<String>,
    pub confidence: f64,
    pub source: AnalysisSource,
    pub source_sql: Option<String>,
}

fn default_multiplicity() -> String {
    "[1]".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyRole {
    Base,
    Derived,
}

/// Per-table rollup of what the analyzers found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableAnalysis {
    pub table_name: String,
    pub schema_name: String,
    pub enum_candidates: Vec<EnumerationCandidate>,
    pub constraints: Vec<ConstraintSuggestion>,
    pub derived_properties: Vec<DerivedPropertySuggestion>,
    pub is_reference_table: bool,
    pub hierarchy_role: Option<HierarchyRole>,
}

/// The full enrichment result handed to downstream generators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancedModelSpec {
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub schema_names: Vec<String>,
    /// Threshold the suggestion lists were filtered at.
    #[serde(default)]
    pub confidence_threshold: f64,
    /// Documentation text that informed the run, when any was supplied.
    #[serde(default)]
    pub documentation: Option<String>,
    /// SQL statements that informed the run.
    #[serde(default)]
    pub sql_queries: Vec<String>,
    #[serde(default)]
    pub inheritance_opportunities: Vec<InheritanceOpportunity>,
    #[serde(default)]
    pub enumeration_candidates: Vec<EnumerationCandidate>,
    #[serde(default)]
    pub constraint_suggestions: Vec<ConstraintSuggestion>,
    #[serde(default)]
    pub derived_property_suggestions: Vec<DerivedPropertySuggestion>,
    /// Keyed by uppercase table name.
    #[serde(default)]
    pub table_analyses: BTreeMap<String, TableAnalysis>,
}

impl EnhancedModelSpec {
    /// Return a copy keeping only suggestions at or above `threshold`.
    /// The original is untouched.
    pub fn filter_by_confidence(&self, threshold: f64) -> EnhancedModelSpec {
        EnhancedModelSpec {
            database_name: self.database_name.clone(),
            schema_names: self.schema_names.clone(),
            confidence_threshold: threshold,
            documentation: self.documentation.clone(),
            sql_queries: self.sql_queries.clone(),
            inheritance_opportunities: self
                .inheritance_opportunities
                .iter()
                .filter(|o| o.confidence >= threshold)
                .cloned()
                .collect(),
            enumeration_candidates: self
                .enumeration_candidates
                .iter()
                .filter(|c| c.confidence >= threshold)
                .cloned()
                .collect(),
            constraint_suggestions: self
                .constraint_suggestions
                .iter()
                .filter(|c| c.confidence >= threshold)
                .cloned()
                .collect(),
            derived_property_suggestions: self
                .derived_property_suggestions
                .iter()
                .filter(|d| d.confidence >= threshold)
                .cloned()
                .collect(),
            table_analyses: self.table_analyses.clone(),
        }
    }

    pub fn get_constraints_for_class(&self, class_name: &str) -> Vec<&ConstraintSuggestion> {
        self.constraint_suggestions
            .iter()
            .filter(|c| c.class_name == class_name)
            .collect()
    }

    pub fn get_derived_properties_for_class(
        &self,
        class_name: &str,
    ) -> Vec<&DerivedPropertySuggestion> {
        self.derived_property_suggestions
            .iter()
            .filter(|d| d.class_name == class_name)
            .collect()
    }

    /// The inheritance opportunity (if any) in which `class_name` is a
    /// derived class.
    pub fn get_base_class(&self, class_name: &str) -> Option<&InheritanceOpportunity> {
        self.inheritance_opportunities
            .iter()
            .find(|o| o.derived_classes.iter().any(|d| d == class_name))
    }

    pub fn is_base_class(&self, class_name: &str) -> bool {
        self.inheritance_opportunities
            .iter()
            .any(|o| o.base_class_name == class_name)
    }

    pub fn get_enum_for_column(
        &self,
        table_name: &str,
        column_name: &str,
    ) -> Option<&EnumerationCandidate> {
        let table_upper = table_name.to_uppercase();
        let column_upper = column_name.to_uppercase();
        self.enumeration_candidates.iter().find(|c| {
            c.source_table.to_uppercase() == table_upper
                && c.source_column.to_uppercase() == column_upper
        })
    }

    /// Human-readable multi-line report.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Schema Analysis Summary".to_string(),
            "=======================".to_string(),
            format!("Database: {}", self.database_name),
            format!("Confidence threshold:      {:.2}", self.confidence_threshold),
            format!(
                "Inheritance opportunities: {}",
                self.inheritance_opportunities.len()
            ),
            format!(
                "Enumeration candidates:    {}",
                self.enumeration_candidates.len()
            ),
            format!(
                "Constraint suggestions:    {}",
                self.constraint_suggestions.len()
            ),
            format!(
                "Derived properties:        {}",
                self.derived_property_suggestions.len()
            ),
            format!("Tables analyzed:           {}", self.table_analyses.len()),
        ];

        for opp in &self.inheritance_opportunities {
            lines.push(format!(
                "  hierarchy {} <- [{}] (confidence {:.2})",
                opp.base_class_name,
                opp.derived_classes.join(", "),
                opp.confidence
            ));
        }
        for cand in &self.enumeration_candidates {
            lines.push(format!(
                "  enum {} on {}.{} ({} values, confidence {:.2})",
                cand.name,
                cand.source_table,
                cand.source_column,
                cand.values.len(),
                cand.confidence
            ));
        }
        lines.join("\n")
    }
}
