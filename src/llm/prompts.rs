//! Prompt builders for the suggestion channel.
//!
//! Each analyzer category has a const system prompt that pins the JSON
//! output contract, plus a `format_*` builder that renders the schema and
//! whatever context (documentation, SQL, sample values) is available.

use std::collections::BTreeMap;

use crate::schema_model::Database;

pub const RELATIONSHIP_SYSTEM_PROMPT: &str = r#"You are a database schema analyst. Identify probable foreign key relationships between tables from column naming patterns, data type compatibility, and domain knowledge.

Only include relationships where you have moderate to high confidence.

Return ONLY a JSON array, no other text. Each element:
{
  "source_table": "table containing the foreign key",
  "source_column": "the FK column name",
  "target_table": "the referenced table",
  "target_column": "the referenced column, usually the primary key",
  "relationship_type": "many_to_one",
  "property_name": "camelCase association property name",
  "confidence": 0.9,
  "reasoning": "brief explanation"
}"#;

pub const HIERARCHY_SYSTEM_PROMPT: &str = r#"You are a data modeling expert. Analyze the database schema for class inheritance opportunities: groups of tables that share a common structure and would be better modeled as a base class with specializations, or single tables whose type/category column discriminates subtypes.

Return ONLY a JSON array, no other text. Each element:
{
  "base_class_name": "PascalCase base class name",
  "base_class_properties": ["shared", "property", "names"],
  "derived_classes": ["Derived1", "Derived2"],
  "discriminator_column": "TYPE_COLUMN or null",
  "confidence": 0.8,
  "reasoning": "brief explanation",
  "derived_class_properties": {"Derived1": ["extra", "props"]}
}"#;

pub const ENUM_SYSTEM_PROMPT: &str = r#"You are a data modeling expert. Identify columns in the schema that hold a small closed set of codes or statuses and should be modeled as enumerations. Use the documentation and sample values when present.

Return ONLY a JSON array, no other text. Each element:
{
  "name": "PascalCase enumeration name",
  "source_table": "TABLE",
  "source_column": "COLUMN",
  "values": ["VALUE_ONE", "VALUE_TWO"],
  "confidence": 0.8,
  "description": "what the enumeration represents",
  "value_descriptions": {"VALUE_ONE": "meaning"}
}"#;

pub const CONSTRAINT_SYSTEM_PROMPT: &str = r#"You are a data modeling expert. Propose validation constraints for the classes derived from this schema. Express each constraint in a Pure-style boolean expression over $this properties, e.g. "$this.amount > 0".

Return ONLY a JSON array, no other text. Each element:
{
  "class_name": "PascalCase class",
  "constraint_name": "camelCase constraint name",
  "expression": "$this.amount > 0",
  "description": "what the constraint enforces",
  "confidence": 0.7
}"#;

pub const DERIVED_SYSTEM_PROMPT: &str = r#"You are a data modeling expert. Propose computed (derived) properties for the classes derived from this schema: totals over associations, derived flags, combined display names, durations.

Return ONLY a JSON array, no other text. Each element:
{
  "class_name": "PascalCase class",
  "property_name": "camelCase property name",
  "expression": "$this.quantity * $this.price",
  "return_type": "Float",
  "description": "what the property computes",
  "confidence": 0.7
}"#;

pub const ERD_SYSTEM_PROMPT: &str = r#"You are an expert at reading entity-relationship diagrams. Extract every relationship (foreign key edge) visible in the image.

Return ONLY a JSON array, no other text. Each element:
{
  "source_table": "table on the many side",
  "source_column": "FK column if visible, else best guess",
  "target_table": "referenced table",
  "target_column": "referenced column, usually the primary key",
  "relationship_type": "many_to_one",
  "confidence": 0.9,
  "reasoning": "what in the diagram shows this"
}"#;

/// Render the schema the way every analyzer prompt consumes it.
pub fn format_schema(database: &Database) -> String {
    let mut lines = vec![format!("Database: {}\n", database.name)];

    for schema in &database.schemas {
        lines.push(format!("Schema: {}", schema.name));
        for table in &schema.tables {
            lines.push(format!("\n  Table: {}", table.name));
            lines.push("  Columns:".to_string());
            for col in &table.columns {
                let pk_marker = if col.is_primary_key { " [PK]" } else { "" };
                let nullable = if col.is_nullable {
                    " (nullable)"
                } else {
                    " (not null)"
                };
                lines.push(format!(
                    "    - {}: {}{}{}",
                    col.name, col.data_type, pk_marker, nullable
                ));
            }
            if !table.primary_key_columns.is_empty() {
                lines.push(format!(
                    "  Primary Key: {}",
                    table.primary_key_columns.join(", ")
                ));
            }
        }
    }
    lines.join("\n")
}

/// Render known relationships (used by the derived-property prompt so the
/// model can propose association aggregates).
pub fn format_relationships(database: &Database) -> String {
    if database.relationships.is_empty() {
        return "(no relationships known)".to_string();
    }
    database
        .relationships
        .iter()
        .map(|r| {
            format!(
                "- {}.{} -> {}.{} ({})",
                r.source_table, r.source_column, r.target_table, r.target_column, r.relationship_type
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_relationship_prompt(database: &Database) -> String {
    format!("DATABASE SCHEMA:\n{}", format_schema(database))
}

pub fn format_hierarchy_prompt(database: &Database, documentation: Option<&str>) -> String {
    let mut prompt = format!("DATABASE SCHEMA:\n{}", format_schema(database));
    if let Some(docs) = documentation {
        prompt.push_str(&format!("\n\nDOCUMENTATION:\n{}", truncate(docs, 8000)));
    }
    prompt
}

pub fn format_enum_prompt(
    database: &Database,
    documentation: Option<&str>,
    sample_values: Option<&BTreeMap<String, Vec<String>>>,
) -> String {
    let mut prompt = format!("DATABASE SCHEMA:\n{}", format_schema(database));
    if let Some(samples) = sample_values {
        if !samples.is_empty() {
            prompt.push_str("\n\nSAMPLE VALUES:");
            for (column_ref, values) in samples {
                prompt.push_str(&format!("\n- {}: {}", column_ref, values.join(", ")));
            }
        }
    }
    if let Some(docs) = documentation {
        prompt.push_str(&format!("\n\nDOCUMENTATION:\n{}", truncate(docs, 8000)));
    }
    prompt
}

pub fn format_constraint_prompt(
    database: &Database,
    documentation: Option<&str>,
    sql_queries: &[String],
) -> String {
    let mut prompt = format!("DATABASE SCHEMA:\n{}", format_schema(database));
    if !sql_queries.is_empty() {
        prompt.push_str("\n\nOBSERVED SQL QUERIES:\n");
        prompt.push_str(&truncate(&sql_queries.join("\n\n"), 8000));
    }
    if let Some(docs) = documentation {
        prompt.push_str(&format!("\n\nDOCUMENTATION:\n{}", truncate(docs, 8000)));
    }
    prompt
}

pub fn format_derived_prompt(
    database: &Database,
    documentation: Option<&str>,
    sql_queries: &[String],
) -> String {
    let mut prompt = format!(
        "DATABASE SCHEMA:\n{}\n\nKNOWN RELATIONSHIPS:\n{}",
        format_schema(database),
        format_relationships(database)
    );
    if !sql_queries.is_empty() {
        prompt.push_str("\n\nOBSERVED SQL QUERIES:\n");
        prompt.push_str(&truncate(&sql_queries.join("\n\n"), 8000));
    }
    if let Some(docs) = documentation {
        prompt.push_str(&format!("\n\nDOCUMENTATION:\n{}", truncate(docs, 8000)));
    }
    prompt
}

pub fn format_erd_prompt(known_tables: &[String]) -> String {
    if known_tables.is_empty() {
        "Extract all relationships from this diagram.".to_string()
    } else {
        format!(
            "Extract all relationships from this diagram. The schema contains these tables (use exact names where they match): {}",
            known_tables.join(", ")
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}\n... (truncated)")
    }
}
