//! LLM-backed relationship discovery for schemas without declared
//! foreign keys.
//!
//! The channel proposes probable FK edges from column naming and domain
//! knowledge; everything below a confidence threshold or naming an
//! unknown table is dropped before it reaches the merger.

use std::sync::Arc;

use log::{info, warn};
use serde::Deserialize;

use crate::llm::json_extract::parse_items;
use crate::llm::prompts::{format_relationship_prompt, RELATIONSHIP_SYSTEM_PROMPT};
use crate::llm::SuggestionChannel;
use crate::schema_model::models::{Database, Relationship, RelationshipType};

pub const DEFAULT_DISCOVERY_THRESHOLD: f64 = 0.6;

#[derive(Debug, Deserialize)]
struct RawDiscoveredRelationship {
    #[serde(default)]
    source_table: String,
    #[serde(default)]
    source_column: String,
    #[serde(default)]
    target_table: String,
    #[serde(default = "default_target_column")]
    target_column: String,
    #[serde(default)]
    relationship_type: String,
    #[serde(default)]
    property_name: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_target_column() -> String {
    "id".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

pub struct RelationshipDiscovery {
    channel: Arc<dyn SuggestionChannel>,
}

impl RelationshipDiscovery {
    pub fn new(channel: Arc<dyn SuggestionChannel>) -> Self {
        RelationshipDiscovery { channel }
    }

    /// Ask the channel for probable relationships and keep those above
    /// `confidence_threshold` that reference known tables.
    pub async fn discover(
        &self,
        database: &Database,
        confidence_threshold: f64,
    ) -> Vec<Relationship> {
        info!(
            "Starting LLM-based relationship discovery for {}",
            database.name
        );

        let prompt = format_relationship_prompt(database);
        let response = match self
            .channel
            .complete(RELATIONSHIP_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Relationship discovery failed: {}", e);
                return Vec::new();
            }
        };

        let raw = parse_items::<RawDiscoveredRelationship>(&response);
        let total = raw.len();

        let relationships: Vec<Relationship> = raw
            .into_iter()
            .filter(|r| r.confidence >= confidence_threshold)
            .filter_map(|r| validate(r, database))
            .collect();

        info!(
            "Discovered {} relationships ({} kept above {:.1} confidence threshold)",
            total,
            relationships.len(),
            confidence_threshold
        );

        relationships
    }
}

/// Require the essential fields and both endpoints to exist, and rewrite
/// table names to the schema's own casing.
fn validate(raw: RawDiscoveredRelationship, database: &Database) -> Option<Relationship> {
    if raw.source_table.is_empty() || raw.source_column.is_empty() || raw.property_name.is_empty()
    {
        warn!("Skipping incomplete discovered relationship");
        return None;
    }

    let source_table = match database.canonical_table_name(&raw.source_table) {
        Some(name) => name,
        None => {
            warn!(
                "Skipping relationship: source table '{}' not found",
                raw.source_table
            );
            return None;
        }
    };
    let target_table = match database.canonical_table_name(&raw.target_table) {
        Some(name) => name,
        None => {
            warn!(
                "Skipping relationship: target table '{}' not found",
                raw.target_table
            );
            return None;
        }
    };

    Some(Relationship {
        source_table,
        source_column: raw.source_column,
        target_table,
        target_column: raw.target_column,
        relationship_type: RelationshipType::parse(&raw.relationship_type)
            .unwrap_or(RelationshipType::ManyToOne),
        property_name: raw.property_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_model::models::{Column, Schema, Table};

    fn trading_database() -> Database {
        let table = |name: &str| Table {
            name: name.to_string(),
            schema: "public".to_string(),
            columns: vec![Column {
                name: "ID".to_string(),
                data_type: "INTEGER".to_string(),
                is_nullable: false,
                is_primary_key: true,
            }],
            primary_key_columns: vec!["ID".to_string()],
            relationships: vec![],
        };
        Database {
            name: "trading".to_string(),
            schemas: vec![Schema {
                name: "public".to_string(),
                tables: vec![table("TRADES"), table("INSTRUMENTS")],
            }],
            relationships: vec![],
        }
    }

    #[test]
    fn validation_normalizes_casing_and_rejects_unknown_tables() {
        let db = trading_database();

        let good = RawDiscoveredRelationship {
            source_table: "trades".to_string(),
            source_column: "INSTRUMENT_ID".to_string(),
            target_table: "instruments".to_string(),
            target_column: "ID".to_string(),
            relationship_type: "many_to_one".to_string(),
            property_name: "instrument".to_string(),
            confidence: 0.9,
        };
        let rel = validate(good, &db).unwrap();
        assert_eq!(rel.source_table, "TRADES");
        assert_eq!(rel.target_table, "INSTRUMENTS");
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);

        let unknown = RawDiscoveredRelationship {
            source_table: "TRADES".to_string(),
            source_column: "BOOK_ID".to_string(),
            target_table: "BOOKS".to_string(),
            target_column: "ID".to_string(),
            relationship_type: "many_to_one".to_string(),
            property_name: "book".to_string(),
            confidence: 0.9,
        };
        assert!(validate(unknown, &db).is_none());

        let incomplete = RawDiscoveredRelationship {
            source_table: "TRADES".to_string(),
            source_column: String::new(),
            target_table: "INSTRUMENTS".to_string(),
            target_column: "ID".to_string(),
            relationship_type: String::new(),
            property_name: "instrument".to_string(),
            confidence: 0.9,
        };
        assert!(validate(incomplete, &db).is_none());
    }

    #[test]
    fn unparseable_relationship_type_defaults_to_many_to_one() {
        let db = trading_database();
        let raw = RawDiscoveredRelationship {
            source_table: "TRADES".to_string(),
            source_column: "INSTRUMENT_ID".to_string(),
            target_table: "INSTRUMENTS".to_string(),
            target_column: "ID".to_string(),
            relationship_type: "belongs_to".to_string(),
            property_name: "instrument".to_string(),
            confidence: 0.7,
        };
        let rel = validate(raw, &db).unwrap();
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
    }
}
