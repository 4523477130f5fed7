//! ERD diagram analysis through the vision side of the suggestion channel.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use serde::Deserialize;
use serde::Serialize;

use crate::llm::json_extract::parse_items;
use crate::llm::prompts::{format_erd_prompt, ERD_SYSTEM_PROMPT};
use crate::llm::SuggestionChannel;
use crate::schema_model::RelationshipType;

use super::source::ExtractedImage;

/// A relationship read off an ERD image.
#[derive(Debug, Clone, Serialize)]
pub struct ErdRelationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    pub reasoning: String,
    pub source_page: Option<u32>,
}

/// Raw channel output; anything missing falls back to FK defaults.
#[derive(Debug, Deserialize)]
struct RawErdRelationship {
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
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn default_target_column() -> String {
    "id".to_string()
}

fn default_confidence() -> f64 {
    0.5
}

pub struct ErdAnalyzer {
    channel: Arc<dyn SuggestionChannel>,
}

impl ErdAnalyzer {
    pub fn new(channel: Arc<dyn SuggestionChannel>) -> Self {
        ErdAnalyzer { channel }
    }

    /// Analyze one image. Channel failures and unparseable responses
    /// degrade to an empty list.
    pub async fn analyze_image(
        &self,
        image: &ExtractedImage,
        known_tables: &[String],
    ) -> Vec<ErdRelationship> {
        let prompt = format_erd_prompt(known_tables);
        let response = match self
            .channel
            .complete_with_image(ERD_SYSTEM_PROMPT, &prompt, &image.data, image.media_type())
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to analyze ERD image: {e}");
                return Vec::new();
            }
        };

        let known_map: HashMap<String, String> = known_tables
            .iter()
            .map(|t| (t.to_uppercase(), t.clone()))
            .collect();

        let relationships: Vec<ErdRelationship> = parse_items::<RawErdRelationship>(&response)
            .into_iter()
            .filter(|raw| !raw.source_table.is_empty() && !raw.target_table.is_empty())
            .map(|raw| ErdRelationship {
                source_table: normalize(&raw.source_table, &known_map),
                source_column: raw.source_column,
                target_table: normalize(&raw.target_table, &known_map),
                target_column: raw.target_column,
                relationship_type: RelationshipType::parse(&raw.relationship_type)
                    .unwrap_or(RelationshipType::ManyToOne),
                confidence: raw.confidence,
                reasoning: raw.reasoning,
                source_page: image.page_number,
            })
            .collect();

        info!(
            "Extracted {} relationships from image (page {:?})",
            relationships.len(),
            image.page_number
        );
        relationships
    }

    /// Analyze several images, deduplicating by signature across them.
    pub async fn analyze_images(
        &self,
        images: &[ExtractedImage],
        known_tables: &[String],
    ) -> Vec<ErdRelationship> {
        let mut seen = std::collections::HashSet::new();
        let mut all = Vec::new();
        for image in images {
            for rel in self.analyze_image(image, known_tables).await {
                let sig = (
                    rel.source_table.to_uppercase(),
                    rel.source_column.to_uppercase(),
                    rel.target_table.to_uppercase(),
                    rel.target_column.to_uppercase(),
                );
                if seen.insert(sig) {
                    all.push(rel);
                }
            }
        }
        all
    }
}

/// Keep only relationships whose tables the schema actually contains.
pub fn filter_by_known_tables(
    relationships: Vec<ErdRelationship>,
    known_tables: &[String],
) -> Vec<ErdRelationship> {
    let known: std::collections::HashSet<String> =
        known_tables.iter().map(|t| t.to_uppercase()).collect();
    relationships
        .into_iter()
        .filter(|r| {
            known.contains(&r.source_table.to_uppercase())
                && known.contains(&r.target_table.to_uppercase())
        })
        .collect()
}

fn normalize(table: &str, known_map: &HashMap<String, String>) -> String {
    known_map
        .get(&table.to_uppercase())
        .cloned()
        .unwrap_or_else(|| table.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_requires_both_sides_known() {
        let known = vec!["ORDERS".to_string(), "CUSTOMERS".to_string()];
        let rels = vec![
            erd_rel("ORDERS", "CUSTOMERS"),
            erd_rel("ORDERS", "GHOSTS"),
            erd_rel("SPIRITS", "CUSTOMERS"),
        ];
        let kept = filter_by_known_tables(rels, &known);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].target_table, "CUSTOMERS");
    }

    fn erd_rel(source: &str, target: &str) -> ErdRelationship {
        ErdRelationship {
            source_table: source.to_string(),
            source_column: "X_ID".to_string(),
            target_table: target.to_string(),
            target_column: "ID".to_string(),
            relationship_type: RelationshipType::ManyToOne,
            confidence: 0.9,
            reasoning: String::new(),
            source_page: None,
        }
    }
}
