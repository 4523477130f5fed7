//! Unified relationship extraction across documentation sources.
//!
//! ERD images and SQL JOINs found in documents both end up as
//! [`DocumentRelationship`] values carrying their extraction origin and a
//! confidence score, ready for the relationship merger.

use std::collections::HashSet;

use futures_util::future::join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::schema_model::naming::{pluralize, to_camel_case};
use crate::schema_model::{Relationship, RelationshipType};

use super::erd::{filter_by_known_tables, ErdAnalyzer, ErdRelationship};
use super::source::DocumentationSource;
use super::sql_joins::{self, JoinRelationship};

/// How a document relationship was extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrigin {
    ErdImage,
    SqlJoin,
    Text,
}

/// A relationship discovered from documentation, with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRelationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub relationship_type: RelationshipType,
    pub property_name: String,
    pub confidence: f64,
    pub origin: DocumentOrigin,
    pub reasoning: String,
    pub source_document: String,
    pub page_number: Option<u32>,
}

impl DocumentRelationship {
    pub fn signature(&self) -> (String, String, String, String) {
        (
            self.source_table.to_uppercase(),
            self.source_column.to_uppercase(),
            self.target_table.to_uppercase(),
            self.target_column.to_uppercase(),
        )
    }

    pub fn to_relationship(&self) -> Relationship {
        Relationship {
            source_table: self.source_table.clone(),
            source_column: self.source_column.clone(),
            target_table: self.target_table.clone(),
            target_column: self.target_column.clone(),
            relationship_type: self.relationship_type,
            property_name: self.property_name.clone(),
        }
    }

    pub fn from_erd(erd: ErdRelationship, source_document: &str) -> Self {
        let property_name = association_property(&erd.target_table, erd.relationship_type);
        DocumentRelationship {
            source_table: erd.source_table,
            source_column: erd.source_column,
            target_table: erd.target_table,
            target_column: erd.target_column,
            relationship_type: erd.relationship_type,
            property_name,
            confidence: erd.confidence,
            origin: DocumentOrigin::ErdImage,
            reasoning: erd.reasoning,
            source_document: source_document.to_string(),
            page_number: erd.source_page,
        }
    }

    /// SQL JOINs carry fixed 0.85 confidence. The `_id`-suffixed side of
    /// the equality is taken as the FK side, falling back to the left.
    pub fn from_join(join: JoinRelationship, source_document: &str) -> Self {
        let (source_table, source_column, target_table, target_column) =
            if join.left_column.to_lowercase().ends_with("_id") {
                (join.left_table, join.left_column, join.right_table, join.right_column)
            } else if join.right_column.to_lowercase().ends_with("_id") {
                (join.right_table, join.right_column, join.left_table, join.left_column)
            } else {
                (join.left_table, join.left_column, join.right_table, join.right_column)
            };

        let property_name = association_property(&target_table, RelationshipType::ManyToOne);
        DocumentRelationship {
            source_table,
            source_column,
            target_table,
            target_column,
            relationship_type: RelationshipType::ManyToOne,
            property_name,
            confidence: 0.85,
            origin: DocumentOrigin::SqlJoin,
            reasoning: format!("Extracted from SQL JOIN: {} JOIN", join.join_type),
            source_document: source_document.to_string(),
            page_number: None,
        }
    }
}

/// camelCase name for the association property, pluralized when the
/// source side sees a collection.
fn association_property(target_table: &str, relationship_type: RelationshipType) -> String {
    let name = to_camel_case(target_table);
    if relationship_type == RelationshipType::OneToMany {
        pluralize(&name)
    } else {
        name
    }
}

/// Extracts relationships from every documentation source, concurrently,
/// and deduplicates across sources by signature.
pub struct DocumentRelationshipAnalyzer {
    erd_analyzer: Option<ErdAnalyzer>,
}

impl DocumentRelationshipAnalyzer {
    /// Without a vision channel only SQL content is analyzed; images are
    /// skipped.
    pub fn new(erd_analyzer: Option<ErdAnalyzer>) -> Self {
        DocumentRelationshipAnalyzer { erd_analyzer }
    }

    pub async fn analyze_documents(
        &self,
        sources: &[DocumentationSource],
        known_tables: &[String],
    ) -> Vec<DocumentRelationship> {
        let tasks = sources
            .iter()
            .map(|source| self.analyze_single_source(source, known_tables));
        let results = join_all(tasks).await;

        let mut seen: HashSet<(String, String, String, String)> = HashSet::new();
        let mut relationships = Vec::new();
        for rels in results {
            for rel in rels {
                if seen.insert(rel.signature()) {
                    relationships.push(rel);
                }
            }
        }

        info!(
            "Extracted {} unique relationships from {} documents",
            relationships.len(),
            sources.len()
        );
        relationships
    }

    async fn analyze_single_source(
        &self,
        source: &DocumentationSource,
        known_tables: &[String],
    ) -> Vec<DocumentRelationship> {
        let mut relationships = Vec::new();

        if source.has_images() {
            if let Some(analyzer) = &self.erd_analyzer {
                let erd_rels = analyzer.analyze_images(&source.images, known_tables).await;
                let erd_rels = filter_by_known_tables(erd_rels, known_tables);
                relationships.extend(
                    erd_rels
                        .into_iter()
                        .map(|r| DocumentRelationship::from_erd(r, &source.source_path)),
                );
            } else {
                debug!(
                    "No vision channel configured; skipping {} image(s) in {}",
                    source.images.len(),
                    source.source_path
                );
            }
        }

        relationships.extend(self.analyze_sql_content(source, known_tables));
        relationships
    }

    /// JOIN extraction from document text, filtered to known tables with
    /// names normalized to the schema's casing.
    fn analyze_sql_content(
        &self,
        source: &DocumentationSource,
        known_tables: &[String],
    ) -> Vec<DocumentRelationship> {
        if source.content.is_empty() {
            return Vec::new();
        }

        let known_map: std::collections::HashMap<String, String> = known_tables
            .iter()
            .map(|t| (t.to_uppercase(), t.clone()))
            .collect();

        let mut relationships = Vec::new();
        for mut join in sql_joins::extract_from_text(&source.content) {
            let left = known_map.get(&join.left_table.to_uppercase());
            let right = known_map.get(&join.right_table.to_uppercase());
            let (Some(left), Some(right)) = (left, right) else {
                continue;
            };
            join.left_table = left.clone();
            join.right_table = right.clone();
            relationships.push(DocumentRelationship::from_join(join, &source.source_path));
        }

        debug!(
            "Extracted {} SQL JOIN relationships from {}",
            relationships.len(),
            source.source_path
        );
        relationships
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(lt: &str, lc: &str, rt: &str, rc: &str) -> JoinRelationship {
        JoinRelationship {
            left_table: lt.to_string(),
            left_column: lc.to_string(),
            right_table: rt.to_string(),
            right_column: rc.to_string(),
            join_type: "LEFT".to_string(),
        }
    }

    #[test]
    fn join_fk_side_is_the_id_column() {
        let rel = DocumentRelationship::from_join(join("customers", "id", "orders", "customer_id"), "q.sql");
        assert_eq!(rel.source_table, "orders");
        assert_eq!(rel.source_column, "customer_id");
        assert_eq!(rel.target_table, "customers");
        assert_eq!(rel.property_name, "customers");
        assert_eq!(rel.origin, DocumentOrigin::SqlJoin);
        assert!((rel.confidence - 0.85).abs() < 1e-9);
        assert_eq!(rel.reasoning, "Extracted from SQL JOIN: LEFT JOIN");
    }

    #[test]
    fn join_without_id_suffix_defaults_to_left() {
        let rel = DocumentRelationship::from_join(join("a", "code", "b", "code"), "q.sql");
        assert_eq!(rel.source_table, "a");
        assert_eq!(rel.target_table, "b");
    }

    #[tokio::test]
    async fn sql_only_analysis_filters_unknown_tables() {
        let analyzer = DocumentRelationshipAnalyzer::new(None);
        let source = DocumentationSource::from_text(
            "docs/queries.md",
            "```sql\nSELECT * FROM orders o JOIN customers c ON o.customer_id = c.id;\nSELECT * FROM orders o JOIN ghosts g ON o.ghost_id = g.id;\n```",
        );
        let known = vec!["ORDERS".to_string(), "CUSTOMERS".to_string()];
        let rels = analyzer.analyze_documents(&[source], &known).await;
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source_table, "ORDERS");
        assert_eq!(rels[0].target_table, "CUSTOMERS");
        assert_eq!(rels[0].source_document, "docs/queries.md");
    }
}
