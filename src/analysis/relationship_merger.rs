//! Priority-based merging of relationships from multiple evidence sources.
//!
//! A human-drawn ERD outranks an observed SQL JOIN, which outranks text
//! mentions, which outrank naming-pattern inference, which outranks LLM
//! guesses. Relationships with equal signatures collapse to the highest
//! priority origin; among equals the first seen wins.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::{debug, info};
use serde::Serialize;

use crate::documents::{DocumentOrigin, DocumentRelationship};
use crate::schema_model::{Database, Relationship, RelationshipSignature};

pub const DEFAULT_DOCUMENT_CONFIDENCE_FLOOR: f64 = 0.5;

/// Evidence source of a relationship, ordered by descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipOrigin {
    ErdImage,
    SqlJoin,
    Text,
    Pattern,
    Llm,
}

impl RelationshipOrigin {
    pub fn priority(&self) -> f64 {
        match self {
            RelationshipOrigin::ErdImage => 1.0,
            RelationshipOrigin::SqlJoin => 0.95,
            RelationshipOrigin::Text => 0.85,
            RelationshipOrigin::Pattern => 0.7,
            RelationshipOrigin::Llm => 0.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipOrigin::ErdImage => "document:erd_image",
            RelationshipOrigin::SqlJoin => "document:sql_join",
            RelationshipOrigin::Text => "document:text",
            RelationshipOrigin::Pattern => "pattern",
            RelationshipOrigin::Llm => "llm",
        }
    }
}

impl From<DocumentOrigin> for RelationshipOrigin {
    fn from(origin: DocumentOrigin) -> Self {
        match origin {
            DocumentOrigin::ErdImage => RelationshipOrigin::ErdImage,
            DocumentOrigin::SqlJoin => RelationshipOrigin::SqlJoin,
            DocumentOrigin::Text => RelationshipOrigin::Text,
        }
    }
}

impl fmt::Display for RelationshipOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one signature where origins of different priority
/// collided; the higher priority kept the slot.
#[derive(Debug, Clone, Serialize)]
pub struct MergeConflict {
    #[serde(serialize_with = "serialize_signature")]
    pub signature: RelationshipSignature,
    pub winner: RelationshipOrigin,
    pub loser: RelationshipOrigin,
}

fn serialize_signature<S: serde::Serializer>(
    sig: &RelationshipSignature,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&sig.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub relationships: Vec<Relationship>,
    /// Surviving relationship count per origin; zero entries omitted.
    pub statistics: BTreeMap<RelationshipOrigin, usize>,
    pub conflicts_resolved: Vec<MergeConflict>,
}

impl MergeResult {
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Relationship Merge Summary".to_string(),
            format!("Total relationships: {}", self.relationships.len()),
        ];
        for (origin, count) in &self.statistics {
            lines.push(format!("  From {}: {}", origin, count));
        }
        lines.push(format!(
            "Conflicts resolved: {}",
            self.conflicts_resolved.len()
        ));
        for conflict in &self.conflicts_resolved {
            lines.push(format!(
                "  {}: {} over {}",
                conflict.signature, conflict.winner, conflict.loser
            ));
        }
        lines.join("\n")
    }
}

pub struct RelationshipMerger {
    /// Document relationships below this confidence are ignored outright.
    document_confidence_floor: f64,
}

impl Default for RelationshipMerger {
    fn default() -> Self {
        RelationshipMerger {
            document_confidence_floor: DEFAULT_DOCUMENT_CONFIDENCE_FLOOR,
        }
    }
}

struct MergeState {
    entries: HashMap<RelationshipSignature, (Relationship, RelationshipOrigin)>,
    /// First-insertion order of signatures; replacement keeps position.
    order: Vec<RelationshipSignature>,
    counts: BTreeMap<RelationshipOrigin, i64>,
    conflicts: Vec<MergeConflict>,
}

impl MergeState {
    fn new() -> Self {
        MergeState {
            entries: HashMap::new(),
            order: Vec::new(),
            counts: BTreeMap::new(),
            conflicts: Vec::new(),
        }
    }

    fn offer(&mut self, relationship: Relationship, origin: RelationshipOrigin) {
        let signature = relationship.signature();
        match self.entries.get(&signature) {
            None => {
                self.order.push(signature.clone());
                self.entries.insert(signature, (relationship, origin));
                *self.counts.entry(origin).or_insert(0) += 1;
            }
            Some((_, existing_origin)) if origin.priority() > existing_origin.priority() => {
                let loser = *existing_origin;
                self.conflicts.push(MergeConflict {
                    signature: signature.clone(),
                    winner: origin,
                    loser,
                });
                *self.counts.entry(loser).or_insert(0) -= 1;
                *self.counts.entry(origin).or_insert(0) += 1;
                self.entries.insert(signature, (relationship, origin));
            }
            Some((_, existing_origin)) if origin.priority() < existing_origin.priority() => {
                let winner = *existing_origin;
                debug!(
                    "Dropping {} relationship {}; {} already present",
                    origin, signature, winner
                );
                self.conflicts.push(MergeConflict {
                    signature,
                    winner,
                    loser: origin,
                });
            }
            Some((_, existing_origin)) => {
                // equal priority, first seen wins
                debug!(
                    "Dropping duplicate {} relationship {}; {} already present",
                    origin, signature, existing_origin
                );
            }
        }
    }

    /// LLM relationships never displace anything, they only fill gaps.
    fn offer_fill_only(&mut self, relationship: Relationship) {
        let signature = relationship.signature();
        if self.entries.contains_key(&signature) {
            return;
        }
        self.order.push(signature.clone());
        self.entries
            .insert(signature, (relationship, RelationshipOrigin::Llm));
        *self.counts.entry(RelationshipOrigin::Llm).or_insert(0) += 1;
    }

    fn finish(mut self) -> MergeResult {
        let relationships = self
            .order
            .iter()
            .filter_map(|sig| self.entries.remove(sig).map(|(rel, _)| rel))
            .collect();
        let statistics = self
            .counts
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(origin, count)| (origin, count as usize))
            .collect();
        MergeResult {
            relationships,
            statistics,
            conflicts_resolved: self.conflicts,
        }
    }
}

impl RelationshipMerger {
    pub fn new(document_confidence_floor: f64) -> Self {
        RelationshipMerger {
            document_confidence_floor,
        }
    }

    pub fn merge(
        &self,
        document_relationships: &[DocumentRelationship],
        pattern_relationships: &[Relationship],
        llm_relationships: &[Relationship],
    ) -> MergeResult {
        let mut state = MergeState::new();

        for doc_rel in document_relationships {
            if doc_rel.confidence < self.document_confidence_floor {
                debug!(
                    "Skipping low-confidence document relationship {:?} ({:.2})",
                    doc_rel.signature(),
                    doc_rel.confidence
                );
                continue;
            }
            state.offer(doc_rel.to_relationship(), doc_rel.origin.into());
        }

        for rel in pattern_relationships {
            state.offer(rel.clone(), RelationshipOrigin::Pattern);
        }

        for rel in llm_relationships {
            state.offer_fill_only(rel.clone());
        }

        let result = state.finish();
        info!(
            "Merged {} relationships ({} conflicts resolved)",
            result.relationships.len(),
            result.conflicts_resolved.len()
        );
        result
    }

    /// Merge against the database's current (pattern-detected) set and
    /// install the merged result as the authoritative one.
    pub fn apply_to_database(
        &self,
        database: &mut Database,
        document_relationships: &[DocumentRelationship],
        llm_relationships: &[Relationship],
    ) -> MergeResult {
        let result = self.merge(
            document_relationships,
            &database.relationships,
            llm_relationships,
        );
        database.relationships = result.relationships.clone();
        result
    }
}
