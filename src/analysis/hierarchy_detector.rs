//! Class inheritance opportunity detection.
//!
//! Three signals feed this analyzer: discriminator-style columns, naming
//! groups sharing a class-name suffix, and pairwise column overlap. The
//! suggestion channel can add hierarchies the patterns miss. Results with
//! the same base class name are merged into one opportunity.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::warn;
use serde::Deserialize;

use crate::llm::json_extract::parse_items;
use crate::llm::prompts::{format_hierarchy_prompt, HIERARCHY_SYSTEM_PROMPT};
use crate::llm::SuggestionChannel;
use crate::schema_model::{Database, Table};

use super::models::{AnalysisSource, InheritanceOpportunity};

pub const DEFAULT_MIN_OVERLAP: f64 = 0.70;

const DISCRIMINATOR_SUFFIXES: [&str; 5] = ["_TYPE", "_CATEGORY", "_KIND", "_CLASS", "_SUBTYPE"];
const DISCRIMINATOR_PREFIXES: [&str; 4] = ["TYPE_", "CATEGORY_", "KIND_", "CLASS_"];

struct ColumnOverlap<'a> {
    table1: &'a Table,
    table2: &'a Table,
    shared: BTreeSet<String>,
    percentage: f64,
}

#[derive(Debug, Deserialize)]
struct RawHierarchy {
    #[serde(default)]
    base_class_name: String,
    #[serde(default)]
    base_class_properties: Vec<String>,
    #[serde(default)]
    derived_classes: Vec<String>,
    #[serde(default)]
    discriminator_column: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    derived_class_properties: BTreeMap<String, Vec<String>>,
}

fn default_confidence() -> f64 {
    0.5
}

pub struct HierarchyDetector {
    channel: Option<Arc<dyn SuggestionChannel>>,
    min_overlap: f64,
}

impl HierarchyDetector {
    pub fn new(channel: Option<Arc<dyn SuggestionChannel>>) -> Self {
        HierarchyDetector {
            channel,
            min_overlap: DEFAULT_MIN_OVERLAP,
        }
    }

    pub fn with_min_overlap(mut self, min_overlap: f64) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    pub async fn detect(
        &self,
        database: &Database,
        documentation: Option<&str>,
        use_llm: bool,
    ) -> Vec<InheritanceOpportunity> {
        let mut opportunities = Vec::new();
        opportunities.extend(self.detect_from_patterns(database));
        opportunities.extend(self.detect_from_column_overlap(database));

        if use_llm {
            if let Some(channel) = &self.channel {
                opportunities.extend(detect_with_llm(channel.as_ref(), database, documentation).await);
            }
        }

        merge_opportunities(opportunities)
    }

    /// Discriminator columns and common-suffix naming groups.
    fn detect_from_patterns(&self, database: &Database) -> Vec<InheritanceOpportunity> {
        let tables: Vec<&Table> = database.all_tables().collect();
        let mut opportunities = Vec::new();

        for table in &tables {
            if let Some(discriminator) = find_discriminator_column(table) {
                opportunities.push(InheritanceOpportunity {
                    base_class_name: table.class_name(),
                    base_class_properties: table.column_names(),
                    // the channel or a human fills these in later
                    derived_classes: Vec::new(),
                    discriminator_column: Some(discriminator.clone()),
                    confidence: 0.6,
                    reasoning: format!("Table has discriminator column: {discriminator}"),
                    source: AnalysisSource::SchemaPattern,
                    derived_class_properties: BTreeMap::new(),
                });
            }
        }

        for (base_name, group) in group_by_naming_pattern(&tables) {
            if group.len() < 2 {
                continue;
            }
            let common = common_columns(&group);
            if common.len() < 3 {
                continue;
            }
            let derived_class_properties = group
                .iter()
                .map(|t| {
                    let specific: Vec<String> = t
                        .columns
                        .iter()
                        .filter(|c| !common.contains(&c.name.to_uppercase()))
                        .map(|c| c.name.clone())
                        .collect();
                    (t.class_name(), specific)
                })
                .collect();
            opportunities.push(InheritanceOpportunity {
                base_class_name: base_name,
                base_class_properties: common.iter().cloned().collect(),
                derived_classes: group.iter().map(|t| t.class_name()).collect(),
                discriminator_column: None,
                confidence: 0.7,
                reasoning: format!(
                    "Naming pattern suggests hierarchy with {} derived classes",
                    group.len()
                ),
                source: AnalysisSource::SchemaPattern,
                derived_class_properties,
            });
        }

        opportunities
    }

    /// Pairs of tables sharing most of their columns: the smaller table is
    /// proposed as the base, the larger as the derived class.
    fn detect_from_column_overlap(&self, database: &Database) -> Vec<InheritanceOpportunity> {
        let tables: Vec<&Table> = database.all_tables().collect();
        let mut overlaps = calculate_overlaps(&tables);
        overlaps.retain(|o| o.percentage >= self.min_overlap);
        overlaps.sort_by(|a, b| {
            b.percentage
                .partial_cmp(&a.percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.table1.name.cmp(&b.table1.name))
                .then_with(|| a.table2.name.cmp(&b.table2.name))
        });

        let mut processed: BTreeSet<String> = BTreeSet::new();
        let mut opportunities = Vec::new();

        for overlap in overlaps {
            let t1_name = overlap.table1.name.clone();
            let t2_name = overlap.table2.name.clone();
            if processed.contains(&t1_name) && processed.contains(&t2_name) {
                continue;
            }

            let (base, derived) = if overlap.table1.columns.len() <= overlap.table2.columns.len() {
                (overlap.table1, overlap.table2)
            } else {
                (overlap.table2, overlap.table1)
            };

            let derived_specific: Vec<String> = derived
                .columns
                .iter()
                .filter(|c| !overlap.shared.contains(&c.name.to_uppercase()))
                .map(|c| c.name.clone())
                .collect();
            let mut derived_class_properties = BTreeMap::new();
            derived_class_properties.insert(derived.class_name(), derived_specific);

            opportunities.push(InheritanceOpportunity {
                base_class_name: base.class_name(),
                base_class_properties: base
                    .columns
                    .iter()
                    .filter(|c| overlap.shared.contains(&c.name.to_uppercase()))
                    .map(|c| c.name.clone())
                    .collect(),
                derived_classes: vec![derived.class_name()],
                discriminator_column: None,
                confidence: (overlap.percentage + 0.1).min(0.9),
                reasoning: format!(
                    "{:.0}% column overlap between tables",
                    overlap.percentage * 100.0
                ),
                source: AnalysisSource::SchemaPattern,
                derived_class_properties,
            });

            processed.insert(t1_name);
            processed.insert(t2_name);
        }

        opportunities
    }
}

async fn detect_with_llm(
    channel: &dyn SuggestionChannel,
    database: &Database,
    documentation: Option<&str>,
) -> Vec<InheritanceOpportunity> {
    let prompt = format_hierarchy_prompt(database, documentation);
    let response = match channel.complete(HIERARCHY_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!("LLM-based hierarchy detection failed: {e}");
            return Vec::new();
        }
    };

    parse_items::<RawHierarchy>(&response)
        .into_iter()
        .filter(|raw| !raw.base_class_name.is_empty())
        .map(|raw| InheritanceOpportunity {
            base_class_name: raw.base_class_name,
            base_class_properties: raw.base_class_properties,
            derived_classes: raw.derived_classes,
            discriminator_column: raw.discriminator_column,
            confidence: raw.confidence,
            reasoning: raw.reasoning,
            source: AnalysisSource::LlmInference,
            derived_class_properties: raw.derived_class_properties,
        })
        .collect()
}

fn find_discriminator_column(table: &Table) -> Option<String> {
    for col in &table.columns {
        let upper = col.name.to_uppercase();
        let is_discriminator = DISCRIMINATOR_SUFFIXES.iter().any(|s| upper.ends_with(s))
            || DISCRIMINATOR_PREFIXES.iter().any(|p| upper.starts_with(p));
        if is_discriminator {
            return Some(col.name.clone());
        }
    }
    None
}

/// Group tables whose class names share a suffix starting at a word
/// boundary, e.g. SavingsAccount / CheckingAccount -> Account.
fn group_by_naming_pattern<'a>(tables: &[&'a Table]) -> BTreeMap<String, Vec<&'a Table>> {
    let mut groups: BTreeMap<String, Vec<&Table>> = BTreeMap::new();

    for (i, table) in tables.iter().enumerate() {
        let class_name = table.class_name();
        for (j, other) in tables.iter().enumerate() {
            if i == j {
                continue;
            }
            let Some(base_name) = find_common_suffix(&class_name, &other.class_name()) else {
                continue;
            };
            let group = groups.entry(base_name).or_default();
            for candidate in [*table, *other] {
                if !group.iter().any(|t| t.name == candidate.name) {
                    group.push(candidate);
                }
            }
        }
    }
    groups
}

/// Longest common suffix of two class names, accepted only when it starts
/// with an uppercase letter and has at least 3 characters.
fn find_common_suffix(name1: &str, name2: &str) -> Option<String> {
    let chars1: Vec<char> = name1.chars().collect();
    let chars2: Vec<char> = name2.chars().collect();
    let common_len = chars1
        .iter()
        .rev()
        .zip(chars2.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    if common_len < 3 {
        return None;
    }
    let suffix: String = chars1[chars1.len() - common_len..].iter().collect();
    if suffix.chars().next().is_some_and(|c| c.is_uppercase()) {
        Some(suffix)
    } else {
        None
    }
}

fn common_columns(tables: &[&Table]) -> BTreeSet<String> {
    let Some(first) = tables.first() else {
        return BTreeSet::new();
    };
    let mut common: BTreeSet<String> =
        first.columns.iter().map(|c| c.name.to_uppercase()).collect();
    for table in &tables[1..] {
        let cols: BTreeSet<String> = table.columns.iter().map(|c| c.name.to_uppercase()).collect();
        common = common.intersection(&cols).cloned().collect();
    }
    common
}

fn calculate_overlaps<'a>(tables: &[&'a Table]) -> Vec<ColumnOverlap<'a>> {
    let mut overlaps = Vec::new();
    for (i, t1) in tables.iter().enumerate() {
        for t2 in &tables[i + 1..] {
            let cols1: BTreeSet<String> = t1.columns.iter().map(|c| c.name.to_uppercase()).collect();
            let cols2: BTreeSet<String> = t2.columns.iter().map(|c| c.name.to_uppercase()).collect();
            let shared: BTreeSet<String> = cols1.intersection(&cols2).cloned().collect();
            if shared.is_empty() {
                continue;
            }
            let percentage = shared.len() as f64 / cols1.len().min(cols2.len()) as f64;
            overlaps.push(ColumnOverlap {
                table1: t1,
                table2: t2,
                shared,
                percentage,
            });
        }
    }
    overlaps
}

/// Collapse opportunities sharing a base class name into one, unioning
/// derived classes and properties and keeping the best confidence.
fn merge_opportunities(opportunities: Vec<InheritanceOpportunity>) -> Vec<InheritanceOpportunity> {
    let mut order: Vec<String> = Vec::new();
    let mut by_base: HashMap<String, Vec<InheritanceOpportunity>> = HashMap::new();
    for opp in opportunities {
        if !by_base.contains_key(&opp.base_class_name) {
            order.push(opp.base_class_name.clone());
        }
        by_base.entry(opp.base_class_name.clone()).or_default().push(opp);
    }

    let mut merged = Vec::new();
    for base_name in order {
        let Some(group) = by_base.remove(&base_name) else {
            continue;
        };
        if group.len() == 1 {
            merged.extend(group);
            continue;
        }

        let mut derived: BTreeSet<String> = BTreeSet::new();
        let mut base_props: BTreeSet<String> = BTreeSet::new();
        let mut derived_props: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut discriminator = None;
        let mut best_confidence: f64 = 0.0;
        let mut reasonings = Vec::new();

        for opp in group {
            derived.extend(opp.derived_classes);
            base_props.extend(opp.base_class_properties);
            for (class, props) in opp.derived_class_properties {
                derived_props.entry(class).or_default().extend(props);
            }
            if opp.discriminator_column.is_some() {
                discriminator = opp.discriminator_column;
            }
            best_confidence = best_confidence.max(opp.confidence);
            if !opp.reasoning.is_empty() {
                reasonings.push(opp.reasoning);
            }
        }

        reasonings.truncate(3);
        merged.push(InheritanceOpportunity {
            base_class_name: base_name,
            base_class_properties: base_props.into_iter().collect(),
            derived_classes: derived.into_iter().collect(),
            discriminator_column: discriminator,
            confidence: best_confidence,
            reasoning: reasonings.join("; "),
            // mixed evidence
            source: AnalysisSource::LlmInference,
            derived_class_properties: derived_props
                .into_iter()
                .map(|(class, props)| (class, props.into_iter().collect()))
                .collect(),
        });
    }
    merged
}
