//! Orchestrates the analyzers into one `EnhancedModelSpec`.
//!
//! The analyzer first settles the relationship picture (pattern
//! detection, document extraction, LLM discovery, merged by priority),
//! then runs the enabled suggestion categories, caps each category, and
//! filters the assembled spec by the confidence threshold.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;
use validator::Validate;

use crate::analysis::constraint_analyzer::{ConstraintAnalyzer, DatabaseConstraint};
use crate::analysis::derived_analyzer::DerivedAnalyzer;
use crate::analysis::enum_detector::{EnumDetector, ValueFetcher};
use crate::analysis::hierarchy_detector::HierarchyDetector;
use crate::analysis::models::{
    ConstraintSuggestion, DerivedPropertySuggestion, EnhancedModelSpec, EnumerationCandidate,
    HierarchyRole, InheritanceOpportunity, TableAnalysis,
};
use crate::analysis::relationship_discovery::{
    RelationshipDiscovery, DEFAULT_DISCOVERY_THRESHOLD,
};
use crate::analysis::relationship_merger::RelationshipMerger;
use crate::documents::{DocumentRelationshipAnalyzer, DocumentationSource, ErdAnalyzer};
use crate::llm::SuggestionChannel;
use crate::schema_model::models::Database;
use crate::schema_model::relationship_detector;

/// Table name suffixes that mark a lookup/reference table.
const REFERENCE_TABLE_SUFFIXES: &[&str] = &[
    "_TYPE",
    "_STATUS",
    "_CODE",
    "_CATEGORY",
    "_LOOKUP",
    "_REF",
    "_REFERENCE",
    "_MASTER",
];

/// Which analyses run and how their output is bounded.
///
/// Hierarchy, constraint, and derived detection default off: they
/// propose model changes a reviewer should opt into, while enums and
/// document relationships are safe enrichments.
#[derive(Debug, Clone, Validate)]
pub struct AnalysisOptions {
    pub detect_hierarchies: bool,
    pub detect_enums: bool,
    pub detect_constraints: bool,
    pub detect_derived: bool,
    pub analyze_document_relationships: bool,
    pub use_llm: bool,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub document_confidence_floor: f64,
    pub max_hierarchies: usize,
    pub max_enums: usize,
    pub max_constraints: usize,
    pub max_derived: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            detect_hierarchies: false,
            detect_enums: true,
            detect_constraints: false,
            detect_derived: false,
            analyze_document_relationships: true,
            use_llm: true,
            confidence_threshold: 0.7,
            document_confidence_floor: 0.5,
            max_hierarchies: 20,
            max_enums: 50,
            max_constraints: 100,
            max_derived: 50,
        }
    }
}

/// Everything an analysis run consumes. The database is mutated in
/// place when relationship sources improve on what it carries.
#[derive(Clone)]
pub struct AnalysisContext {
    pub database: Database,
    pub documentation: Option<String>,
    pub sql_queries: Vec<String>,
    pub db_constraints: Vec<DatabaseConstraint>,
    pub sample_values: Option<BTreeMap<String, Vec<String>>>,
    pub value_fetcher: Option<ValueFetcher>,
    pub doc_sources: Vec<DocumentationSource>,
}

impl AnalysisContext {
    pub fn new(database: Database) -> Self {
        AnalysisContext {
            database,
            documentation: None,
            sql_queries: Vec::new(),
            db_constraints: Vec::new(),
            sample_values: None,
            value_fetcher: None,
            doc_sources: Vec::new(),
        }
    }
}

pub struct SchemaAnalyzer {
    channel: Option<Arc<dyn SuggestionChannel>>,
    options: AnalysisOptions,
}

impl SchemaAnalyzer {
    pub fn new(channel: Option<Arc<dyn SuggestionChannel>>, options: AnalysisOptions) -> Self {
        SchemaAnalyzer { channel, options }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Run the enabled analyses one after another.
    pub async fn analyze(&self, context: &mut AnalysisContext) -> EnhancedModelSpec {
        self.prepare_relationships(context).await;

        let hierarchies = if self.options.detect_hierarchies {
            capped(
                HierarchyDetector::new(self.channel.clone())
                    .detect(
                        &context.database,
                        context.documentation.as_deref(),
                        self.options.use_llm,
                    )
                    .await,
                self.options.max_hierarchies,
            )
        } else {
            Vec::new()
        };

        let enumerations = if self.options.detect_enums {
            capped(
                EnumDetector::new(self.channel.clone())
                    .detect(
                        &context.database,
                        context.documentation.as_deref(),
                        context.sample_values.as_ref(),
                        context.value_fetcher.as_ref(),
                        self.options.use_llm,
                    )
                    .await,
                self.options.max_enums,
            )
        } else {
            Vec::new()
        };

        let constraints = if self.options.detect_constraints {
            capped(
                ConstraintAnalyzer::new(self.channel.clone())
                    .detect(
                        &context.database,
                        context.documentation.as_deref(),
                        &context.sql_queries,
                        &context.db_constraints,
                        self.options.use_llm,
                    )
                    .await,
                self.options.max_constraints,
            )
        } else {
            Vec::new()
        };

        let derived = if self.options.detect_derived {
            capped(
                DerivedAnalyzer::new(self.channel.clone())
                    .detect(
                        &context.database,
                        context.documentation.as_deref(),
                        &context.sql_queries,
                        self.options.use_llm,
                    )
                    .await,
                self.options.max_derived,
            )
        } else {
            Vec::new()
        };

        self.assemble(context, hierarchies, enumerations, constraints, derived)
    }

    /// Run the category analyses on parallel tasks. A panicked category
    /// degrades to empty output instead of failing the run.
    pub async fn analyze_concurrent(&self, context: &mut AnalysisContext) -> EnhancedModelSpec {
        self.prepare_relationships(context).await;

        let database = Arc::new(context.database.clone());
        let use_llm = self.options.use_llm;

        let hierarchy_task: JoinHandle<Vec<InheritanceOpportunity>> =
            if self.options.detect_hierarchies {
                let db = Arc::clone(&database);
                let docs = context.documentation.clone();
                let channel = self.channel.clone();
                tokio::spawn(async move {
                    HierarchyDetector::new(channel)
                        .detect(&db, docs.as_deref(), use_llm)
                        .await
                })
            } else {
                tokio::spawn(async { Vec::new() })
            };

        let enum_task: JoinHandle<Vec<EnumerationCandidate>> = if self.options.detect_enums {
            let db = Arc::clone(&database);
            let docs = context.documentation.clone();
            let samples = context.sample_values.clone();
            let fetcher = context.value_fetcher.clone();
            let channel = self.channel.clone();
            tokio::spawn(async move {
                EnumDetector::new(channel)
                    .detect(&db, docs.as_deref(), samples.as_ref(), fetcher.as_ref(), use_llm)
                    .await
            })
        } else {
            tokio::spawn(async { Vec::new() })
        };

        let constraint_task: JoinHandle<Vec<ConstraintSuggestion>> =
            if self.options.detect_constraints {
                let db = Arc::clone(&database);
                let docs = context.documentation.clone();
                let queries = context.sql_queries.clone();
                let db_constraints = context.db_constraints.clone();
                let channel = self.channel.clone();
                tokio::spawn(async move {
                    ConstraintAnalyzer::new(channel)
                        .detect(&db, docs.as_deref(), &queries, &db_constraints, use_llm)
                        .await
                })
            } else {
                tokio::spawn(async { Vec::new() })
            };

        let derived_task: JoinHandle<Vec<DerivedPropertySuggestion>> =
            if self.options.detect_derived {
                let db = Arc::clone(&database);
                let docs = context.documentation.clone();
                let queries = context.sql_queries.clone();
                let channel = self.channel.clone();
                tokio::spawn(async move {
                    DerivedAnalyzer::new(channel)
                        .detect(&db, docs.as_deref(), &queries, use_llm)
                        .await
                })
            } else {
                tokio::spawn(async { Vec::new() })
            };

        let hierarchies = capped(
            join_or_empty(hierarchy_task, "hierarchy").await,
            self.options.max_hierarchies,
        );
        let enumerations = capped(
            join_or_empty(enum_task, "enumeration").await,
            self.options.max_enums,
        );
        let constraints = capped(
            join_or_empty(constraint_task, "constraint").await,
            self.options.max_constraints,
        );
        let derived = capped(
            join_or_empty(derived_task, "derived property").await,
            self.options.max_derived,
        );

        self.assemble(context, hierarchies, enumerations, constraints, derived)
    }

    /// Settle `database.relationships`: pattern detection when nothing
    /// is known, then documents and (as gap filler) LLM discovery,
    /// merged by source priority.
    async fn prepare_relationships(&self, context: &mut AnalysisContext) {
        if context.database.relationships.is_empty() {
            let added = relationship_detector::detect_and_attach(&mut context.database);
            info!("Pattern detection found {} relationships", added);
        }

        let mut doc_relationships = Vec::new();
        if self.options.analyze_document_relationships && !context.doc_sources.is_empty() {
            let known_tables: Vec<String> = context
                .database
                .all_tables()
                .map(|t| t.name.clone())
                .collect();
            info!(
                "Analyzing {} document sources for relationships",
                context.doc_sources.len()
            );
            let analyzer =
                DocumentRelationshipAnalyzer::new(self.channel.clone().map(ErdAnalyzer::new));
            doc_relationships = analyzer
                .analyze_documents(&context.doc_sources, &known_tables)
                .await;
        }

        let mut llm_relationships = Vec::new();
        if self.options.use_llm && context.database.relationships.is_empty() {
            if let Some(channel) = &self.channel {
                llm_relationships = RelationshipDiscovery::new(Arc::clone(channel))
                    .discover(&context.database, DEFAULT_DISCOVERY_THRESHOLD)
                    .await;
            }
        }

        if !doc_relationships.is_empty() || !llm_relationships.is_empty() {
            let merger = RelationshipMerger::new(self.options.document_confidence_floor);
            let result = merger.apply_to_database(
                &mut context.database,
                &doc_relationships,
                &llm_relationships,
            );
            info!("{}", result.summary());
        }
    }

    fn assemble(
        &self,
        context: &AnalysisContext,
        hierarchies: Vec<InheritanceOpportunity>,
        enumerations: Vec<EnumerationCandidate>,
        constraints: Vec<ConstraintSuggestion>,
        derived: Vec<DerivedPropertySuggestion>,
    ) -> EnhancedModelSpec {
        let table_analyses = build_table_analyses(
            &context.database,
            &enumerations,
            &constraints,
            &derived,
            &hierarchies,
        );

        let spec = EnhancedModelSpec {
            database_name: context.database.name.clone(),
            schema_names: context
                .database
                .schemas
                .iter()
                .map(|s| s.name.clone())
                .collect(),
            confidence_threshold: self.options.confidence_threshold,
            documentation: context.documentation.clone(),
            sql_queries: context.sql_queries.clone(),
            inheritance_opportunities: hierarchies,
            enumeration_candidates: enumerations,
            constraint_suggestions: constraints,
            derived_property_suggestions: derived,
            table_analyses,
        };

        spec.filter_by_confidence(self.options.confidence_threshold)
    }
}

async fn join_or_empty<T>(handle: JoinHandle<Vec<T>>, category: &str) -> Vec<T> {
    match handle.await {
        Ok(items) => items,
        Err(e) => {
            warn!("{} analysis task failed: {}", category, e);
            Vec::new()
        }
    }
}

fn capped<T>(mut items: Vec<T>, max: usize) -> Vec<T> {
    items.truncate(max);
    items
}

fn build_table_analyses(
    database: &Database,
    enumerations: &[EnumerationCandidate],
    constraints: &[ConstraintSuggestion],
    derived: &[DerivedPropertySuggestion],
    hierarchies: &[InheritanceOpportunity],
) -> BTreeMap<String, TableAnalysis> {
    let mut roles: BTreeMap<String, HierarchyRole> = BTreeMap::new();
    for opportunity in hierarchies {
        roles.insert(opportunity.base_class_name.clone(), HierarchyRole::Base);
        for derived_class in &opportunity.derived_classes {
            roles.insert(derived_class.clone(), HierarchyRole::Derived);
        }
    }

    let mut analyses = BTreeMap::new();
    for schema in &database.schemas {
        for table in &schema.tables {
            let class_name = table.class_name();
            let table_upper = table.name.to_uppercase();

            analyses.insert(
                table_upper.clone(),
                TableAnalysis {
                    table_name: table.name.clone(),
                    schema_name: schema.name.clone(),
                    enum_candidates: enumerations
                        .iter()
                        .filter(|e| e.source_table.to_uppercase() == table_upper)
                        .cloned()
                        .collect(),
                    constraints: constraints
                        .iter()
                        .filter(|c| c.class_name == class_name)
                        .cloned()
                        .collect(),
                    derived_properties: derived
                        .iter()
                        .filter(|d| d.class_name == class_name)
                        .cloned()
                        .collect(),
                    is_reference_table: is_reference_table(&table.name),
                    hierarchy_role: roles.get(&class_name).copied(),
                },
            );
        }
    }

    analyses
}

fn is_reference_table(table_name: &str) -> bool {
    let upper = table_name.to_uppercase();
    REFERENCE_TABLE_SUFFIXES
        .iter()
        .any(|suffix| upper.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::AnalysisSource;
    use crate::schema_model::models::{Column, Schema, Table};

    fn column(name: &str, pk: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: "INTEGER".to_string(),
            is_nullable: !pk,
            is_primary_key: pk,
        }
    }

    fn sample_database() -> Database {
        Database {
            name: "sales".to_string(),
            schemas: vec![Schema {
                name: "public".to_string(),
                tables: vec![
                    Table {
                        name: "CUSTOMERS".to_string(),
                        schema: "public".to_string(),
                        columns: vec![column("ID", true), column("NAME", false)],
                        primary_key_columns: vec!["ID".to_string()],
                        relationships: vec![],
                    },
                    Table {
                        name: "ORDERS".to_string(),
                        schema: "public".to_string(),
                        columns: vec![
                            column("ORDER_ID", true),
                            column("CUSTOMER_ID", false),
                            column("STATUS", false),
                        ],
                        primary_key_columns: vec!["ORDER_ID".to_string()],
                        relationships: vec![],
                    },
                    Table {
                        name: "ORDER_STATUS".to_string(),
                        schema: "public".to_string(),
                        columns: vec![column("CODE", true), column("LABEL", false)],
                        primary_key_columns: vec!["CODE".to_string()],
                        relationships: vec![],
                    },
                ],
            }],
            relationships: vec![],
        }
    }

    fn offline_options() -> AnalysisOptions {
        AnalysisOptions {
            use_llm: false,
            analyze_document_relationships: false,
            ..AnalysisOptions::default()
        }
    }

    #[test]
    fn default_options_validate() {
        assert!(AnalysisOptions::default().validate().is_ok());
        let bad = AnalysisOptions {
            confidence_threshold: 1.5,
            ..AnalysisOptions::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn reference_tables_recognized_by_suffix() {
        assert!(is_reference_table("ORDER_STATUS"));
        assert!(is_reference_table("country_code"));
        assert!(!is_reference_table("ORDERS"));
    }

    #[tokio::test]
    async fn analyze_attaches_pattern_relationships_and_builds_tables() {
        let analyzer = SchemaAnalyzer::new(None, offline_options());
        let mut context = AnalysisContext::new(sample_database());
        let mut samples = BTreeMap::new();
        samples.insert(
            "ORDERS.STATUS".to_string(),
            vec!["OPEN".to_string(), "CLOSED".to_string(), "OPEN".to_string()],
        );
        context.sample_values = Some(samples);

        let spec = analyzer.analyze(&mut context).await;

        // ORDERS.CUSTOMER_ID -> CUSTOMERS found by pattern detection
        assert!(context
            .database
            .relationships
            .iter()
            .any(|r| r.source_table == "ORDERS" && r.target_table == "CUSTOMERS"));

        // two distinct values over a max of 20 clears the 0.7 threshold
        assert_eq!(spec.enumeration_candidates.len(), 1);
        assert_eq!(spec.enumeration_candidates[0].source_column, "STATUS");
        assert_eq!(spec.table_analyses.len(), 3);
        assert!(spec.table_analyses["ORDER_STATUS"].is_reference_table);
        assert!(!spec.table_analyses["ORDERS"].is_reference_table);
        assert_eq!(spec.database_name, "sales");
        assert_eq!(spec.schema_names, vec!["public".to_string()]);
        assert_eq!(spec.confidence_threshold, 0.7);
    }

    #[tokio::test]
    async fn concurrent_analysis_matches_sequential() {
        let options = AnalysisOptions {
            detect_constraints: true,
            detect_derived: true,
            confidence_threshold: 0.0,
            ..offline_options()
        };

        let mut sequential_ctx = AnalysisContext::new(sample_database());
        let mut concurrent_ctx = AnalysisContext::new(sample_database());

        let analyzer = SchemaAnalyzer::new(None, options);
        let sequential = analyzer.analyze(&mut sequential_ctx).await;
        let concurrent = analyzer.analyze_concurrent(&mut concurrent_ctx).await;

        assert_eq!(
            sequential.constraint_suggestions.len(),
            concurrent.constraint_suggestions.len()
        );
        assert_eq!(
            sequential.derived_property_suggestions.len(),
            concurrent.derived_property_suggestions.len()
        );
        assert_eq!(sequential.table_analyses.len(), concurrent.table_analyses.len());
    }

    #[tokio::test]
    async fn disabled_categories_stay_empty() {
        let analyzer = SchemaAnalyzer::new(
            None,
            AnalysisOptions {
                detect_enums: false,
                ..offline_options()
            },
        );
        let mut context = AnalysisContext::new(sample_database());
        let spec = analyzer.analyze(&mut context).await;
        assert!(spec.enumeration_candidates.is_empty());
        assert!(spec.inheritance_opportunities.is_empty());
        assert!(spec.constraint_suggestions.is_empty());
    }

    #[test]
    fn caps_limit_each_category() {
        let many: Vec<ConstraintSuggestion> = (0..10)
            .map(|i| ConstraintSuggestion {
                class_name: "Orders".to_string(),
                constraint_name: format!("c{}", i),
                expression: format!("$this.x > {}", i),
                description: String::new(),
                confidence: 0.9,
                source: AnalysisSource::SchemaPattern,
                source_sql: None,
            })
            .collect();
        assert_eq!(capped(many, 3).len(), 3);
    }
}
