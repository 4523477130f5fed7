//! End-to-end enrichment runs over a small in-memory schema, with a
//! scripted channel standing in for the LLM.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use schemalift::analysis::{
    AnalysisContext, AnalysisOptions, AnalysisSource, RelationshipMerger, RelationshipOrigin,
    SchemaAnalyzer,
};
use schemalift::documents::{DocumentRelationshipAnalyzer, DocumentationSource};
use schemalift::llm::{LlmError, SuggestionChannel};
use schemalift::schema_model::relationship_detector::RelationshipDetector;
use schemalift::schema_model::{Column, Database, Schema, Table};

/// Replays canned responses in order; empty string once exhausted.
struct ScriptedChannel {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedChannel {
    fn new(responses: Vec<&str>) -> Self {
        ScriptedChannel {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl SuggestionChannel for ScriptedChannel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn complete_with_image(
        &self,
        system: &str,
        user: &str,
        _image_data: &[u8],
        _media_type: &str,
    ) -> Result<String, LlmError> {
        self.complete(system, user).await
    }
}

fn column(name: &str, data_type: &str, pk: bool) -> Column {
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: !pk,
        is_primary_key: pk,
    }
}

fn sales_database() -> Database {
    Database {
        name: "sales".to_string(),
        schemas: vec![Schema {
            name: "public".to_string(),
            tables: vec![
                Table {
                    name: "CUSTOMERS".to_string(),
                    schema: "public".to_string(),
                    columns: vec![column("ID", "INTEGER", true), column("NAME", "VARCHAR", false)],
                    primary_key_columns: vec!["ID".to_string()],
                    relationships: vec![],
                },
                Table {
                    name: "PRODUCTS".to_string(),
                    schema: "public".to_string(),
                    columns: vec![
                        column("ID", "INTEGER", true),
                        column("UNIT_PRICE", "DECIMAL", false),
                    ],
                    primary_key_columns: vec!["ID".to_string()],
                    relationships: vec![],
                },
                Table {
                    name: "ORDERS".to_string(),
                    schema: "public".to_string(),
                    columns: vec![
                        column("ORDER_ID", "INTEGER", true),
                        column("CUSTOMER_ID", "INTEGER", false),
                        column("PRODUCT_ID", "INTEGER", false),
                        column("TOTAL_AMOUNT", "DECIMAL", false),
                        column("STATUS", "VARCHAR", false),
                    ],
                    primary_key_columns: vec!["ORDER_ID".to_string()],
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

#[tokio::test]
async fn pattern_detection_recovers_foreign_keys() {
    let analyzer = SchemaAnalyzer::new(None, offline_options());
    let mut context = AnalysisContext::new(sales_database());

    analyzer.analyze(&mut context).await;

    let rels = &context.database.relationships;
    assert_eq!(rels.len(), 2);
    assert!(rels
        .iter()
        .any(|r| r.source_table == "ORDERS"
            && r.source_column == "CUSTOMER_ID"
            && r.target_table == "CUSTOMERS"
            && r.target_column == "ID"
            && r.property_name == "customer"));
    assert!(rels
        .iter()
        .any(|r| r.source_table == "ORDERS" && r.target_table == "PRODUCTS"));
}

#[tokio::test]
async fn document_joins_take_priority_over_pattern_matches() {
    let database = sales_database();
    let pattern_rels = RelationshipDetector::new(&database).detect();
    assert_eq!(pattern_rels.len(), 2);

    let markdown = r#"# Reporting

The revenue report joins orders to their customers:

```sql
SELECT o.ORDER_ID, c.NAME
FROM ORDERS o
JOIN CUSTOMERS c ON o.CUSTOMER_ID = c.ID;
```
"#;
    let source = DocumentationSource::from_text("reporting.md", markdown);
    let known: Vec<String> = database.all_tables().map(|t| t.name.clone()).collect();
    let doc_rels = DocumentRelationshipAnalyzer::new(None)
        .analyze_documents(&[source], &known)
        .await;
    assert_eq!(doc_rels.len(), 1);

    let result = RelationshipMerger::new(0.5).merge(&doc_rels, &pattern_rels, &[]);

    assert_eq!(result.relationships.len(), 2);
    // the customer edge came from the document, the product edge from patterns
    assert_eq!(result.statistics.get(&RelationshipOrigin::SqlJoin), Some(&1));
    assert_eq!(result.statistics.get(&RelationshipOrigin::Pattern), Some(&1));
    assert_eq!(result.conflicts_resolved.len(), 1);
    assert_eq!(result.conflicts_resolved[0].winner, RelationshipOrigin::SqlJoin);
}

#[tokio::test]
async fn sampled_enum_confidence_follows_cardinality() {
    let analyzer = SchemaAnalyzer::new(None, offline_options());
    let mut context = AnalysisContext::new(sales_database());
    let mut samples = BTreeMap::new();
    samples.insert(
        "ORDERS.STATUS".to_string(),
        vec![
            "OPEN".to_string(),
            "CLOSED".to_string(),
            "CANCELLED".to_string(),
            "OPEN".to_string(),
        ],
    );
    context.sample_values = Some(samples);

    let spec = analyzer.analyze(&mut context).await;

    assert_eq!(spec.enumeration_candidates.len(), 1);
    let candidate = &spec.enumeration_candidates[0];
    assert_eq!(candidate.source_table, "ORDERS");
    assert_eq!(candidate.source_column, "STATUS");
    assert_eq!(candidate.values.len(), 3);
    // 3 distinct values of max 20: 0.7 + 0.2 * (1 - 3/20)
    assert!((candidate.confidence - 0.87).abs() < 1e-9);
    assert!(spec
        .get_enum_for_column("orders", "status")
        .is_some());
}

#[tokio::test]
async fn garbage_llm_output_degrades_to_pattern_results() {
    let channel: Arc<dyn SuggestionChannel> = Arc::new(ScriptedChannel::new(vec![
        "I cannot produce JSON for that.",
        "Sorry, no.",
        "```json\nnot json at all\n```",
    ]));
    let options = AnalysisOptions {
        detect_constraints: true,
        detect_derived: true,
        analyze_document_relationships: false,
        confidence_threshold: 0.5,
        ..AnalysisOptions::default()
    };
    let analyzer = SchemaAnalyzer::new(Some(channel), options);
    let mut context = AnalysisContext::new(sales_database());

    let spec = analyzer.analyze(&mut context).await;

    // pattern-derived suggestions survive the unusable LLM responses
    assert!(spec
        .constraint_suggestions
        .iter()
        .any(|c| c.constraint_name == "totalAmountPositive"
            && c.source == AnalysisSource::SchemaPattern));
    assert!(spec
        .derived_property_suggestions
        .iter()
        .any(|d| d.class_name == "Customers" && d.property_name == "ordersCount"));
}

#[tokio::test]
async fn llm_enum_suggestions_join_the_spec() {
    let response = r#"```json
[
  {
    "name": "OrderStatus",
    "source_table": "ORDERS",
    "source_column": "STATUS",
    "values": ["OPEN", "CLOSED"],
    "confidence": 0.9,
    "description": "Lifecycle state of an order"
  }
]
```"#;
    let channel: Arc<dyn SuggestionChannel> = Arc::new(ScriptedChannel::new(vec![response]));
    let options = AnalysisOptions {
        analyze_document_relationships: false,
        ..AnalysisOptions::default()
    };
    let analyzer = SchemaAnalyzer::new(Some(channel), options);
    let mut context = AnalysisContext::new(sales_database());

    let spec = analyzer.analyze(&mut context).await;

    assert_eq!(spec.enumeration_candidates.len(), 1);
    let candidate = &spec.enumeration_candidates[0];
    assert_eq!(candidate.name, "OrderStatus");
    assert_eq!(candidate.source, AnalysisSource::LlmInference);
    assert_eq!(candidate.confidence, 0.9);
    assert_eq!(
        spec.table_analyses["ORDERS"].enum_candidates.len(),
        1
    );
}

#[tokio::test]
async fn concurrent_run_produces_the_same_spec_shape() {
    let options = AnalysisOptions {
        detect_constraints: true,
        detect_derived: true,
        confidence_threshold: 0.0,
        ..offline_options()
    };
    let analyzer = SchemaAnalyzer::new(None, options);

    let mut sequential_ctx = AnalysisContext::new(sales_database());
    let sequential = analyzer.analyze(&mut sequential_ctx).await;

    let mut concurrent_ctx = AnalysisContext::new(sales_database());
    let concurrent = analyzer.analyze_concurrent(&mut concurrent_ctx).await;

    assert_eq!(
        sequential.constraint_suggestions.len(),
        concurrent.constraint_suggestions.len()
    );
    assert_eq!(
        sequential.derived_property_suggestions.len(),
        concurrent.derived_property_suggestions.len()
    );
    assert_eq!(
        sequential_ctx.database.relationships.len(),
        concurrent_ctx.database.relationships.len()
    );
}
