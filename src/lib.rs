//! SchemaLift - Schema enrichment for model generation
//!
//! Lifts a relational database schema into an enhanced model spec through:
//! - Foreign-key relationship detection from column naming patterns
//! - Relationship extraction from documents (SQL JOINs, ERD images)
//! - Priority-based merging of relationship sources
//! - Confidence-scored suggestions: hierarchies, enumerations,
//!   constraints, derived properties

pub mod analysis;
pub mod config;
pub mod documents;
pub mod llm;
pub mod schema_model;
