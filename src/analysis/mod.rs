pub mod constraint_analyzer;
pub mod derived_analyzer;
pub mod enum_detector;
pub mod hierarchy_detector;
pub mod models;
pub mod relationship_discovery;
pub mod relationship_merger;
pub mod schema_analyzer;

pub use constraint_analyzer::{ConstraintAnalyzer, ConstraintKind, DatabaseConstraint};
pub use derived_analyzer::DerivedAnalyzer;
pub use enum_detector::{EnumDetector, ValueFetcher};
pub use hierarchy_detector::HierarchyDetector;
pub use models::{
    AnalysisSource, ConstraintSuggestion, DerivedPropertySuggestion, EnhancedModelSpec,
    EnumerationCandidate, HierarchyRole, InheritanceOpportunity, TableAnalysis,
};
pub use relationship_discovery::RelationshipDiscovery;
pub use relationship_merger::{MergeConflict, MergeResult, RelationshipMerger, RelationshipOrigin};
pub use schema_analyzer::{AnalysisContext, AnalysisOptions, SchemaAnalyzer};
