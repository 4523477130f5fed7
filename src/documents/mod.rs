pub mod erd;
pub mod relationships;
pub mod source;
pub mod sql_joins;
pub mod sql_text;

pub use erd::{ErdAnalyzer, ErdRelationship};
pub use relationships::{DocumentOrigin, DocumentRelationship, DocumentRelationshipAnalyzer};
pub use source::{DocumentationSource, ExtractedImage};
pub use sql_joins::JoinRelationship;
pub use sql_text::{SqlStatement, StatementKind};
