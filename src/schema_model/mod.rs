pub mod models;
pub mod naming;
pub mod relationship_detector;

pub use models::{
    Column, Database, Relationship, RelationshipSignature, RelationshipType, Schema, Table,
};
pub use relationship_detector::{detect_and_attach, RelationshipDetector};
