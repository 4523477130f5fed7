//! In-memory relational schema model.
//!
//! `Database -> Schema -> Table -> Column` is the input shape supplied by an
//! external introspection step. Columns are immutable once constructed;
//! `Database::relationships` is the single mutable set that detection and
//! merging replace.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::naming::{pluralize, to_camel_case, to_pascal_case};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

fn default_true() -> bool {
    true
}

impl Column {
    pub fn property_name(&self) -> String {
        to_camel_case(&self.name)
    }
}

/// Association cardinality from the FK side's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    ManyToOne,
    OneToMany,
    OneToOne,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::ManyToOne => "many_to_one",
            RelationshipType::OneToMany => "one_to_many",
            RelationshipType::OneToOne => "one_to_one",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "many_to_one" => Some(RelationshipType::ManyToOne),
            "one_to_many" => Some(RelationshipType::OneToMany),
            "one_to_one" => Some(RelationshipType::OneToOne),
            "many_to_many" => Some(RelationshipType::OneToMany),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed foreign-key style association between two tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub relationship_type: RelationshipType,
    /// camelCase association property on the source class.
    pub property_name: String,
}

impl Relationship {
    /// Case-insensitive identity of this association.
    pub fn signature(&self) -> RelationshipSignature {
        RelationshipSignature::new(
            &self.source_table,
            &self.source_column,
            &self.target_table,
            &self.target_column,
        )
    }

    /// Name of the reverse association on the target class, pluralized
    /// because the target side of a many-to-one sees a collection.
    pub fn reverse_property_name(&self) -> String {
        pluralize(&to_camel_case(&self.source_table))
    }
}

/// Uppercased `(source_table, source_column, target_table, target_column)`
/// tuple. Two relationships with equal signatures describe the same edge
/// regardless of provenance or cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipSignature {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl RelationshipSignature {
    pub fn new(
        source_table: &str,
        source_column: &str,
        target_table: &str,
        target_column: &str,
    ) -> Self {
        RelationshipSignature {
            source_table: source_table.to_uppercase(),
            source_column: source_column.to_uppercase(),
            target_table: target_table.to_uppercase(),
            target_column: target_column.to_uppercase(),
        }
    }
}

impl fmt::Display for RelationshipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_table, self.source_column, self.target_table, self.target_column
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub schema: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_key_columns: Vec<String>,
    /// Relationships whose source is this table, populated by detection.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Table {
    pub fn class_name(&self) -> String {
        to_pascal_case(&self.name)
    }

    pub fn property_name(&self) -> String {
        to_camel_case(&self.name)
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        let upper = name.to_uppercase();
        self.columns.iter().find(|c| c.name.to_uppercase() == upper)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub schemas: Vec<Schema>,
    /// Authoritative post-merge relationship set for the whole database.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Database {
    pub fn all_tables(&self) -> impl Iterator<Item = &Table> {
        self.schemas.iter().flat_map(|s| s.tables.iter())
    }

    /// Case-insensitive table lookup across all schemas.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        let upper = name.to_uppercase();
        self.all_tables().find(|t| t.name.to_uppercase() == upper)
    }

    /// Resolve a possibly differently-cased table name to the actual one.
    pub fn canonical_table_name(&self, name: &str) -> Option<String> {
        self.find_table(name).map(|t| t.name.clone())
    }

    pub fn table_count(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }
}
