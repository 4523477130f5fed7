//! Deterministic foreign-key inference from column naming conventions.
//!
//! No data is read and no SQL runs; everything here is derived from table and
//! column names. Rules are ordered, first match wins, and the whole pass is
//! deterministic for a given `Database`.

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use super::models::{Database, Relationship, RelationshipSignature, RelationshipType, Table};
use super::naming::{strip_any_suffix, to_camel_case};

lazy_static! {
    /// Ordered `(column pattern, target table template)` rules. `{base}` is
    /// the captured column stem. Earlier rules win.
    static ref FK_RULES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"^(.+)_ID$").unwrap(), "{base}_INDEX"),
        (Regex::new(r"^(.+)_ID$").unwrap(), "{base}"),
        (Regex::new(r"^(.+)_ID$").unwrap(), "{base}S"),
        (Regex::new(r"^(.+)_ID$").unwrap(), "{base}_ID"),
        (Regex::new(r"^(.+)_KEY$").unwrap(), "{base}"),
        (Regex::new(r"^(.+)_KEY$").unwrap(), "{base}S"),
        (Regex::new(r"^(.+)_CODE$").unwrap(), "{base}_INDEX"),
        (Regex::new(r"^(.+)_CODE$").unwrap(), "{base}"),
    ];
}

/// Suffixes that mark lookup/reference style tables.
const INDEX_TABLE_MARKERS: [&str; 5] = ["_INDEX", "_MASTER", "_DIM", "_LOOKUP", "_REF"];

const FK_COLUMN_SUFFIXES: [&str; 3] = ["_ID", "_KEY", "_CODE"];

/// Scans every column of every table and proposes `many_to_one`
/// relationships where naming conventions point at another table.
pub struct RelationshipDetector<'a> {
    database: &'a Database,
    /// Uppercase table name -> table, ordered for deterministic fallback scans.
    tables: BTreeMap<String, &'a Table>,
}

impl<'a> RelationshipDetector<'a> {
    pub fn new(database: &'a Database) -> Self {
        let tables = database
            .all_tables()
            .map(|t| (t.name.to_uppercase(), t))
            .collect();
        RelationshipDetector { database, tables }
    }

    /// Run detection over the whole database. Results are deduplicated by
    /// signature with first occurrence kept.
    pub fn detect(&self) -> Vec<Relationship> {
        let mut seen: HashSet<RelationshipSignature> = HashSet::new();
        let mut relationships = Vec::new();

        for table in self.database.all_tables() {
            let source_upper = table.name.to_uppercase();
            for column in &table.columns {
                if is_own_primary_key(&table.name, &column.name) {
                    continue;
                }
                let Some((target, target_column)) = self.find_target(&column.name) else {
                    continue;
                };
                if target.name.to_uppercase() == source_upper {
                    continue;
                }

                let rel = Relationship {
                    source_table: table.name.clone(),
                    source_column: column.name.clone(),
                    target_table: target.name.clone(),
                    target_column,
                    relationship_type: RelationshipType::ManyToOne,
                    property_name: association_property_name(target, &column.name),
                };
                if seen.insert(rel.signature()) {
                    debug!("pattern FK: {}", rel.signature());
                    relationships.push(rel);
                }
            }
        }
        relationships
    }

    /// Resolve the target table and column for a candidate FK column, or
    /// `None` when no rule and no fallback applies.
    fn find_target(&self, column_name: &str) -> Option<(&'a Table, String)> {
        let column_upper = column_name.to_uppercase();

        for (pattern, template) in FK_RULES.iter() {
            let Some(caps) = pattern.captures(&column_upper) else {
                continue;
            };
            let candidate = template.replace("{base}", &caps[1]);
            if let Some(target) = self.tables.get(&candidate) {
                if let Some(col) = find_matching_column(target, &column_upper) {
                    return Some((target, col));
                }
            }
        }

        // Fallback: a lookup-style table carrying a column of the same name.
        for (upper_name, target) in &self.tables {
            if !INDEX_TABLE_MARKERS.iter().any(|m| upper_name.contains(m)) {
                continue;
            }
            if let Some(col) = target.find_column(&column_upper) {
                return Some((target, col.name.clone()));
            }
        }
        None
    }
}

/// Detect relationships, then install them on the database and on each
/// source table. Returns the number of relationships found.
pub fn detect_and_attach(database: &mut Database) -> usize {
    let relationships = RelationshipDetector::new(database).detect();
    let count = relationships.len();

    for schema in &mut database.schemas {
        for table in &mut schema.tables {
            let upper = table.name.to_uppercase();
            table.relationships = relationships
                .iter()
                .filter(|r| r.source_table.to_uppercase() == upper)
                .cloned()
                .collect();
        }
    }
    database.relationships = relationships;
    count
}

/// A column like `PRODUCT_ID` on `PRODUCT_INDEX` is that table's own key,
/// not a reference out: compare suffix-stripped table and column stems.
fn is_own_primary_key(table_name: &str, column_name: &str) -> bool {
    let table_stem = strip_any_suffix(&table_name.to_uppercase(), &["_INDEX", "_MASTER"]).to_string();
    let column_stem = strip_any_suffix(&column_name.to_uppercase(), &FK_COLUMN_SUFFIXES).to_string();
    table_stem == column_stem
}

/// Find the referenced column inside the target table. Tries the source
/// column name, common variations, then any key-looking column.
fn find_matching_column(target: &Table, column_upper: &str) -> Option<String> {
    let mut variations: Vec<String> = vec![column_upper.to_string()];
    variations.push(column_upper.replace("_ID", ""));
    variations.push("ID".to_string());
    if let Some(first_segment) = column_upper.split('_').next() {
        variations.push(format!("{first_segment}_ID"));
    }

    for variation in &variations {
        if variation.is_empty() {
            continue;
        }
        if let Some(col) = target.find_column(variation) {
            return Some(col.name.clone());
        }
    }

    target
        .columns
        .iter()
        .find(|c| {
            let upper = c.name.to_uppercase();
            upper.ends_with("_ID") || upper == "ID"
        })
        .map(|c| c.name.clone())
}

/// Association property on the source class: named after the lookup table
/// for index-style targets, after the FK column otherwise.
fn association_property_name(target: &Table, source_column: &str) -> String {
    let target_upper = target.name.to_uppercase();
    if INDEX_TABLE_MARKERS.iter().any(|m| target_upper.contains(m)) {
        to_camel_case(strip_any_suffix(&target.name, &INDEX_TABLE_MARKERS))
    } else {
        to_camel_case(strip_any_suffix(source_column, &FK_COLUMN_SUFFIXES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_model::models::{Column, Schema};

    fn make_column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: "VARCHAR".to_string(),
            is_nullable: true,
            is_primary_key: false,
        }
    }

    fn make_table(name: &str, columns: &[&str]) -> Table {
        Table {
            name: name.to_string(),
            schema: "PUBLIC".to_string(),
            columns: columns.iter().map(|c| make_column(c)).collect(),
            primary_key_columns: vec![],
            relationships: vec![],
        }
    }

    fn make_db(tables: Vec<Table>) -> Database {
        Database {
            name: "demo".to_string(),
            schemas: vec![Schema {
                name: "PUBLIC".to_string(),
                tables,
            }],
            relationships: vec![],
        }
    }

    #[test]
    fn detects_plural_target_with_id_fallback() {
        let db = make_db(vec![
            make_table("ORDERS", &["id", "customer_id", "order_date"]),
            make_table("CUSTOMERS", &["id", "name"]),
        ]);
        let rels = RelationshipDetector::new(&db).detect();
        assert_eq!(rels.len(), 1);
        let rel = &rels[0];
        assert_eq!(rel.source_table, "ORDERS");
        assert_eq!(rel.source_column, "customer_id");
        assert_eq!(rel.target_table, "CUSTOMERS");
        assert_eq!(rel.target_column, "id");
        assert_eq!(rel.relationship_type, RelationshipType::ManyToOne);
        assert_eq!(rel.property_name, "customer");
    }

    #[test]
    fn index_table_wins_over_bare_name() {
        let db = make_db(vec![
            make_table("TRADES", &["TRADE_ID", "PRODUCT_ID"]),
            make_table("PRODUCT", &["PRODUCT_ID"]),
            make_table("PRODUCT_INDEX", &["PRODUCT_ID", "PRODUCT_NAME"]),
        ]);
        let rels = RelationshipDetector::new(&db).detect();
        let rel = rels
            .iter()
            .find(|r| r.source_table == "TRADES" && r.source_column == "PRODUCT_ID")
            .unwrap();
        assert_eq!(rel.target_table, "PRODUCT_INDEX");
        assert_eq!(rel.property_name, "product");
    }

    #[test]
    fn own_primary_key_is_not_a_relationship() {
        let db = make_db(vec![
            make_table("PRODUCT_INDEX", &["PRODUCT_ID", "NAME"]),
            make_table("PRODUCT", &["PRODUCT_ID"]),
        ]);
        let rels = RelationshipDetector::new(&db).detect();
        // PRODUCT_INDEX.PRODUCT_ID is its own key; PRODUCT.PRODUCT_ID is too.
        assert!(rels.is_empty());
    }

    #[test]
    fn self_references_are_discarded() {
        let db = make_db(vec![make_table(
            "EMPLOYEE_INDEX",
            &["EMPLOYEE_ID", "MANAGER_ID", "EMPLOYEE_REF_ID"],
        )]);
        let rels = RelationshipDetector::new(&db).detect();
        assert!(rels.is_empty());
    }

    #[test]
    fn key_and_code_suffixes_resolve() {
        let db = make_db(vec![
            make_table("POSITIONS", &["ACCOUNT_KEY", "STATUS_CODE"]),
            make_table("ACCOUNT", &["ACCOUNT_ID"]),
            make_table("STATUS_INDEX", &["STATUS_CODE", "LABEL"]),
        ]);
        let rels = RelationshipDetector::new(&db).detect();
        assert_eq!(rels.len(), 2);

        let account = rels.iter().find(|r| r.source_column == "ACCOUNT_KEY").unwrap();
        assert_eq!(account.target_table, "ACCOUNT");
        assert_eq!(account.target_column, "ACCOUNT_ID");
        assert_eq!(account.property_name, "account");

        let status = rels.iter().find(|r| r.source_column == "STATUS_CODE").unwrap();
        assert_eq!(status.target_table, "STATUS_INDEX");
        assert_eq!(status.property_name, "status");
    }

    #[test]
    fn duplicate_edges_are_collapsed() {
        let mut db = make_db(vec![
            make_table("ORDERS", &["CUSTOMER_ID"]),
            make_table("CUSTOMERS", &["ID"]),
        ]);
        let count = detect_and_attach(&mut db);
        assert_eq!(count, 1);
        assert_eq!(db.relationships.len(), 1);
        let orders = db.find_table("ORDERS").unwrap();
        assert_eq!(orders.relationships.len(), 1);
        let customers = db.find_table("CUSTOMERS").unwrap();
        assert!(customers.relationships.is_empty());
    }
}
