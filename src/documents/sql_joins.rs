//! JOIN relationship extraction from SQL text.
//!
//! A `JOIN ... ON a.x = b.y` clause is strong evidence of a foreign key
//! even when the catalog declares none. Extraction is regex based: the ON
//! condition is taken as the span between the JOIN clause and the next SQL
//! keyword, and each equality inside it becomes a candidate edge.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref JOIN_RE: Regex = Regex::new(
        r"(?i)\b(?:(INNER|LEFT(?:\s+OUTER)?|RIGHT(?:\s+OUTER)?|FULL(?:\s+OUTER)?|CROSS)\s+)?JOIN\s+([\w.]+)(?:\s+(?:AS\s+)?(\w+))?\s+ON\s+"
    )
    .unwrap();
    /// Where an ON condition ends: the next clause keyword, statement end,
    /// or a closing paren (subqueries).
    static ref TERMINATOR_RE: Regex = Regex::new(
        r"(?i)\b(?:INNER|LEFT|RIGHT|FULL|CROSS|JOIN|WHERE|GROUP|ORDER|HAVING|LIMIT|UNION)\b|;|\)"
    )
    .unwrap();
    static ref CONDITION_RE: Regex = Regex::new(r"([\w.]+)\s*=\s*([\w.]+)").unwrap();
    static ref FROM_ALIAS_RE: Regex =
        Regex::new(r"(?i)\bFROM\s+([\w.]+)(?:\s+(?:AS\s+)?(\w+))?").unwrap();
    static ref JOIN_ALIAS_RE: Regex =
        Regex::new(r"(?i)\bJOIN\s+([\w.]+)(?:\s+(?:AS\s+)?(\w+))?").unwrap();
    static ref SQL_BLOCK_RE: Regex = Regex::new(r"(?s)```(?:sql|SQL)?\s*\n(.*?)```").unwrap();
    static ref INLINE_SELECT_RE: Regex = Regex::new(r"(?is)(SELECT\s+.+?(?:;|$))").unwrap();
    static ref JOIN_WORD_RE: Regex = Regex::new(r"(?i)\bJOIN\b").unwrap();
}

const SQL_KEYWORDS: [&str; 15] = [
    "ON", "WHERE", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "JOIN", "GROUP", "ORDER", "HAVING",
    "LIMIT", "UNION", "SET", "AS",
];

/// One equality join between two table columns, as written in a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRelationship {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
    /// INNER, LEFT, RIGHT, FULL or CROSS.
    pub join_type: String,
}

impl JoinRelationship {
    /// Order-independent identity for deduplication.
    pub fn dedup_key(&self) -> (String, String, String, String) {
        let mut sides = [
            (self.left_table.to_uppercase(), self.left_column.to_uppercase()),
            (self.right_table.to_uppercase(), self.right_column.to_uppercase()),
        ];
        sides.sort();
        let [(t1, c1), (t2, c2)] = sides;
        (t1, c1, t2, c2)
    }
}

/// Extract JOIN relationships from a single SQL query.
pub fn extract_joins(sql: &str) -> Vec<JoinRelationship> {
    let mut relationships = Vec::new();
    let mut alias_map = build_alias_map(sql);

    for caps in JOIN_RE.captures_iter(sql) {
        let join_type = normalize_join_type(caps.get(1).map(|m| m.as_str()));
        let joined_table = strip_schema(&caps[2]);
        if let Some(alias) = caps.get(3).map(|m| m.as_str()) {
            if !is_keyword(alias) {
                alias_map.insert(alias.to_uppercase(), joined_table.clone());
            }
        }

        let condition = condition_span(sql, caps.get(0).map_or(0, |m| m.end()));
        for cond in CONDITION_RE.captures_iter(condition) {
            let (left_table, left_column) = resolve_column_ref(&cond[1], &alias_map);
            let (right_table, right_column) = resolve_column_ref(&cond[2], &alias_map);
            if let (Some(lt), Some(rt)) = (left_table, right_table) {
                relationships.push(JoinRelationship {
                    left_table: lt,
                    left_column,
                    right_table: rt,
                    right_column,
                    join_type: join_type.clone(),
                });
            }
        }
    }
    relationships
}

/// Extract deduplicated JOIN relationships from free document text:
/// fenced code blocks first, then inline SELECT statements that mention a
/// JOIN.
pub fn extract_from_text(content: &str) -> Vec<JoinRelationship> {
    let mut seen: HashSet<(String, String, String, String)> = HashSet::new();
    let mut relationships = Vec::new();

    for caps in SQL_BLOCK_RE.captures_iter(content) {
        for rel in extract_joins(&caps[1]) {
            if seen.insert(rel.dedup_key()) {
                relationships.push(rel);
            }
        }
    }

    for caps in INLINE_SELECT_RE.captures_iter(content) {
        let query = &caps[1];
        if !JOIN_WORD_RE.is_match(query) {
            continue;
        }
        for rel in extract_joins(query) {
            if seen.insert(rel.dedup_key()) {
                relationships.push(rel);
            }
        }
    }

    relationships
}

/// The ON condition runs from `start` to the next clause keyword or end of
/// text.
fn condition_span(sql: &str, start: usize) -> &str {
    let rest = &sql[start..];
    match TERMINATOR_RE.find(rest) {
        Some(m) => &rest[..m.start()],
        None => rest,
    }
}

fn normalize_join_type(raw: Option<&str>) -> String {
    let join_type = raw
        .unwrap_or("INNER")
        .to_uppercase()
        .replace("OUTER", "")
        .trim()
        .to_string();
    if join_type.is_empty() {
        "INNER".to_string()
    } else {
        join_type
    }
}

fn build_alias_map(sql: &str) -> HashMap<String, String> {
    let mut alias_map = HashMap::new();
    for pattern in [&*FROM_ALIAS_RE, &*JOIN_ALIAS_RE] {
        for caps in pattern.captures_iter(sql) {
            let table = strip_schema(&caps[1]);
            if let Some(alias) = caps.get(2).map(|m| m.as_str()) {
                if !is_keyword(alias) {
                    alias_map.insert(alias.to_uppercase(), table.clone());
                }
            }
            alias_map.insert(table.to_uppercase(), table);
        }
    }
    alias_map
}

fn resolve_column_ref(reference: &str, alias_map: &HashMap<String, String>) -> (Option<String>, String) {
    let parts: Vec<&str> = reference.split('.').collect();
    match parts.as_slice() {
        [qualifier, column] => {
            let table = alias_map
                .get(&qualifier.to_uppercase())
                .cloned()
                .unwrap_or_else(|| qualifier.to_string());
            (Some(table), column.to_string())
        }
        // Unqualified column: table unknown, edge unusable.
        [column] => (None, column.to_string()),
        [_schema, table, column] => (Some(table.to_string()), column.to_string()),
        _ => (None, reference.to_string()),
    }
}

fn strip_schema(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

fn is_keyword(word: &str) -> bool {
    let upper = word.to_uppercase();
    SQL_KEYWORDS.iter().any(|k| *k == upper)
}
