//! Splitting and classifying SQL statements found in files and markdown.
//!
//! This is intentionally shallow parsing: comments stripped, statements
//! split on semicolons, statement kind by leading keyword, table references
//! by clause regex. It feeds the constraint and derived-property analyzers
//! with query lists; it never validates SQL.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref LINE_COMMENT_RE: Regex = Regex::new(r"--[^\n]*").unwrap();
    static ref BLOCK_COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref SQL_FENCE_RE: Regex = Regex::new(r"(?s)```(?:sql|SQL)\s*\n(.*?)```").unwrap();
    static ref TABLE_REF_RES: Vec<Regex> = vec![
        Regex::new(r"(?i)\bFROM\s+([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)").unwrap(),
        Regex::new(r"(?i)\bJOIN\s+([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)").unwrap(),
        Regex::new(r"(?i)\bINSERT\s+INTO\s+([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)").unwrap(),
        Regex::new(r"(?i)\bUPDATE\s+([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)").unwrap(),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Other,
}

/// A single SQL statement with its kind and the tables it touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlStatement {
    pub text: String,
    pub kind: StatementKind,
    pub tables: Vec<String>,
}

impl SqlStatement {
    pub fn from_text(text: &str) -> Self {
        let text = text.trim().to_string();
        let kind = detect_kind(&text);
        let tables = extract_table_refs(&text);
        SqlStatement { text, kind, tables }
    }

    pub fn references_table(&self, table_name: &str) -> bool {
        let upper = table_name.to_uppercase();
        self.tables.iter().any(|t| t.to_uppercase() == upper)
    }
}

pub fn strip_sql_comments(content: &str) -> String {
    let without_lines = LINE_COMMENT_RE.replace_all(content, "");
    BLOCK_COMMENT_RE.replace_all(&without_lines, "").into_owned()
}

/// Split raw SQL text into statements. Empty and trivial fragments are
/// dropped.
pub fn split_statements(content: &str) -> Vec<SqlStatement> {
    strip_sql_comments(content)
        .split(';')
        .map(str::trim)
        .filter(|s| s.len() > 5)
        .map(SqlStatement::from_text)
        .collect()
}

/// Pull the contents of every ```sql fence out of markdown text and parse
/// each as SQL.
pub fn statements_from_markdown(content: &str) -> Vec<SqlStatement> {
    SQL_FENCE_RE
        .captures_iter(content)
        .flat_map(|caps| split_statements(&caps[1]))
        .collect()
}

fn detect_kind(statement: &str) -> StatementKind {
    let upper = statement.trim_start().to_uppercase();
    if upper.starts_with("SELECT") {
        StatementKind::Select
    } else if upper.starts_with("INSERT") {
        StatementKind::Insert
    } else if upper.starts_with("UPDATE") {
        StatementKind::Update
    } else if upper.starts_with("DELETE") {
        StatementKind::Delete
    } else if upper.starts_with("CREATE") {
        StatementKind::Create
    } else if upper.starts_with("ALTER") {
        StatementKind::Alter
    } else {
        StatementKind::Other
    }
}

/// Tables referenced via FROM / JOIN / INSERT INTO / UPDATE clauses, with
/// schema prefixes removed, in first-seen order.
pub fn extract_table_refs(statement: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for pattern in TABLE_REF_RES.iter() {
        for caps in pattern.captures_iter(statement) {
            let table = caps[1].rsplit('.').next().unwrap_or(&caps[1]).to_string();
            let upper = table.to_uppercase();
            if matches!(upper.as_str(), "SELECT" | "WHERE" | "AND" | "OR") {
                continue;
            }
            if !tables.iter().any(|t| t.to_uppercase() == upper) {
                tables.push(table);
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_classifies() {
        let sql = r#"
            -- daily load
            SELECT * FROM orders WHERE status = 'OPEN';
            INSERT INTO audit_log (msg) VALUES ('x');
            /* cleanup
               step */
            DELETE FROM sessions;
        "#;
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].kind, StatementKind::Select);
        assert_eq!(statements[1].kind, StatementKind::Insert);
        assert_eq!(statements[2].kind, StatementKind::Delete);
        assert!(statements[0].references_table("ORDERS"));
        assert_eq!(statements[1].tables, vec!["audit_log"]);
    }

    #[test]
    fn strips_schema_prefixes() {
        let tables =
            extract_table_refs("SELECT * FROM sales.public.orders o JOIN sales.customers c ON 1=1");
        assert_eq!(tables, vec!["orders", "customers"]);
    }

    #[test]
    fn markdown_fences() {
        let md = "Intro text.\n```sql\nSELECT * FROM trades;\nSELECT * FROM positions;\n```\nMore prose.\n```\nnot sql\n```";
        let statements = statements_from_markdown(md);
        assert_eq!(statements.len(), 2);
        assert!(statements[1].references_table("positions"));
    }

    #[test]
    fn trivial_fragments_dropped() {
        assert!(split_statements("  ;; ;x;  ").is_empty());
    }
}
