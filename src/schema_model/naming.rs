//! Name conversions between SQL identifiers and model identifiers.
//!
//! Tables become PascalCase class names, columns become camelCase property
//! names. Conversions are lossy by design: `ORDER_ITEMS` and `order_items`
//! both map to `OrderItems`.

/// Convert a SQL identifier (snake or SCREAMING_SNAKE) to PascalCase.
pub fn to_pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// Convert a SQL identifier to camelCase.
pub fn to_camel_case(name: &str) -> String {
    let pascal = to_pascal_case(name);
    lowercase_first(&pascal)
}

/// Naive pluralization for reverse association names (`order` -> `orders`).
pub fn pluralize(name: &str) -> String {
    if name.ends_with('s') || name.ends_with('S') {
        name.to_string()
    } else {
        format!("{name}s")
    }
}

pub fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Strip the first matching suffix from `name`, case-insensitively.
/// Returns the original string when no suffix matches.
pub fn strip_any_suffix<'a>(name: &'a str, suffixes: &[&str]) -> &'a str {
    let upper = name.to_uppercase();
    for suffix in suffixes {
        if upper.ends_with(suffix) && name.len() > suffix.len() {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}
