//! Write suppression: is a freshly fetched payload different enough from the
//! stored one to be worth writing?
//!
//! Lists compare by length and by the set of item identifiers, so a reorder
//! is not a change. Everything else compares structurally.

use std::collections::HashSet;

use serde_json::Value;

/// How a list item is told apart from its siblings.
#[derive(Debug, PartialEq, Eq, Hash)]
enum Identifier {
    /// The item's `id` field. String and numeric IDs with the same text match.
    Id(String),
    /// Any other `id` value (`true`, `null`, objects), by its JSON text.
    Tagged(String),
    /// Items without an `id` are identified by their whole JSON text.
    Whole(String),
}

fn identifier(item: &Value) -> Identifier {
    match item.get("id") {
        Some(Value::String(id)) => Identifier::Id(id.clone()),
        Some(Value::Number(id)) => Identifier::Id(id.to_string()),
        Some(other) => Identifier::Tagged(other.to_string()),
        None => Identifier::Whole(item.to_string()),
    }
}

fn identifiers(items: &[Value]) -> HashSet<Identifier> {
    items.iter().map(identifier).collect()
}

/// Whether `fresh` should replace `stored`.
#[must_use]
pub fn has_changed(stored: &Value, fresh: &Value) -> bool {
    match (stored, fresh) {
        (Value::Array(stored), Value::Array(fresh)) => {
            stored.len() != fresh.len() || identifiers(stored) != identifiers(fresh)
        }
        _ => stored != fresh,
    }
}
