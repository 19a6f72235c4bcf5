//! Per-resource cache policy: TTL and the storage-budget shaping applied
//! before a payload is written.
//!
//! Truncation is lossy. A cache hit on a list resource may return fewer
//! items than the server sent.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

/// Default time-to-live for cached resources (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default cap on cached list length.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Resource name with its own, tighter policy.
pub const NOTIFICATIONS_RESOURCE: &str = "notifications";

/// Cap on cached notifications.
pub const NOTIFICATIONS_MAX_ENTRIES: usize = 10;

/// Free-text fields dropped from cached notifications.
pub const NOTIFICATION_TEXT_FIELDS: &[&str] = &["body", "message", "description"];

/// How one resource is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePolicy {
    /// How long an entry stays valid.
    pub ttl: Duration,
    /// Maximum list length written; `None` keeps every item.
    pub max_entries: Option<usize>,
    /// Object fields removed from every list item before writing.
    pub strip_fields: Vec<String>,
}

impl ResourcePolicy {
    /// A policy with `ttl` and a list cap, stripping nothing.
    #[must_use]
    pub const fn new(ttl: Duration, max_entries: Option<usize>) -> Self {
        Self {
            ttl,
            max_entries,
            strip_fields: Vec::new(),
        }
    }

    /// The notifications policy: 10 items without their free-text fields.
    #[must_use]
    pub fn notifications(ttl: Duration) -> Self {
        Self::new(ttl, Some(NOTIFICATIONS_MAX_ENTRIES)).with_stripped_fields(
            NOTIFICATION_TEXT_FIELDS.iter().map(|field| (*field).to_string()),
        )
    }

    /// Replace the stripped fields.
    #[must_use]
    pub fn with_stripped_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.strip_fields = fields.into_iter().collect();
        self
    }

    /// Shape a payload for storage: strip fields from list items, then
    /// truncate the list. Non-list payloads pass through untouched.
    #[must_use]
    pub fn prepare(&self, payload: Value) -> Value {
        let Value::Array(mut items) = payload else {
            return payload;
        };

        if !self.strip_fields.is_empty() {
            for item in &mut items {
                if let Value::Object(fields) = item {
                    for field in &self.strip_fields {
                        fields.remove(field);
                    }
                }
            }
        }

        if let Some(max) = self.max_entries {
            items.truncate(max);
        }

        Value::Array(items)
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, Some(DEFAULT_MAX_ENTRIES))
    }
}

/// Policies for every resource: a default plus named overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicies {
    default: ResourcePolicy,
    overrides: HashMap<String, ResourcePolicy>,
}

impl CachePolicies {
    /// Policies using `default` for every resource except notifications,
    /// which keep their tighter policy with the same TTL.
    #[must_use]
    pub fn new(default: ResourcePolicy) -> Self {
        let mut overrides = HashMap::new();
        overrides.insert(
            NOTIFICATIONS_RESOURCE.to_string(),
            ResourcePolicy::notifications(default.ttl),
        );
        Self { default, overrides }
    }

    /// Add or replace the policy for one resource.
    #[must_use]
    pub fn with_policy(mut self, resource: impl Into<String>, policy: ResourcePolicy) -> Self {
        self.overrides.insert(resource.into(), policy);
        self
    }

    /// The policy applying to `resource`.
    #[must_use]
    pub fn for_resource(&self, resource: &str) -> &ResourcePolicy {
        self.overrides.get(resource).unwrap_or(&self.default)
    }

    /// The fallback policy.
    #[must_use]
    pub const fn default_policy(&self) -> &ResourcePolicy {
        &self.default
    }
}

impl Default for CachePolicies {
    fn default() -> Self {
        Self::new(ResourcePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_truncates_lists() {
        let policy = ResourcePolicy::new(DEFAULT_TTL, Some(2));
        assert_eq!(policy.prepare(json!([1, 2, 3])), json!([1, 2]));
    }

    #[test]
    fn test_non_lists_pass_through() {
        let policy = ResourcePolicy::new(DEFAULT_TTL, Some(0));
        assert_eq!(policy.prepare(json!({"a": [1, 2]})), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_unbounded_policy_keeps_everything() {
        let policy = ResourcePolicy::new(DEFAULT_TTL, None);
        let long: Vec<u32> = (0..500).collect();
        assert_eq!(policy.prepare(json!(long)), json!(long));
    }

    #[test]
    fn test_notifications_strip_then_truncate() {
        let items: Vec<Value> = (0..15)
            .map(|i| json!({"id": i, "title": "t", "body": "long text", "message": "m"}))
            .collect();

        let prepared = ResourcePolicy::notifications(DEFAULT_TTL).prepare(Value::Array(items));
        let prepared = prepared.as_array().unwrap();

        assert_eq!(prepared.len(), NOTIFICATIONS_MAX_ENTRIES);
        assert_eq!(prepared[0], json!({"id": 0, "title": "t"}));
    }

    #[test]
    fn test_policy_lookup() {
        let policies = CachePolicies::default()
            .with_policy("stats", ResourcePolicy::new(Duration::from_secs(60), None));

        assert_eq!(policies.for_resource("stats").ttl, Duration::from_secs(60));
        assert_eq!(
            policies.for_resource("notifications").max_entries,
            Some(NOTIFICATIONS_MAX_ENTRIES)
        );
        assert_eq!(
            policies.for_resource("listings").max_entries,
            Some(DEFAULT_MAX_ENTRIES)
        );
    }
}
