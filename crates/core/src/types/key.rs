//! Deterministic storage keys.
//!
//! A [`StoreKey`] is a logical resource name plus zero or more scoping
//! components. The rendered form joins them with `:` after escaping `%` and
//! `:` inside each part, so two different component lists can never render
//! to the same string.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::user::UserId;

/// Component used in place of a missing identity.
pub const GUEST_TOKEN: &str = "guest";

const SEPARATOR: char = ':';

/// Cache key for one logical resource.
///
/// # Example
///
/// ```
/// use larder_core::{StoreKey, UserId};
///
/// let anonymous = StoreKey::new("notifications").with_identity(None);
/// assert_eq!(anonymous.to_string(), "notifications:guest");
///
/// let user = UserId::parse("u1").unwrap();
/// let scoped = StoreKey::new("notifications").with_identity(Some(&user)).with(2);
/// assert_eq!(scoped.to_string(), "notifications:u1:2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    resource: String,
    components: Vec<String>,
}

impl StoreKey {
    /// Create a key for `resource` with no scoping components.
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            components: Vec::new(),
        }
    }

    /// Append a scoping component.
    #[must_use]
    pub fn with(mut self, component: impl fmt::Display) -> Self {
        self.components.push(component.to_string());
        self
    }

    /// Append the identity component.
    ///
    /// An absent identity becomes [`GUEST_TOKEN`], never `"undefined"`.
    /// `UserId` refuses the token itself, so the two cannot collide.
    #[must_use]
    pub fn with_identity(self, user: Option<&UserId>) -> Self {
        match user {
            Some(user) => self.with(user),
            None => self.with(GUEST_TOKEN),
        }
    }

    /// The logical resource name, used to look up per-resource policy.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Scoping components in the order they were added.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_escaped(f, &self.resource)?;
        for component in &self.components {
            write!(f, "{SEPARATOR}")?;
            write_escaped(f, component)?;
        }
        Ok(())
    }
}

impl From<&str> for StoreKey {
    fn from(resource: &str) -> Self {
        Self::new(resource)
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, part: &str) -> fmt::Result {
    for c in part.chars() {
        match c {
            '%' => f.write_str("%25")?,
            SEPARATOR => f.write_str("%3A")?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_identity_is_guest() {
        let key = StoreKey::new("stats").with_identity(None);
        assert_eq!(key.to_string(), "stats:guest");
        assert!(!key.to_string().contains("undefined"));
    }

    #[test]
    fn test_absent_identity_is_stable() {
        let a = StoreKey::new("stats").with_identity(None);
        let b = StoreKey::new("stats").with_identity(None);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_user_identity_differs_from_guest() {
        let user = UserId::parse("u1").unwrap();
        let guest = StoreKey::new("stats").with_identity(None);
        let authed = StoreKey::new("stats").with_identity(Some(&user));
        assert_ne!(guest.to_string(), authed.to_string());
    }

    #[test]
    fn test_separator_cannot_be_forged() {
        let a = StoreKey::new("listings").with("a:b");
        let b = StoreKey::new("listings").with("a").with("b");
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "listings:a%3Ab");
    }

    #[test]
    fn test_escape_character_is_escaped() {
        let a = StoreKey::new("listings").with("%3A");
        let b = StoreKey::new("listings").with(":");
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_resource_accessor() {
        let key = StoreKey::new("notifications").with(7);
        assert_eq!(key.resource(), "notifications");
        assert_eq!(key.components(), ["7".to_string()]);
    }
}
