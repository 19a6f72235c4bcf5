//! Who the current caller is, for storage-scoping purposes.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::GuestId;
use super::key::GUEST_TOKEN;
use super::user::UserId;

/// The identity a scoped set belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Identity {
    /// Unauthenticated device, identified by its persisted guest ID.
    Guest(GuestId),
    /// Authenticated user.
    User(UserId),
}

impl Identity {
    /// Resolve the identity for a session: the user when present, else the guest.
    #[must_use]
    pub fn resolve(user: Option<UserId>, guest: GuestId) -> Self {
        user.map_or(Self::Guest(guest), Self::User)
    }

    /// Returns `true` for the guest pseudo-identity.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest(_))
    }

    /// The storage key component for this identity.
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        match self {
            Self::Guest(id) => IdentityKey(format!("{GUEST_TOKEN}_{id}")),
            Self::User(id) => IdentityKey(id.as_str().to_owned()),
        }
    }
}

impl From<UserId> for Identity {
    fn from(id: UserId) -> Self {
        Self::User(id)
    }
}

impl From<GuestId> for Identity {
    fn from(id: GuestId) -> Self {
        Self::Guest(id)
    }
}

/// Rendered identity component of a scoped-set key.
///
/// Either a user ID or `guest_<guest id>`. Built only from an [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Returns the key component as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Identity> for IdentityKey {
    fn from(identity: &Identity) -> Self {
        identity.key()
    }
}

/// Read-only authentication signal supplied by the session layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySignal {
    /// The session's user ID, if any.
    pub user_id: Option<String>,
    /// Whether the session currently holds a valid credential.
    pub has_valid_credential: bool,
}

impl IdentitySignal {
    /// A signal with no user.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user_id: None,
            has_valid_credential: false,
        }
    }

    /// A signal for an authenticated user with a valid credential.
    #[must_use]
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            has_valid_credential: true,
        }
    }

    /// The authenticated user, if the signal carries a valid credential and a
    /// well-formed user ID. Anything else counts as not authenticated.
    #[must_use]
    pub fn authenticated_user(&self) -> Option<UserId> {
        if !self.has_valid_credential {
            return None;
        }
        self.user_id
            .as_deref()
            .and_then(|raw| UserId::parse(raw).ok())
    }
}
