//! Core types for Larder.
//!
//! This module provides type-safe wrappers for keys, identities and the
//! small user-editable sets kept per identity.

pub mod entry;
pub mod id;
pub mod identity;
pub mod key;
pub mod sets;
pub mod user;

pub use entry::CacheEntry;
pub use id::{GuestId, ItemId};
pub use identity::{Identity, IdentityKey, IdentitySignal};
pub use key::{GUEST_TOKEN, StoreKey};
pub use sets::{Basket, BasketItem, ScopedSet, Wishlist};
pub use user::{UserId, UserIdError};
