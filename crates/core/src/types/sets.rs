//! Small user-editable sets kept per identity.
//!
//! Both sets hold at most one entry per [`ItemId`]. They are merged, never
//! replaced, when a guest signs in.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::id::ItemId;

/// A set that can be stored per identity and folded together on sign-in.
pub trait ScopedSet: Default + Serialize + DeserializeOwned + Send + 'static {
    /// Fold a guest-scoped set into `self`, the authenticated copy.
    ///
    /// Entries already present in `self` win; guest-only entries are kept.
    fn absorb(&mut self, guest: Self);

    /// Number of distinct items.
    fn len(&self) -> usize;

    /// Whether the set has no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Wishlist
// =============================================================================

/// Unordered set of saved item IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wishlist(BTreeSet<ItemId>);

impl Wishlist {
    /// Create an empty wishlist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Returns `false` if it was already saved.
    pub fn add(&mut self, id: impl Into<ItemId>) -> bool {
        self.0.insert(id.into())
    }

    /// Remove an item. Returns `false` if it was not saved.
    pub fn remove(&mut self, id: &ItemId) -> bool {
        self.0.remove(id)
    }

    /// Add the item if absent, remove it if present.
    ///
    /// Returns `true` when the item is saved afterwards.
    pub fn toggle(&mut self, id: impl Into<ItemId>) -> bool {
        let id = id.into();
        if self.0.remove(&id) {
            false
        } else {
            self.0.insert(id);
            true
        }
    }

    /// Whether the item is saved.
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.0.contains(id)
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Iterate over saved IDs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.0.iter()
    }
}

impl ScopedSet for Wishlist {
    fn absorb(&mut self, guest: Self) {
        self.0.extend(guest.0);
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl<I: Into<ItemId>> FromIterator<I> for Wishlist {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Basket
// =============================================================================

const fn default_quantity() -> u32 {
    1
}

/// One line in a basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketItem {
    /// Item reference.
    pub id: ItemId,
    /// When the item first entered the basket.
    pub added_at: DateTime<Utc>,
    /// Number of units.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Display attributes carried along (title, price, image, ...).
    #[serde(flatten, default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl BasketItem {
    /// Create a single-unit item added at `added_at`.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, added_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            added_at,
            quantity: 1,
            attributes: serde_json::Map::new(),
        }
    }

    /// Set the number of units.
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Attach a display attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Basket lines, unique by item ID, in the order they were first added.
///
/// Deserializing a list with repeated IDs keeps the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<BasketItem>", into = "Vec<BasketItem>")]
pub struct Basket {
    items: Vec<BasketItem>,
}

impl Basket {
    /// Create an empty basket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    /// Add an item.
    ///
    /// If the ID is already present its quantity grows by the new item's
    /// quantity; the original `added_at` and attributes are kept. Returns
    /// `true` when a new line was created.
    pub fn add(&mut self, item: BasketItem) -> bool {
        if let Some(existing) = self.items.iter_mut().find(|line| line.id == item.id) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
            false
        } else {
            self.items.push(item);
            true
        }
    }

    /// Set the quantity of a line. A quantity of zero removes it.
    ///
    /// Returns `false` if the item is not in the basket.
    pub fn set_quantity(&mut self, id: &ItemId, quantity: u32) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        if quantity == 0 {
            self.items.remove(index);
        } else if let Some(line) = self.items.get_mut(index) {
            line.quantity = quantity;
        }
        true
    }

    /// Remove a line, returning it.
    pub fn remove(&mut self, id: &ItemId) -> Option<BasketItem> {
        self.position(id).map(|index| self.items.remove(index))
    }

    /// Add a single unit of `id` if absent, remove the line if present.
    ///
    /// Returns `true` when the item is in the basket afterwards.
    pub fn toggle(&mut self, id: impl Into<ItemId>, now: DateTime<Utc>) -> bool {
        let id = id.into();
        if self.remove(&id).is_some() {
            false
        } else {
            self.items.push(BasketItem::new(id, now));
            true
        }
    }

    /// Whether the item is in the basket.
    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.position(id).is_some()
    }

    /// Look up a line.
    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&BasketItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate over lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BasketItem> {
        self.items.iter()
    }
}

impl ScopedSet for Basket {
    fn absorb(&mut self, guest: Self) {
        for item in guest.items {
            if !self.contains(&item.id) {
                self.items.push(item);
            }
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl From<Vec<BasketItem>> for Basket {
    fn from(lines: Vec<BasketItem>) -> Self {
        let mut basket = Self::default();
        for line in lines {
            if !basket.contains(&line.id) {
                basket.items.push(line);
            }
        }
        basket
    }
}

impl From<Basket> for Vec<BasketItem> {
    fn from(basket: Basket) -> Self {
        basket.items
    }
}
