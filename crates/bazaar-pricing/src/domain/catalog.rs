//! Price catalog
//!
//! The static set of priced items. Loaded once at startup and never mutated.

use bazaar_common::{CatalogError, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A priced shop item with its allowed multiplier range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    base_price: f64,
    min_mult: f64,
    max_mult: f64,
}

impl Item {
    /// Create an item, checking `base_price > 0` and `0 < min_mult < 1 <= max_mult`
    pub fn new(
        id: impl Into<ItemId>,
        base_price: f64,
        min_mult: f64,
        max_mult: f64,
    ) -> Result<Self, CatalogError> {
        let id = id.into();

        if !base_price.is_finite() || base_price <= 0.0 {
            return Err(CatalogError::InvalidBasePrice {
                item: id.to_string(),
                base_price,
            });
        }

        let bounds_ok = min_mult.is_finite()
            && max_mult.is_finite()
            && min_mult > 0.0
            && min_mult < 1.0
            && max_mult >= 1.0;
        if !bounds_ok {
            return Err(CatalogError::InvalidBounds {
                item: id.to_string(),
                min_mult,
                max_mult,
            });
        }

        Ok(Self {
            id,
            base_price,
            min_mult,
            max_mult,
        })
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    pub fn min_mult(&self) -> f64 {
        self.min_mult
    }

    pub fn max_mult(&self) -> f64 {
        self.max_mult
    }

    /// Lowest price the item may ever be sold at
    pub fn floor_price(&self) -> f64 {
        self.base_price * self.min_mult
    }

    /// Highest price the item may ever be sold at
    pub fn ceiling_price(&self) -> f64 {
        self.base_price * self.max_mult
    }

    /// Clamp a candidate price into `[base*min_mult, base*max_mult]`
    pub fn clamp_price(&self, price: f64) -> f64 {
        price.clamp(self.floor_price(), self.ceiling_price())
    }
}

/// Ordered, indexed set of items.
///
/// Item positions are stable for the lifetime of the catalog; per-item state
/// elsewhere is stored in vectors aligned with these positions.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut index = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            if index.insert(item.id.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateItem(item.id.to_string()));
            }
        }

        Ok(Self { items, index })
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn ids(&self) -> BTreeSet<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
