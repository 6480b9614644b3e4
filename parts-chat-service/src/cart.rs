use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parts_flow::SessionKey;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

/// What a cart message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartCommand {
    Add { quantity: u32 },
    SetQuantity(u32),
    Remove,
    View,
    Checkout,
}

static CHECKOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:checkout|check out|buy now|purchase|place (?:my |the )?order)\b")
        .expect("valid checkout pattern")
});

static REMOVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:remove|delete|take out|drop)\b").expect("valid remove pattern")
});

static SET_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:make (?:it|that)|change (?:it |that )?to|update (?:it |that )?to|(?:change|update|set) (?:the )?quantity(?: to)?)\s*(\d{1,3})\b",
    )
    .expect("valid quantity pattern")
});

static ADD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\badd\b").expect("valid add pattern"));

static ADD_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\badd\s+(\d{1,3})\b|\b(\d{1,3})\s*(?:x\b|of (?:them|these|those|it))")
        .expect("valid add quantity pattern")
});

impl CartCommand {
    /// Read a cart sub-command from a message already classified as a cart action
    pub fn parse(message: &str) -> Self {
        let lower = message.to_lowercase();

        if CHECKOUT.is_match(&lower) {
            return CartCommand::Checkout;
        }
        if REMOVE.is_match(&lower) {
            return CartCommand::Remove;
        }
        if let Some(quantity) = SET_QUANTITY
            .captures(&lower)
            .and_then(|caps| caps[1].parse().ok())
        {
            return CartCommand::SetQuantity(quantity);
        }
        if ADD.is_match(&lower) {
            let quantity = ADD_QUANTITY
                .captures(&lower)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                .and_then(|m| m.as_str().parse().ok())
                .filter(|q| *q > 0)
                .unwrap_or(1);
            return CartCommand::Add { quantity };
        }
        CartCommand::View
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub partselect_number: String,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// Per-conversation carts kept in memory.
///
/// Entries live until [`CartStore::clear`] is called for the session.
#[derive(Clone, Default)]
pub struct CartStore {
    carts: Arc<DashMap<SessionKey, Vec<CartItem>>>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of a part, merging with an existing line. Returns the new line quantity.
    pub fn add(&self, key: &SessionKey, partselect_number: &str, quantity: u32) -> u32 {
        let mut items = self.carts.entry(key.clone()).or_default();
        match items
            .iter_mut()
            .find(|item| item.partselect_number == partselect_number)
        {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(quantity);
                item.quantity
            }
            None => {
                items.push(CartItem {
                    partselect_number: partselect_number.to_string(),
                    quantity,
                    added_at: Utc::now(),
                });
                quantity
            }
        }
    }

    /// Set the quantity of a line; zero removes it. Returns false if the part is not in the cart.
    pub fn set_quantity(&self, key: &SessionKey, partselect_number: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(key, partselect_number);
        }
        let Some(mut items) = self.carts.get_mut(key) else {
            return false;
        };
        match items
            .iter_mut()
            .find(|item| item.partselect_number == partselect_number)
        {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &SessionKey, partselect_number: &str) -> bool {
        let Some(mut items) = self.carts.get_mut(key) else {
            return false;
        };
        let before = items.len();
        items.retain(|item| item.partselect_number != partselect_number);
        items.len() != before
    }

    /// Drop the whole cart. Returns whether there was one.
    pub fn clear(&self, key: &SessionKey) -> bool {
        self.carts.remove(key).is_some()
    }

    pub fn items(&self, key: &SessionKey) -> Vec<CartItem> {
        self.carts
            .get(key)
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    /// Most recently added line
    pub fn last_added(&self, key: &SessionKey) -> Option<String> {
        self.carts.get(key).and_then(|items| {
            items
                .iter()
                .max_by_key(|item| item.added_at)
                .map(|item| item.partselect_number.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(CartCommand::parse("Add to cart"), CartCommand::Add { quantity: 1 });
        assert_eq!(
            CartCommand::parse("add 2 of them to my cart"),
            CartCommand::Add { quantity: 2 }
        );
        assert_eq!(CartCommand::parse("make that 3"), CartCommand::SetQuantity(3));
        assert_eq!(
            CartCommand::parse("update quantity to 4"),
            CartCommand::SetQuantity(4)
        );
        assert_eq!(
            CartCommand::parse("remove PS11701542 from my cart"),
            CartCommand::Remove
        );
        assert_eq!(CartCommand::parse("Checkout"), CartCommand::Checkout);
        assert_eq!(CartCommand::parse("what's in my cart?"), CartCommand::View);
    }

    #[test]
    fn test_add_merges_lines() {
        let store = CartStore::new();
        let key = SessionKey::generate();

        assert_eq!(store.add(&key, "PS11701542", 1), 1);
        assert_eq!(store.add(&key, "PS11701542", 2), 3);
        store.add(&key, "PS429868", 1);

        let items = store.items(&key);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 3);
    }

    #[test]
    fn test_set_quantity_and_remove() {
        let store = CartStore::new();
        let key = SessionKey::generate();
        store.add(&key, "PS11701542", 1);

        assert!(store.set_quantity(&key, "PS11701542", 5));
        assert_eq!(store.items(&key)[0].quantity, 5);
        assert!(!store.set_quantity(&key, "PS429868", 5));

        assert!(store.set_quantity(&key, "PS11701542", 0));
        assert!(store.items(&key).is_empty());
        assert!(!store.remove(&key, "PS11701542"));
    }

    #[test]
    fn test_carts_are_per_session() {
        let store = CartStore::new();
        let a = SessionKey::generate();
        let b = SessionKey::generate();
        store.add(&a, "PS11701542", 1);
        assert!(store.items(&b).is_empty());
        assert_eq!(store.last_added(&a).as_deref(), Some("PS11701542"));

        assert!(store.clear(&a));
        assert!(store.items(&a).is_empty());
        assert!(!store.clear(&b));
    }
}
