//! Count-prefixed search result trees.
//!
//! Directory client libraries commonly hand back search results as a loosely-typed tree: every
//! level carries a `count` marker, entries and values sit under positional indices, attribute
//! names are listed positionally and again as keys holding their values, and each entry holds
//! its `dn`. [`RawTree`] models that layout with typed keys and values so the normalizer can
//! work on it without guessing.
//!
//! ```text
//! { count: 1,
//!   0: { cn: { count: 1, 0: "admins" }, 0: "cn",
//!        memberuid: { count: 2, 0: "ann", 1: "bob" }, 1: "memberuid",
//!        count: 2, dn: "cn=admins,ou=groups,dc=example,dc=com" } }
//! ```

use crate::transport::LdapEntry;
use serde_json::Value;
use std::collections::HashMap;

/// Key of a [`RawTree`] slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawKey {
    /// Positional index.
    Index(usize),
    /// Named key (`count`, `dn` or an attribute name).
    Name(String),
}

impl From<usize> for RawKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for RawKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Value of a [`RawTree`] slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Bookkeeping count.
    Count(usize),
    /// Attribute name, attribute value or DN.
    Text(String),
    /// Nested level.
    Tree(RawTree),
}

/// Marker key the protocol layer puts at every level.
pub const COUNT_KEY: &str = "count";

/// Ordered tree of keyed slots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTree {
    slots: Vec<(RawKey, RawValue)>,
    names: HashMap<String, usize>,
    positions: HashMap<usize, usize>,
}

impl RawTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing an existing slot in place.
    pub fn insert(&mut self, key: impl Into<RawKey>, value: RawValue) {
        let key = key.into();
        if let Some(slot) = self.slot_of(&key) {
            self.slots[slot].1 = value;
            return;
        }
        let slot = self.slots.len();
        match &key {
            RawKey::Name(name) => self.names.insert(name.clone(), slot),
            RawKey::Index(index) => self.positions.insert(*index, slot),
        };
        self.slots.push((key, value));
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<RawKey>, value: RawValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Looks up a slot.
    #[must_use]
    pub fn get(&self, key: &RawKey) -> Option<&RawValue> {
        self.slot_of(key).map(|slot| &self.slots[slot].1)
    }

    /// Looks up a named slot.
    #[must_use]
    pub fn get_name(&self, name: &str) -> Option<&RawValue> {
        self.names.get(name).map(|slot| &self.slots[*slot].1)
    }

    /// Looks up a positional slot.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&RawValue> {
        self.positions.get(&index).map(|slot| &self.slots[*slot].1)
    }

    /// Positional slots below `bound`, in index order.
    ///
    /// Only slots that exist are visited, so an inflated bound costs nothing.
    #[must_use]
    pub fn positional(&self, bound: usize) -> Vec<(usize, &RawValue)> {
        let mut found: Vec<(usize, &RawValue)> = self
            .positions
            .iter()
            .filter(|(index, _)| **index < bound)
            .map(|(index, slot)| (*index, &self.slots[*slot].1))
            .collect();
        found.sort_unstable_by_key(|(index, _)| *index);
        found
    }

    /// The `count` marker of this level, if present.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match self.get_name(COUNT_KEY) {
            Some(RawValue::Count(count)) => Some(*count),
            _ => None,
        }
    }

    /// Text stored under a named slot.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get_name(name) {
            Some(RawValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// The `dn` slot.
    #[must_use]
    pub fn dn(&self) -> Option<&str> {
        self.text("dn")
    }

    /// Nested trees in slot order, regardless of key.
    pub fn branches(&self) -> impl Iterator<Item = &RawTree> + '_ {
        self.slots.iter().filter_map(|(_, value)| match value {
            RawValue::Tree(tree) => Some(tree),
            _ => None,
        })
    }

    /// All slots in order.
    pub fn iter(&self) -> impl Iterator<Item = (&RawKey, &RawValue)> + '_ {
        self.slots.iter().map(|(key, value)| (key, value))
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot_of(&self, key: &RawKey) -> Option<usize> {
        match key {
            RawKey::Name(name) => self.names.get(name).copied(),
            RawKey::Index(index) => self.positions.get(index).copied(),
        }
    }

    /// Lays out transport entries the way the protocol layer reports them.
    ///
    /// Attribute names are lower-cased since the protocol treats them case-insensitively.
    #[must_use]
    pub fn from_entries(entries: &[LdapEntry]) -> Self {
        let mut tree = Self::new().with(COUNT_KEY, RawValue::Count(entries.len()));

        for (index, entry) in entries.iter().enumerate() {
            let mut node = Self::new();
            let mut attribute_count = 0;

            for (name, values) in &entry.attributes {
                let name = name.to_ascii_lowercase();
                let mut value_tree = Self::new().with(COUNT_KEY, RawValue::Count(values.len()));
                for (position, value) in values.iter().enumerate() {
                    value_tree.insert(position, RawValue::Text(value.clone()));
                }
                node.insert(name.as_str(), RawValue::Tree(value_tree));
                node.insert(attribute_count, RawValue::Text(name));
                attribute_count += 1;
            }

            node.insert(COUNT_KEY, RawValue::Count(attribute_count));
            node.insert("dn", RawValue::Text(entry.dn.clone()));
            tree.insert(index, RawValue::Tree(node));
        }

        tree
    }

    /// Loads a JSON dump of the same layout.
    ///
    /// Objects become trees (all-digit keys are positional, placed first in numeric order), arrays
    /// become positional trees,
    /// non-negative integers become counts and strings become text. `false` is the failure
    /// sentinel and yields `None`, as does any non-object top level.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Object(_) | Value::Array(_) => match json_to_raw(value) {
                Some(RawValue::Tree(tree)) => Some(tree),
                _ => None,
            },
            _ => None,
        }
    }
}

fn json_to_raw(value: &Value) -> Option<RawValue> {
    match value {
        Value::Object(map) => {
            let mut keyed: Vec<(RawKey, &Value)> =
                map.iter().map(|(key, child)| (parse_key(key), child)).collect();
            // JSON object keys arrive sorted as strings ("10" before "2").
            keyed.sort_by_key(|(key, _)| match key {
                RawKey::Index(index) => (0, *index),
                RawKey::Name(_) => (1, 0),
            });
            let mut tree = RawTree::new();
            for (key, child) in keyed {
                if let Some(converted) = json_to_raw(child) {
                    tree.insert(key, converted);
                }
            }
            Some(RawValue::Tree(tree))
        }
        Value::Array(items) => {
            let mut tree = RawTree::new();
            for (index, child) in items.iter().enumerate() {
                if let Some(converted) = json_to_raw(child) {
                    tree.insert(index, converted);
                }
            }
            Some(RawValue::Tree(tree))
        }
        Value::Number(number) => number
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(RawValue::Count),
        Value::String(text) => Some(RawValue::Text(text.clone())),
        Value::Bool(_) | Value::Null => None,
    }
}

fn parse_key(key: &str) -> RawKey {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(index) = key.parse() {
            return RawKey::Index(index);
        }
    }
    RawKey::Name(key.to_string())
}
