//! Search result normalization.
//!
//! Turns a [`RawTree`] into a [`NormalizedEntry`]: counts disappear, single-valued attributes
//! collapse to scalars, and subtree branches are keyed by their DN. Both functions here are pure;
//! they read the input tree and build a new output.

use crate::raw::{RawKey, RawTree, RawValue, COUNT_KEY};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// Key of a normalized slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    /// Attribute name or branch DN.
    Name(String),
    /// Positional slot, used for branches without a usable DN.
    Index(usize),
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Value of a normalized slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedValue {
    /// Attribute with exactly one value.
    Single(String),
    /// Attribute with zero or several values, in server order.
    Multi(Vec<String>),
    /// Nested entry (a search hit or subtree branch).
    Entry(NormalizedEntry),
}

impl NormalizedValue {
    /// All values as a list (empty for nested entries).
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
            Self::Entry(_) => Vec::new(),
        }
    }

    /// The nested entry, if this slot holds one.
    #[must_use]
    pub fn as_entry(&self) -> Option<&NormalizedEntry> {
        match self {
            Self::Entry(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Clean nested mapping built from a search result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedEntry {
    slots: Vec<(EntryKey, NormalizedValue)>,
    names: HashMap<String, usize>,
    positions: HashMap<usize, usize>,
    next_index: usize,
}

impl NormalizedEntry {
    /// True when nothing was normalized (failure sentinel or empty result).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntryKey, &NormalizedValue)> + '_ {
        self.slots.iter().map(|(key, value)| (key, value))
    }

    /// Exact lookup by name (attribute or DN).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NormalizedValue> {
        self.names.get(name).map(|slot| &self.slots[*slot].1)
    }

    /// Positional lookup.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&NormalizedValue> {
        self.positions.get(&index).map(|slot| &self.slots[*slot].1)
    }

    /// Case-insensitive attribute lookup.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&NormalizedValue> {
        self.slots.iter().find_map(|(key, value)| match (key, value) {
            (EntryKey::Name(existing), NormalizedValue::Single(_) | NormalizedValue::Multi(_))
                if existing.eq_ignore_ascii_case(name) =>
            {
                Some(value)
            }
            _ => None,
        })
    }

    /// First value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(|value| value.values().first().copied())
    }

    /// Nested entry stored under a DN.
    #[must_use]
    pub fn child(&self, dn: &str) -> Option<&NormalizedEntry> {
        self.get(dn).and_then(NormalizedValue::as_entry)
    }

    /// Nested entries with their keys, in order.
    pub fn children(&self) -> impl Iterator<Item = (&EntryKey, &NormalizedEntry)> + '_ {
        self.slots
            .iter()
            .filter_map(|(key, value)| value.as_entry().map(|entry| (key, entry)))
    }

    fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    fn set(&mut self, name: String, value: NormalizedValue) {
        match self.names.get(&name).copied() {
            Some(slot) => self.slots[slot].1 = value,
            None => {
                self.names.insert(name.clone(), self.slots.len());
                self.slots.push((EntryKey::Name(name), value));
            }
        }
    }

    fn push(&mut self, value: NormalizedValue) {
        self.positions.insert(self.next_index, self.slots.len());
        self.slots.push((EntryKey::Index(self.next_index), value));
        self.next_index += 1;
    }
}

impl Serialize for NormalizedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(value) => serializer.serialize_str(value),
            Self::Multi(values) => values.serialize(serializer),
            Self::Entry(entry) => entry.serialize(serializer),
        }
    }
}

impl Serialize for NormalizedEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for (key, value) in &self.slots {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

/// Removes every `count` marker at every level.
///
/// Only scalar `count` slots are dropped; a nested tree that happens to be keyed `count` (an
/// attribute by that name) is kept and descended into. Running it twice is a no-op.
#[must_use]
pub fn strip_counts(tree: &RawTree) -> RawTree {
    let mut stripped = RawTree::new();
    for (key, value) in tree.iter() {
        match value {
            RawValue::Tree(branch) => stripped.insert(key.clone(), RawValue::Tree(strip_counts(branch))),
            _ if matches!(key, RawKey::Name(name) if name == COUNT_KEY) => {}
            _ => stripped.insert(key.clone(), value.clone()),
        }
    }
    stripped
}

/// Normalizes a raw search result.
///
/// `None` is the failure sentinel and yields an empty entry. For each index below the level's
/// count: a nested tree is normalized recursively and keyed by its DN, unless the DN is missing,
/// empty, or already used, in which case it is appended positionally (the first branch seen
/// under a DN keeps it). A text slot names an attribute, whose values are stored as a scalar when
/// the attribute's count is 1 and as an ordered list otherwise. Malformed slots are skipped.
#[must_use]
pub fn normalize(raw: Option<&RawTree>) -> NormalizedEntry {
    let mut entry = NormalizedEntry::default();
    let Some(tree) = raw else {
        return entry;
    };

    for (_, slot) in tree.positional(tree.count().unwrap_or(0)) {
        match slot {
            RawValue::Tree(branch) => {
                let child = NormalizedValue::Entry(normalize(Some(branch)));
                match branch.dn().filter(|dn| !dn.is_empty()) {
                    Some(dn) if !entry.contains_name(dn) => entry.set(dn.to_string(), child),
                    _ => entry.push(child),
                }
            }
            RawValue::Text(attribute) => {
                if let Some(value) = attribute_values(tree, attribute) {
                    entry.set(attribute.clone(), value);
                }
            }
            RawValue::Count(_) => {}
        }
    }

    entry
}

fn attribute_values(tree: &RawTree, attribute: &str) -> Option<NormalizedValue> {
    let Some(RawValue::Tree(values)) = tree.get_name(attribute) else {
        return None;
    };
    let count = values.count().unwrap_or(0);

    let collected: Vec<String> = values
        .positional(count)
        .into_iter()
        .filter_map(|(_, value)| match value {
            RawValue::Text(value) => Some(value.clone()),
            _ => None,
        })
        .collect();

    if count == 1 {
        collected.into_iter().next().map(NormalizedValue::Single)
    } else {
        Some(NormalizedValue::Multi(collected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LdapEntry;
    use serde_json::json;

    fn sample() -> RawTree {
        RawTree::from_entries(&[
            LdapEntry::new("uid=ann,ou=people,dc=example,dc=com")
                .with_attribute("uid", ["ann"])
                .with_attribute("mail", ["ann@example.com", "a.smith@example.com"]),
            LdapEntry::new("uid=bob,ou=people,dc=example,dc=com").with_attribute("uid", ["bob"]),
        ])
    }

    #[test]
    fn strip_counts_removes_markers_everywhere() {
        let stripped = strip_counts(&sample());
        assert_eq!(stripped.count(), None);
        for branch in stripped.branches() {
            assert_eq!(branch.count(), None);
            for values in branch.branches() {
                assert_eq!(values.count(), None);
            }
        }
        assert_eq!(stripped.branches().count(), 2);
    }

    #[test]
    fn strip_counts_is_idempotent() {
        let once = strip_counts(&sample());
        assert_eq!(strip_counts(&once), once);
    }

    #[test]
    fn strip_counts_keeps_attribute_named_count() {
        let tree = RawTree::new().with(
            COUNT_KEY,
            RawValue::Tree(RawTree::new().with(0, RawValue::Text("7".to_string()))),
        );
        assert_eq!(strip_counts(&tree), tree);
    }

    #[test]
    fn failure_sentinel_normalizes_to_empty() {
        assert!(normalize(None).is_empty());
        assert_eq!(normalize(None), NormalizedEntry::default());
    }

    #[test]
    fn single_value_collapses_and_multi_value_keeps_order() {
        let normalized = normalize(Some(&sample()));
        let ann = normalized.child("uid=ann,ou=people,dc=example,dc=com").unwrap();

        assert_eq!(ann.get("uid"), Some(&NormalizedValue::Single("ann".to_string())));
        assert_eq!(
            ann.get("mail"),
            Some(&NormalizedValue::Multi(vec![
                "ann@example.com".to_string(),
                "a.smith@example.com".to_string()
            ]))
        );
        assert_eq!(ann.first("MAIL"), Some("ann@example.com"));
        assert!(ann.get("dn").is_none());
    }

    #[test]
    fn duplicate_and_missing_dns_fall_back_to_positions() {
        let raw = RawTree::from_json(&json!({
            "count": 3,
            "0": {"count": 1, "0": "cn", "cn": {"count": 1, "0": "first"}, "dn": "cn=x,dc=example"},
            "1": {"count": 1, "0": "cn", "cn": {"count": 1, "0": "second"}, "dn": "cn=x,dc=example"},
            "2": {"count": 1, "0": "cn", "cn": {"count": 1, "0": "third"}, "dn": ""}
        }))
        .unwrap();

        let normalized = normalize(Some(&raw));
        assert_eq!(normalized.len(), 3);
        assert_eq!(
            normalized.child("cn=x,dc=example").unwrap().first("cn"),
            Some("first")
        );

        let second = normalized.get_index(0).and_then(NormalizedValue::as_entry).unwrap();
        assert_eq!(second.first("cn"), Some("second"));
        let third = normalized.get_index(1).and_then(NormalizedValue::as_entry).unwrap();
        assert_eq!(third.first("cn"), Some("third"));
    }

    #[test]
    fn empty_value_list_is_present_but_empty() {
        let raw = RawTree::from_entries(&[
            LdapEntry::new("cn=g,dc=example").with_attribute("memberUid", Vec::<String>::new())
        ]);
        let normalized = normalize(Some(&raw));
        let group = normalized.child("cn=g,dc=example").unwrap();
        assert_eq!(group.get("memberuid"), Some(&NormalizedValue::Multi(Vec::new())));
        assert!(group.get("cn").is_none());
    }

    #[test]
    fn malformed_levels_do_not_panic() {
        let raw = RawTree::from_json(&json!({"count": 4, "0": "ghost", "2": 5})).unwrap();
        assert!(normalize(Some(&raw)).is_empty());

        let no_count = RawTree::from_json(&json!({"0": {"dn": "cn=x"}})).unwrap();
        assert!(normalize(Some(&no_count)).is_empty());
    }

    #[test]
    fn inflated_counts_only_visit_present_slots() {
        let raw = RawTree::new()
            .with(COUNT_KEY, RawValue::Count(usize::MAX))
            .with(
                0,
                RawValue::Tree(
                    RawTree::new()
                        .with(COUNT_KEY, RawValue::Count(usize::MAX))
                        .with(0, RawValue::Text("cn".to_string()))
                        .with(
                            "cn",
                            RawValue::Tree(
                                RawTree::new()
                                    .with(COUNT_KEY, RawValue::Count(usize::MAX))
                                    .with(0, RawValue::Text("admins".to_string())),
                            ),
                        )
                        .with("dn", RawValue::Text("cn=admins,dc=example".to_string())),
                ),
            );

        let normalized = normalize(Some(&raw));
        let group = normalized.child("cn=admins,dc=example").unwrap();
        assert_eq!(
            group.get("cn"),
            Some(&NormalizedValue::Multi(vec!["admins".to_string()]))
        );

        let bare = RawTree::new().with(COUNT_KEY, RawValue::Count(usize::MAX));
        assert!(normalize(Some(&bare)).is_empty());
    }

    #[test]
    fn serializes_as_nested_map() {
        let normalized = normalize(Some(&sample()));
        let value = serde_json::to_value(&normalized).unwrap();
        assert_eq!(
            value,
            json!({
                "uid=ann,ou=people,dc=example,dc=com": {
                    "mail": ["ann@example.com", "a.smith@example.com"],
                    "uid": "ann"
                },
                "uid=bob,ou=people,dc=example,dc=com": {"uid": "bob"}
            })
        );
    }
}
