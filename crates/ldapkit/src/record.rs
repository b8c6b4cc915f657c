//! Attribute payloads for add and modify requests.

use crate::transport::DirectoryModification;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Attributes whose values never appear in diagnostics.
const REDACTED_ATTRIBUTES: &[&str] = &["userPassword", "sambaNTPassword", "sambaLMPassword"];

/// Mapping from attribute name to new value(s).
///
/// What an empty value means depends on the request: [`add`](crate::DirectorySession::add)
/// drops it, [`modify`](crate::DirectorySession::modify) turns it into "clear this attribute".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationRecord {
    attributes: BTreeMap<String, Vec<String>>,
}

impl ModificationRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a single-valued attribute.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(attribute.into(), vec![value.into()]);
        self
    }

    /// Sets a multi-valued attribute.
    #[must_use]
    pub fn with_values<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(attribute.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True when the record carries no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Values for an attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// Attributes with their values, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Attribute list for a create request, with empty-valued attributes removed.
    #[must_use]
    pub fn for_add(&self) -> Vec<(String, Vec<String>)> {
        self.attributes
            .iter()
            .filter(|(_, values)| !is_empty_value(values))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }

    /// Replace operations for a modify request; empty values become explicit clears.
    #[must_use]
    pub fn for_modify(&self) -> Vec<DirectoryModification> {
        self.attributes
            .iter()
            .map(|(name, values)| DirectoryModification::Replace {
                attribute: name.clone(),
                values: if is_empty_value(values) {
                    Vec::new()
                } else {
                    values.clone()
                },
            })
            .collect()
    }

    /// Incremental value additions.
    #[must_use]
    pub fn for_value_add(&self) -> Vec<DirectoryModification> {
        self.attributes
            .iter()
            .map(|(name, values)| DirectoryModification::Add {
                attribute: name.clone(),
                values: values.clone(),
            })
            .collect()
    }

    /// Incremental value removals.
    #[must_use]
    pub fn for_value_delete(&self) -> Vec<DirectoryModification> {
        self.attributes
            .iter()
            .map(|(name, values)| DirectoryModification::Delete {
                attribute: name.clone(),
                values: values.clone(),
            })
            .collect()
    }

    /// JSON rendering for diagnostics, with secret attributes masked.
    #[must_use]
    pub fn redacted(&self) -> Value {
        let map = self
            .attributes
            .iter()
            .map(|(name, values)| {
                let shown = if is_secret(name) {
                    json!("<redacted>")
                } else {
                    json!(values)
                };
                (name.clone(), shown)
            })
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl<K, V> FromIterator<(K, V)> for ModificationRecord
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (attribute, value) in iter {
            record
                .attributes
                .entry(attribute.into())
                .or_default()
                .push(value.into());
        }
        record
    }
}

/// No values, or only blank ones.
fn is_empty_value(values: &[String]) -> bool {
    values.iter().all(String::is_empty)
}

fn is_secret(attribute: &str) -> bool {
    REDACTED_ATTRIBUTES
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(attribute))
}
