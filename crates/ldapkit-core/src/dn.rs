//! Distinguished name parsing.
//!
//! A DN is the hierarchical key of a directory entry: the leftmost component (the RDN) names the
//! entry among its siblings and the remainder is the DN of its parent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::Error;

/// Errors raised while parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The input was blank.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component had no `=` or was otherwise unusable.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// Nothing to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// Nothing to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// Input ended in the middle of an escape sequence.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for Error {
    fn from(err: DistinguishedNameError) -> Self {
        Error::InvalidDn(err.to_string())
    }
}

/// One `attribute=value` pair of an RDN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Create a new attribute/value pair.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute type, e.g. `cn`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Case-insensitive attribute type comparison.
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Parsed distinguished name.
///
/// Keeps the canonical string alongside the parsed components. Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or syntactically invalid.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut rdns = Vec::new();
        for component in split_escaped(raw, ',')? {
            let mut rdn = Vec::new();
            for part in split_escaped(&component, '+')? {
                let (attribute, value) = split_attribute_value(&part)?;
                rdn.push(RelativeDistinguishedName::new(attribute, value));
            }
            rdns.push(rdn);
        }

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Vec<RelativeDistinguishedName>>) -> Self {
        Self {
            raw: rdns_to_string(&rdns),
            rdns,
        }
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// RDN sets in order, leftmost first.
    #[must_use]
    pub fn rdns(&self) -> &[Vec<RelativeDistinguishedName>] {
        &self.rdns
    }

    /// Number of RDNs, i.e. the depth of the entry below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// The leftmost RDN rendered as a string (`cn=John+uid=1` for multi-valued RDNs).
    #[must_use]
    pub fn rdn(&self) -> String {
        self.rdns
            .first()
            .map(|rdn| rdn_to_string(rdn))
            .unwrap_or_default()
    }

    /// The DN of the parent entry, or `None` for a single-component DN.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// True if `self` lies strictly below `ancestor` in the tree.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        if self.rdns.len() <= ancestor.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(ancestor.rdns.iter())
            .all(|(ours, theirs)| rdn_eq(ours, theirs))
    }

    /// Iterates over all attribute/value pairs in order.
    pub fn components(&self) -> impl Iterator<Item = &RelativeDistinguishedName> + '_ {
        self.rdns.iter().flat_map(|rdn| rdn.iter())
    }

    /// Value of the first component whose attribute matches (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components()
            .find(|rdn| rdn.matches_attribute(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Prepends a single-valued RDN, producing the DN of a child entry.
    #[must_use]
    pub fn with_prefix(mut self, rdn: RelativeDistinguishedName) -> Self {
        self.rdns.insert(0, vec![rdn]);
        self.raw = rdns_to_string(&self.rdns);
        self
    }

    /// Appends `suffix`, e.g. to place a relative name under a base DN.
    #[must_use]
    pub fn join(mut self, suffix: &DistinguishedName) -> Self {
        self.rdns.extend(suffix.rdns.iter().cloned());
        self.raw = rdns_to_string(&self.rdns);
        self
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

fn rdn_eq(left: &[RelativeDistinguishedName], right: &[RelativeDistinguishedName]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(a, b)| {
            a.matches_attribute(&b.attribute) && a.value.eq_ignore_ascii_case(&b.value)
        })
}

fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            // Keep the escape so the value splitter still sees it.
            current.push('\\');
            current.push(ch);
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(
    component: &str,
) -> std::result::Result<(String, String), DistinguishedNameError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx =
        index.ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value = component[idx + 1..].trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }
    if value.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok((attribute.to_string(), unescape(value)?))
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            result.push(next);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn escape(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx == last && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

fn rdn_to_string(rdn: &[RelativeDistinguishedName]) -> String {
    rdn.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("+")
}

fn rdns_to_string(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    rdns.iter()
        .map(|rdn| rdn_to_string(rdn))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_dn() {
        let dn = DistinguishedName::parse("uid=jdoe,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("uid"), Some("jdoe"));
        assert_eq!(dn.get("OU"), Some("people"));
        assert_eq!(dn.depth(), 4);
        assert_eq!(dn.rdn(), "uid=jdoe");
        assert_eq!(dn.to_string(), "uid=jdoe,ou=people,dc=example,dc=com");
    }

    #[test]
    fn parse_dn_with_escaped_comma() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
        assert_eq!(dn.depth(), 4);
        assert_eq!(dn.rdn(), "cn=Smith\\, John");
    }

    #[test]
    fn parse_escaped_plus_is_not_multi_valued() {
        let dn = DistinguishedName::parse("cn=a\\+b,dc=example").unwrap();
        assert_eq!(dn.rdns()[0].len(), 1);
        assert_eq!(dn.get("cn"), Some("a+b"));
    }

    #[test]
    fn parse_multi_valued_rdn() {
        let dn = DistinguishedName::parse("cn=John+uid=1234,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdns()[0].len(), 2);
        assert_eq!(dn.rdn(), "cn=John+uid=1234");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            DistinguishedName::parse("  ").unwrap_err(),
            DistinguishedNameError::Empty
        );
        assert!(matches!(
            DistinguishedName::parse("cn=John,").unwrap_err(),
            DistinguishedNameError::InvalidComponent(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("=John").unwrap_err(),
            DistinguishedNameError::MissingAttribute(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("cn=").unwrap_err(),
            DistinguishedNameError::MissingValue(_)
        ));
        assert_eq!(
            DistinguishedName::parse("cn=John\\").unwrap_err(),
            DistinguishedNameError::UnterminatedEscape
        );
    }

    #[test]
    fn parent_and_descendant() {
        let base = DistinguishedName::parse("ou=groups,dc=example,dc=com").unwrap();
        let group = DistinguishedName::parse("cn=staff,OU=Groups,dc=example,dc=com").unwrap();

        assert_eq!(group.parent().unwrap().as_str(), "OU=Groups,dc=example,dc=com");
        assert!(group.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&group));
        assert!(!base.is_descendant_of(&base));
        assert!(DistinguishedName::parse("dc=com").unwrap().parent().is_none());
    }

    #[test]
    fn with_prefix_and_join() {
        let base = DistinguishedName::parse("ou=people,dc=example,dc=com").unwrap();
        let user = base
            .clone()
            .with_prefix(RelativeDistinguishedName::new("cn", "Doe, Jane"));
        assert_eq!(user.to_string(), "cn=Doe\\, Jane,ou=people,dc=example,dc=com");

        let joined = DistinguishedName::parse("uid=1234").unwrap().join(&base);
        assert_eq!(joined.to_string(), "uid=1234,ou=people,dc=example,dc=com");
    }

    #[test]
    fn serde_uses_string_form() {
        let dn: DistinguishedName = serde_json::from_str("\"ou=people,dc=example\"").unwrap();
        assert_eq!(dn.get("ou"), Some("people"));
        assert_eq!(serde_json::to_string(&dn).unwrap(), "\"ou=people,dc=example\"");
        assert!(serde_json::from_str::<DistinguishedName>("\"nonsense\"").is_err());
    }

    #[test]
    fn converts_into_core_error() {
        let err: Error = DistinguishedNameError::Empty.into();
        assert!(matches!(err, Error::InvalidDn(_)));
    }
}
