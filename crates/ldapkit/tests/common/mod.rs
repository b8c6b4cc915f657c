//! In-memory directory server behind the public transport traits.

#![allow(dead_code)]

use async_trait::async_trait;
use ldapkit::{
    Connector, DirectoryModification, DirectoryTransport, DistinguishedName, Error, LastError,
    LdapEntry, Result, SearchScope,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const BASE: &str = "dc=example,dc=com";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_PASSWORD: &str = "admin-secret";

type Attributes = BTreeMap<String, Vec<String>>;

#[derive(Default)]
struct State {
    entries: BTreeMap<String, Attributes>,
    passwords: BTreeMap<String, String>,
    log: Vec<String>,
    connections: usize,
    deletes: usize,
    fail_delete_at: Option<usize>,
}

/// Shared directory contents plus a log of every round trip.
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<State>>,
}

impl FakeDirectory {
    /// Directory with the suffix entry and the admin principal.
    pub fn new() -> Self {
        let directory = Self::default();
        directory.insert(BASE, &[("objectClass", "top"), ("objectClass", "domain")]);
        directory.insert(ADMIN_DN, &[("cn", "admin")]);
        directory.set_password(ADMIN_DN, ADMIN_PASSWORD);
        directory
    }

    /// Stores an entry; repeated attribute names add values.
    pub fn insert(&self, dn: &str, attributes: &[(&str, &str)]) {
        let mut entry = Attributes::new();
        for (name, value) in attributes {
            entry
                .entry((*name).to_string())
                .or_default()
                .push((*value).to_string());
        }
        self.lock().entries.insert(dn.to_string(), entry);
    }

    pub fn set_password(&self, dn: &str, password: &str) {
        self.lock()
            .passwords
            .insert(dn.to_string(), password.to_string());
    }

    /// Makes the `n`-th delete (1-based) fail.
    pub fn fail_delete_at(&self, n: usize) {
        self.lock().fail_delete_at = Some(n);
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.lock().entries.contains_key(dn)
    }

    pub fn values(&self, dn: &str, attribute: &str) -> Vec<String> {
        self.lock()
            .entries
            .get(dn)
            .and_then(|attributes| find_attribute(attributes, attribute))
            .cloned()
            .unwrap_or_default()
    }

    /// Log lines whose operation matches one of `operations`.
    pub fn calls(&self, operations: &[&str]) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|line| {
                operations
                    .iter()
                    .any(|op| line.split_once(' ').map_or(false, |(name, _)| name == *op))
            })
            .cloned()
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            directory: self.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("directory state poisoned")
    }
}

struct FakeConnector {
    directory: FakeDirectory,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn DirectoryTransport>> {
        self.directory.lock().connections += 1;
        Ok(Box::new(FakeTransport {
            directory: self.directory.clone(),
            last_error: None,
        }))
    }

    fn endpoint(&self) -> String {
        "ldap://fake.example.com:389".to_string()
    }
}

struct FakeTransport {
    directory: FakeDirectory,
    last_error: Option<LastError>,
}

impl FakeTransport {
    fn reject(&mut self, code: u32, error: &str) -> Error {
        self.last_error = Some(LastError {
            code,
            error: error.to_string(),
            diagnostic: format!("fake server: {error}"),
        });
        Error::transport(Some(code), error)
    }

    fn settle(&mut self, outcome: std::result::Result<(), (u32, &str)>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.last_error = None;
                Ok(())
            }
            Err((code, error)) => Err(self.reject(code, error)),
        }
    }
}

#[async_trait]
impl DirectoryTransport for FakeTransport {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let outcome = {
            let mut state = self.directory.lock();
            state.log.push(format!("bind {dn}"));
            match state.passwords.get(dn) {
                Some(expected) if expected == password => Ok(()),
                _ => Err((49, "invalidCredentials")),
            }
        };
        self.settle(outcome)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<LdapEntry>> {
        let found = {
            let mut state = self.directory.lock();
            state
                .log
                .push(format!("search {base_dn} {scope:?} {filter}"));
            if !state.entries.contains_key(base_dn) {
                None
            } else {
                Some(
                    state
                        .entries
                        .iter()
                        .filter(|(dn, _)| in_scope(dn, base_dn, scope))
                        .filter(|(_, entry)| matches_filter(entry, filter))
                        .map(|(dn, entry)| project(dn, entry, attributes))
                        .collect::<Vec<_>>(),
                )
            }
        };
        match found {
            Some(entries) => {
                self.last_error = None;
                Ok(entries)
            }
            None => Err(self.reject(32, "noSuchObject")),
        }
    }

    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()> {
        let outcome = {
            let mut state = self.directory.lock();
            state.log.push(format!("add {dn}"));
            if state.entries.contains_key(dn) {
                Err((68, "entryAlreadyExists"))
            } else if attributes.iter().any(|(_, values)| values.is_empty()) {
                Err((21, "invalidAttributeSyntax"))
            } else {
                state
                    .entries
                    .insert(dn.to_string(), attributes.iter().cloned().collect());
                Ok(())
            }
        };
        self.settle(outcome)
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let outcome = {
            let mut state = self.directory.lock();
            state.log.push(format!("modify {dn}"));
            match state.entries.get_mut(dn) {
                None => Err((32, "noSuchObject")),
                Some(entry) => apply(entry, modifications),
            }
        };
        self.settle(outcome)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let outcome = {
            let mut state = self.directory.lock();
            state.log.push(format!("delete {dn}"));
            state.deletes += 1;
            let has_children = state
                .entries
                .keys()
                .any(|other| parent_of(other).as_deref() == Some(dn));
            if state.fail_delete_at == Some(state.deletes) {
                Err((50, "insufficientAccessRights"))
            } else if !state.entries.contains_key(dn) {
                Err((32, "noSuchObject"))
            } else if has_children {
                Err((66, "notAllowedOnNonLeaf"))
            } else {
                state.entries.remove(dn);
                Ok(())
            }
        };
        self.settle(outcome)
    }

    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_parent: &str,
        delete_old_rdn: bool,
    ) -> Result<()> {
        let outcome = {
            let mut state = self.directory.lock();
            state.log.push(format!("rename {dn} {new_rdn} {new_parent}"));
            let target = format!("{new_rdn},{new_parent}");
            if state.entries.contains_key(&target) {
                Err((68, "entryAlreadyExists"))
            } else {
                match state.entries.remove(dn) {
                    None => Err((32, "noSuchObject")),
                    Some(mut entry) => {
                        rewrite_naming_value(&mut entry, dn, new_rdn, delete_old_rdn);
                        state.entries.insert(target, entry);
                        Ok(())
                    }
                }
            }
        };
        self.settle(outcome)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.directory.lock().log.push("unbind -".to_string());
        Ok(())
    }

    fn last_error(&self) -> Option<LastError> {
        self.last_error.clone()
    }
}

fn parent_of(dn: &str) -> Option<String> {
    DistinguishedName::parse(dn)
        .ok()
        .and_then(|parsed| parsed.parent())
        .map(|parent| parent.as_str().to_string())
}

fn in_scope(dn: &str, base_dn: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base_dn,
        SearchScope::OneLevel => parent_of(dn).as_deref() == Some(base_dn),
        SearchScope::Subtree => dn == base_dn || dn.ends_with(&format!(",{base_dn}")),
    }
}

fn find_attribute<'a>(entry: &'a Attributes, name: &str) -> Option<&'a Vec<String>> {
    entry
        .iter()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        .map(|(_, values)| values)
}

/// Supports `(attr=*)` and `(attr=value)`.
fn matches_filter(entry: &Attributes, filter: &str) -> bool {
    let inner = filter.trim_start_matches('(').trim_end_matches(')');
    let Some((attribute, value)) = inner.split_once('=') else {
        return false;
    };
    if attribute.eq_ignore_ascii_case("objectClass") && value == "*" {
        return true;
    }
    find_attribute(entry, attribute).map_or(false, |values| {
        value == "*" || values.iter().any(|existing| existing == value)
    })
}

fn project(dn: &str, entry: &Attributes, requested: &[String]) -> LdapEntry {
    let mut projected = LdapEntry::new(dn);
    for (name, values) in entry {
        let wanted = requested.is_empty()
            || requested
                .iter()
                .any(|attribute| attribute.eq_ignore_ascii_case(name));
        if wanted {
            projected.attributes.insert(name.clone(), values.clone());
        }
    }
    projected
}

fn apply(
    entry: &mut Attributes,
    modifications: &[DirectoryModification],
) -> std::result::Result<(), (u32, &'static str)> {
    for modification in modifications {
        match modification {
            DirectoryModification::Add { attribute, values } => {
                let current = entry.entry(attribute.clone()).or_default();
                if values.iter().any(|value| current.contains(value)) {
                    return Err((20, "attributeOrValueExists"));
                }
                current.extend(values.iter().cloned());
            }
            DirectoryModification::Delete { attribute, values } => {
                let Some(current) = entry.get_mut(attribute) else {
                    return Err((16, "noSuchAttribute"));
                };
                if values.is_empty() {
                    entry.remove(attribute);
                    continue;
                }
                if !values.iter().all(|value| current.contains(value)) {
                    return Err((16, "noSuchAttribute"));
                }
                current.retain(|existing| !values.contains(existing));
                if current.is_empty() {
                    entry.remove(attribute);
                }
            }
            DirectoryModification::Replace { attribute, values } => {
                if values.is_empty() {
                    entry.remove(attribute);
                } else {
                    entry.insert(attribute.clone(), values.clone());
                }
            }
        }
    }
    Ok(())
}

fn rewrite_naming_value(entry: &mut Attributes, old_dn: &str, new_rdn: &str, delete_old: bool) {
    let old_rdn = old_dn.split(',').next().unwrap_or_default();
    if let Some((attribute, old_value)) = old_rdn.split_once('=') {
        if delete_old {
            if let Some(values) = entry.get_mut(attribute) {
                values.retain(|value| value != old_value);
            }
        }
    }
    if let Some((attribute, new_value)) = new_rdn.split_once('=') {
        let values = entry.entry(attribute.to_string()).or_default();
        if !values.iter().any(|value| value == new_value) {
            values.push(new_value.to_string());
        }
    }
}
