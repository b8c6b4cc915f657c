//! Group membership maintenance.
//!
//! Memberships live in the group entries' member-list attribute (`memberUid` unless configured
//! otherwise). Nothing is cached: every call reads or writes the directory.

use crate::normalize::strip_counts;
use crate::record::ModificationRecord;
use crate::session::DirectorySession;
use crate::transport::SearchScope;
use ldapkit_core::Error;
use serde_json::json;
use tracing::debug;

impl DirectorySession {
    /// DNs of the groups under `base_group_dn` listing `member_id`.
    ///
    /// Empty both when nothing matches and when the search fails.
    pub async fn memberships(&mut self, base_group_dn: &str, member_id: &str) -> Vec<String> {
        let filter = self.member_filter(member_id);
        let Ok(found) = self
            .try_search(base_group_dn, &filter, &["dn"], SearchScope::Subtree)
            .await
        else {
            return Vec::new();
        };

        strip_counts(&found)
            .branches()
            .filter_map(|group| group.dn().map(str::to_string))
            .collect()
    }

    /// Adds `member_id` to one group, keeping its other members.
    pub async fn add_membership(&mut self, member_id: &str, group_dn: &str) -> bool {
        let record = self.member_record(member_id);
        self.add_attribute(group_dn, &record).await
    }

    /// Removes `member_id` from one group, keeping its other members.
    pub async fn remove_membership(&mut self, member_id: &str, group_dn: &str) -> bool {
        let record = self.member_record(member_id);
        self.delete_attribute(group_dn, &record).await
    }

    /// Removes `member_id` from every group under `base_group_dn`.
    ///
    /// Stops at the first failed removal; groups after it keep the member.
    pub async fn remove_all_memberships(&mut self, base_group_dn: &str, member_id: &str) -> bool {
        for group_dn in self.memberships(base_group_dn, member_id).await {
            if !self.remove_membership(member_id, &group_dn).await {
                return false;
            }
        }
        true
    }

    /// Rebuilds the memberships of `member_id` to exactly `desired_group_dns`.
    ///
    /// Every current membership is removed first, then each desired group is added. This is not a
    /// diff and not atomic: between the two phases the member belongs to no group, and a failure
    /// leaves only a prefix of the desired groups in place. Both phases stop at the first failure.
    pub async fn sync_memberships<S>(
        &mut self,
        base_group_dn: &str,
        member_id: &str,
        desired_group_dns: &[S],
    ) -> bool
    where
        S: AsRef<str>,
    {
        if !self.remove_all_memberships(base_group_dn, member_id).await {
            self.warn(
                &Error::Attribute {
                    dn: base_group_dn.to_string(),
                    message: format!(
                        "membership sync for `{member_id}` stopped while removing old groups"
                    ),
                },
                json!({"member_id": member_id, "desired": desired_dns(desired_group_dns)}),
            );
            return false;
        }

        for (added, group_dn) in desired_group_dns.iter().enumerate() {
            if !self.add_membership(member_id, group_dn.as_ref()).await {
                self.warn(
                    &Error::Attribute {
                        dn: group_dn.as_ref().to_string(),
                        message: format!(
                            "membership sync for `{member_id}` stopped after {added} of {} groups",
                            desired_group_dns.len()
                        ),
                    },
                    json!({"member_id": member_id, "desired": desired_dns(desired_group_dns)}),
                );
                return false;
            }
        }

        debug!(
            member_id,
            groups = desired_group_dns.len(),
            "memberships synchronized"
        );
        true
    }

    fn member_filter(&self, member_id: &str) -> String {
        format!(
            "({}={})",
            self.config().member_attribute,
            escape_filter_value(member_id)
        )
    }

    fn member_record(&self, member_id: &str) -> ModificationRecord {
        ModificationRecord::new().with(self.config().member_attribute.as_str(), member_id)
    }
}

fn desired_dns<S: AsRef<str>>(dns: &[S]) -> Vec<&str> {
    dns.iter().map(AsRef::as_ref).collect()
}

/// Escapes a value for use inside a search filter (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}
