//! Subtree deletion.

use crate::normalize::strip_counts;
use crate::session::{DirectorySession, ANY_OBJECT_FILTER};
use crate::transport::SearchScope;

enum Step {
    /// List the children of `dn` and schedule them ahead of `dn` itself.
    Expand { dn: String, delete_self: bool },
    /// All descendants of `dn` are gone.
    Delete(String),
}

impl DirectorySession {
    /// Deletes `dn` and everything below it, children before parents.
    ///
    /// With `delete_only_children` the entry at `dn` is kept. The walk stops at the first
    /// failed listing or delete and returns `false`; entries removed before that stay removed.
    pub async fn recursive_delete(&mut self, dn: &str, delete_only_children: bool) -> bool {
        let mut pending = vec![Step::Expand {
            dn: dn.to_string(),
            delete_self: !delete_only_children,
        }];

        while let Some(step) = pending.pop() {
            match step {
                Step::Expand { dn, delete_self } => {
                    let Some(children) = self.child_dns(&dn).await else {
                        return false;
                    };
                    if delete_self {
                        pending.push(Step::Delete(dn));
                    }
                    pending.extend(children.into_iter().rev().map(|child| Step::Expand {
                        dn: child,
                        delete_self: true,
                    }));
                }
                Step::Delete(dn) => {
                    if !self.delete(&dn).await {
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Deletes everything below `dn`, keeping `dn`.
    pub async fn delete_children(&mut self, dn: &str) -> bool {
        self.recursive_delete(dn, true).await
    }

    /// DNs of the immediate children of `dn`, in server order.
    async fn child_dns(&mut self, dn: &str) -> Option<Vec<String>> {
        let listing = self
            .try_search(dn, ANY_OBJECT_FILTER, &["dn"], SearchScope::OneLevel)
            .await
            .ok()?;
        Some(
            strip_counts(&listing)
                .branches()
                .filter_map(|child| child.dn().map(str::to_string))
                .collect(),
        )
    }
}
