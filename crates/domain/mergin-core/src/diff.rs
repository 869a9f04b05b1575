//! Three-way project diff.
//!
//! Compares project files from three sources: the stored baseline ("old"
//! server version), the freshly fetched server manifest ("new" server
//! version) and the live local directory content. Every path is assigned to
//! exactly one kind of change; unchanged files do not appear in the diff.

use std::collections::{BTreeSet, HashMap};

use crate::MerginFile;

/// Classified change sets of one project, keyed by relative path.
///
/// The sets are pairwise disjoint. A path appearing in none of them has
/// identical content in all three sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDiff {
    // changes that should be pushed
    pub local_added: BTreeSet<String>,
    pub local_updated: BTreeSet<String>,
    pub local_deleted: BTreeSet<String>,

    // changes that should be pulled
    pub remote_added: BTreeSet<String>,
    pub remote_updated: BTreeSet<String>,
    pub remote_deleted: BTreeSet<String>,

    // conflicts resolved by making a copy of the local file
    pub conflict_remote_updated_local_updated: BTreeSet<String>,
    pub conflict_remote_added_local_added: BTreeSet<String>,

    // conflicts where one side deleted what the other changed
    pub conflict_remote_deleted_local_updated: BTreeSet<String>,
    pub conflict_remote_updated_local_deleted: BTreeSet<String>,
}

impl ProjectDiff {
    pub fn is_empty(&self) -> bool {
        self.local_added.is_empty()
            && self.local_updated.is_empty()
            && self.local_deleted.is_empty()
            && self.remote_added.is_empty()
            && self.remote_updated.is_empty()
            && self.remote_deleted.is_empty()
            && self.conflict_remote_updated_local_updated.is_empty()
            && self.conflict_remote_added_local_added.is_empty()
            && self.conflict_remote_deleted_local_updated.is_empty()
            && self.conflict_remote_updated_local_deleted.is_empty()
    }

    /// Paths the pull pipeline must download from the server.
    pub fn files_to_download(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        paths.extend(self.remote_added.iter().cloned());
        paths.extend(self.remote_updated.iter().cloned());
        paths.extend(self.conflict_remote_updated_local_updated.iter().cloned());
        paths.extend(self.conflict_remote_added_local_added.iter().cloned());
        paths.extend(self.conflict_remote_updated_local_deleted.iter().cloned());
        paths
    }

    /// One-line-per-group summary, for logs.
    pub fn dump(&self) -> String {
        format!(
            "--- project diff ---\n\
             local: {} added, {} updated, {} deleted\n\
             remote: {} added, {} updated, {} deleted\n\
             conflicts: {} RU-LU, {} RA-LA, {} RD-LU, {} RU-LD",
            self.local_added.len(),
            self.local_updated.len(),
            self.local_deleted.len(),
            self.remote_added.len(),
            self.remote_updated.len(),
            self.remote_deleted.len(),
            self.conflict_remote_updated_local_updated.len(),
            self.conflict_remote_added_local_added.len(),
            self.conflict_remote_deleted_local_updated.len(),
            self.conflict_remote_updated_local_deleted.len(),
        )
    }
}

fn checksum_map(files: &[MerginFile]) -> HashMap<&str, &str> {
    files
        .iter()
        .map(|f| (f.path.as_str(), f.checksum.as_str()))
        .collect()
}

/// Classify every path appearing in any of the three file lists.
///
/// `old` is the last server version applied locally (the baseline), `new` is
/// the current server version, `local` is what the project directory holds
/// right now. Equality is by content checksum. Pure and deterministic; the
/// first matching rule wins.
pub fn compare_project_files(
    old: &[MerginFile],
    new: &[MerginFile],
    local: &[MerginFile],
) -> ProjectDiff {
    let old_map = checksum_map(old);
    let new_map = checksum_map(new);
    let local_map = checksum_map(local);

    let mut paths: BTreeSet<&str> = BTreeSet::new();
    paths.extend(old_map.keys());
    paths.extend(new_map.keys());
    paths.extend(local_map.keys());

    let mut diff = ProjectDiff::default();

    for path in paths {
        let old = old_map.get(path).copied();
        let new = new_map.get(path).copied();
        let local = local_map.get(path).copied();
        let key = || path.to_string();

        match (old, new, local) {
            (None, None, None) => unreachable!("path comes from one of the three sets"),

            (None, Some(_), None) => {
                diff.remote_added.insert(key());
            }
            (None, None, Some(_)) => {
                diff.local_added.insert(key());
            }
            (None, Some(new), Some(local)) => {
                if new != local {
                    diff.conflict_remote_added_local_added.insert(key());
                }
            }

            // removed on both sides, nothing left to reconcile
            (Some(_), None, None) => {}

            (Some(old), Some(new), None) => {
                if new == old {
                    diff.local_deleted.insert(key());
                } else {
                    diff.conflict_remote_updated_local_deleted.insert(key());
                }
            }
            (Some(old), None, Some(local)) => {
                if local == old {
                    diff.remote_deleted.insert(key());
                } else {
                    diff.conflict_remote_deleted_local_updated.insert(key());
                }
            }

            (Some(old), Some(new), Some(local)) => {
                let remote_changed = new != old;
                let local_changed = local != old;
                match (remote_changed, local_changed) {
                    (false, false) => {}
                    (false, true) => {
                        diff.local_updated.insert(key());
                    }
                    (true, false) => {
                        diff.remote_updated.insert(key());
                    }
                    (true, true) => {
                        // the same edit applied on both sides is not a conflict
                        if new != local {
                            diff.conflict_remote_updated_local_updated.insert(key());
                        }
                    }
                }
            }
        }
    }

    diff
}
