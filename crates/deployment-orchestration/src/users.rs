//! Operating system user lookup
//!
//! Applications run as an OS user named in their overrides, and
//! authorization rules match on the caller's groups. Both questions go
//! through a [`UserDirectory`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

/// Source of user accounts and group memberships
pub trait UserDirectory: Send + Sync {
    /// Whether the account exists
    fn user_exists(&self, user: &str) -> bool;

    /// Groups the user belongs to, `None` when the user is unknown
    fn groups(&self, user: &str) -> Option<Vec<String>>;
}

/// Reads accounts from `/etc/passwd` and `/etc/group`
#[derive(Debug, Clone)]
pub struct SystemUserDirectory {
    passwd: PathBuf,
    group: PathBuf,
}

impl Default for SystemUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

struct Account {
    name: String,
    gid: String,
}

struct Group {
    name: String,
    gid: String,
    members: Vec<String>,
}

impl SystemUserDirectory {
    /// Directory backed by the host's account databases
    pub fn new() -> Self {
        Self::with_files("/etc/passwd", "/etc/group")
    }

    /// Directory backed by files in `passwd(5)` and `group(5)` format
    pub fn with_files(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            group: group.into(),
        }
    }

    fn account(&self, user: &str) -> Option<Account> {
        let contents = std::fs::read_to_string(&self.passwd).ok()?;
        contents
            .lines()
            .filter(|line| !line.starts_with('#'))
            .map(|line| line.split(':').collect::<Vec<_>>())
            .find(|fields| fields.len() >= 4 && fields[0] == user)
            .map(|fields| Account {
                name: fields[0].to_string(),
                gid: fields[3].to_string(),
            })
    }

    fn all_groups(&self) -> Vec<Group> {
        let Ok(contents) = std::fs::read_to_string(&self.group) else {
            debug!("Unable to read group file {:?}", self.group);
            return Vec::new();
        };
        contents
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| {
                let fields: Vec<_> = line.split(':').collect();
                if fields.len() < 4 {
                    return None;
                }
                Some(Group {
                    name: fields[0].to_string(),
                    gid: fields[2].to_string(),
                    members: fields[3]
                        .split(',')
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect(),
                })
            })
            .collect()
    }
}

impl UserDirectory for SystemUserDirectory {
    fn user_exists(&self, user: &str) -> bool {
        self.account(user).is_some()
    }

    fn groups(&self, user: &str) -> Option<Vec<String>> {
        let account = self.account(user)?;
        let mut groups = BTreeSet::new();
        for group in self.all_groups() {
            if group.gid == account.gid || group.members.iter().any(|m| *m == account.name) {
                groups.insert(group.name);
            }
        }
        Some(groups.into_iter().collect())
    }
}

/// Fixed set of users, for tests and single-user setups
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: BTreeMap<String, Vec<String>>,
}

impl StaticUserDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with the given groups
    pub fn with_user(mut self, user: &str, groups: &[&str]) -> Self {
        self.users.insert(
            user.to_string(),
            groups.iter().map(|g| g.to_string()).collect(),
        );
        self
    }
}

impl UserDirectory for StaticUserDirectory {
    fn user_exists(&self, user: &str) -> bool {
        self.users.contains_key(user)
    }

    fn groups(&self, user: &str) -> Option<Vec<String>> {
        self.users.get(user).cloned()
    }
}
