//! Authorization of lifecycle requests
//!
//! Every exposed operation names a [`Resource`] and an [`Action`]; the pair
//! forms a qualified action such as `deployment_manager:package:deploy`. An
//! [`Authorizer`] decides whether an [`Identity`] may perform it on a
//! resource with a given owner.

use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Protected resource categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Platform environment descriptor
    Environment,
    /// A single package
    Package,
    /// The set of packages
    Packages,
    /// A single application
    Application,
    /// The set of applications
    Applications,
    /// The package repository
    Repository,
}

impl Resource {
    /// Qualified resource name
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Environment => "deployment_manager:environment",
            Resource::Package => "deployment_manager:package",
            Resource::Packages => "deployment_manager:packages",
            Resource::Application => "deployment_manager:application",
            Resource::Applications => "deployment_manager:applications",
            Resource::Repository => "deployment_manager:repository",
        }
    }
}

/// Operations on resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Deploy a package
    Deploy,
    /// Undeploy a package
    Undeploy,
    /// Create an application
    Create,
    /// Start an application
    Start,
    /// Stop an application
    Stop,
    /// Destroy an application
    Destroy,
    /// Read anything
    Read,
}

impl Action {
    /// Action name
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Undeploy => "undeploy",
            Action::Create => "create",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Destroy => "destroy",
            Action::Read => "read",
        }
    }

    /// `<resource>:<action>`
    pub fn qualified(&self, resource: Resource) -> String {
        format!("{}:{}", resource.as_str(), self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// User name
    pub user: String,
    /// Group names
    pub groups: Vec<String>,
}

/// Decides whether an identity may act on a resource
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether `identity` may perform `action` on `resource` owned by `owner`
    async fn authorize(
        &self,
        identity: &Identity,
        resource: Resource,
        owner: Option<&str>,
        action: Action,
    ) -> Result<bool>;
}

/// Grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(
        &self,
        _identity: &Identity,
        _resource: Resource,
        _owner: Option<&str>,
        _action: Action,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// One grant rule
///
/// Empty lists match anything. Action patterns use `*` as a wildcard over
/// qualified action names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantRule {
    /// Users the rule applies to
    #[serde(default)]
    pub users: Vec<String>,

    /// Groups the rule applies to; membership in any one is enough
    #[serde(default)]
    pub groups: Vec<String>,

    /// Qualified action patterns
    #[serde(default)]
    pub actions: Vec<String>,

    /// Only grant when the caller owns the resource
    #[serde(default)]
    pub owner_only: bool,
}

struct CompiledRule {
    rule: GrantRule,
    actions: Vec<Regex>,
}

/// Evaluates locally configured grant rules
pub struct LocalAuthorizer {
    rules: Vec<CompiledRule>,
}

impl LocalAuthorizer {
    /// Compile grant rules
    pub fn new(rules: Vec<GrantRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let actions = rule
                    .actions
                    .iter()
                    .map(|pattern| wildcard(pattern))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledRule { rule, actions })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Rules used when none are configured
    ///
    /// Anyone may read; owners may manage what they own; members of
    /// `hdfs` or `admin` may do anything.
    pub fn default_rules() -> Vec<GrantRule> {
        vec![
            GrantRule {
                actions: vec!["*:read".to_string()],
                ..Default::default()
            },
            GrantRule {
                actions: vec![
                    "deployment_manager:package:deploy".to_string(),
                    "deployment_manager:application:create".to_string(),
                ],
                ..Default::default()
            },
            GrantRule {
                actions: vec!["*".to_string()],
                owner_only: true,
                ..Default::default()
            },
            GrantRule {
                groups: vec!["hdfs".to_string(), "admin".to_string()],
                actions: vec!["*".to_string()],
                ..Default::default()
            },
        ]
    }
}

fn wildcard(pattern: &str) -> Result<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{}$", escaped))
        .map_err(|e| crate::Error::Config(format!("invalid action pattern '{}': {}", pattern, e)))
}

impl CompiledRule {
    fn grants(&self, identity: &Identity, owner: Option<&str>, action: &str) -> bool {
        let user_ok = self.rule.users.is_empty()
            || self.rule.users.iter().any(|u| u == "*" || *u == identity.user);
        let group_ok = self.rule.groups.is_empty()
            || self.rule.groups.iter().any(|g| identity.groups.contains(g));
        let action_ok =
            self.actions.is_empty() || self.actions.iter().any(|pattern| pattern.is_match(action));
        let owner_ok = !self.rule.owner_only || owner == Some(identity.user.as_str());

        user_ok && group_ok && action_ok && owner_ok
    }
}

#[async_trait]
impl Authorizer for LocalAuthorizer {
    async fn authorize(
        &self,
        identity: &Identity,
        resource: Resource,
        owner: Option<&str>,
        action: Action,
    ) -> Result<bool> {
        let qualified = action.qualified(resource);
        let granted = self
            .rules
            .iter()
            .position(|rule| rule.grants(identity, owner, &qualified));

        match granted {
            Some(index) => debug!(
                "authorize: {} may {} (rule {})",
                identity.user, qualified, index
            ),
            None => debug!("authorize: {} may not {}", identity.user, qualified),
        }
        Ok(granted.is_some())
    }
}
