// Permission Evaluator - Per-action access decisions for entities and attributes
// Rules are declared in entity JSON and evaluated against the caller identity

use serde::{Deserialize, Serialize};

/// Actions that can be controlled by permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Get,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Closed permission vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Anyone,
    User,
    Own,
    Admin,
    System,
    Nobody,
}

/// A single permission or a list where any entry may grant access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRule {
    One(PermissionKind),
    Many(Vec<PermissionKind>),
}

impl PermissionRule {
    pub fn kinds(&self) -> &[PermissionKind] {
        match self {
            PermissionRule::One(kind) => std::slice::from_ref(kind),
            PermissionRule::Many(kinds) => kinds,
        }
    }
}

impl From<PermissionKind> for PermissionRule {
    fn from(kind: PermissionKind) -> Self {
        PermissionRule::One(kind)
    }
}

/// Permission specification, one optional rule per action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<PermissionRule>,
}

impl Permissions {
    pub fn rule(&self, action: Action) -> Option<&PermissionRule> {
        match action {
            Action::Get => self.get.as_ref(),
            Action::Create => self.create.as_ref(),
            Action::Update => self.update.as_ref(),
            Action::Delete => self.delete.as_ref(),
        }
    }

    /// Same rule for every action
    pub fn all(rule: impl Into<PermissionRule>) -> Self {
        let rule = rule.into();
        Self {
            get: Some(rule.clone()),
            create: Some(rule.clone()),
            update: Some(rule.clone()),
            delete: Some(rule),
        }
    }
}

/// Decide whether `action` is allowed. A missing rule denies.
pub fn allowed(permissions: Option<&Permissions>, action: Action, identity: Option<&str>) -> bool {
    permissions
        .and_then(|p| p.rule(action))
        .map(|rule| rule.kinds().iter().any(|kind| kind_allows(*kind, identity)))
        .unwrap_or(false)
}

// own, admin, system and nobody have no evaluation path and deny.
fn kind_allows(kind: PermissionKind, identity: Option<&str>) -> bool {
    match kind {
        PermissionKind::Anyone => true,
        PermissionKind::User => identity.is_some(),
        PermissionKind::Own
        | PermissionKind::Admin
        | PermissionKind::System
        | PermissionKind::Nobody => false,
    }
}
