use serde::Serialize;
use thiserror::Error;

use tillwise_core::ClientError;

use crate::{Permission, PermissionSet};

/// What a screen, control, or operation requires.
///
/// An absent clause imposes no constraint; so does an empty `any_of` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRequirement {
    pub any_of: Option<Vec<Permission>>,
    pub all_of: Option<Vec<Permission>>,
}

impl PermissionRequirement {
    /// No requirement at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn any<I, P>(codes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self {
            any_of: Some(codes.into_iter().map(Into::into).collect()),
            all_of: None,
        }
    }

    pub fn all<I, P>(codes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        Self {
            any_of: None,
            all_of: Some(codes.into_iter().map(Into::into).collect()),
        }
    }

    /// Single-code requirement.
    pub fn one(code: impl Into<Permission>) -> Self {
        Self::all([code.into()])
    }

    pub fn and_any<I, P>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.any_of = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn and_all<I, P>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.all_of = Some(codes.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: none of [{0}] is held")]
    NoneOf(String),
}

impl From<AuthzError> for ClientError {
    fn from(value: AuthzError) -> Self {
        let missing = match value {
            AuthzError::Forbidden(code) => code,
            AuthzError::NoneOf(codes) => codes,
        };
        ClientError::Forbidden { missing }
    }
}

/// Pure permission check.
///
/// - `"all"` allows unconditionally
/// - every `all_of` code must be held
/// - at least one `any_of` code must be held
pub fn resolve(requirement: &PermissionRequirement, held: &PermissionSet) -> bool {
    authorize(held, requirement).is_ok()
}

/// `true` when every code is held (or the set holds `"all"`).
///
/// An empty code list is always satisfied.
pub fn has_permission<'a, I>(held: &PermissionSet, codes: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    if held.grants_all() {
        return true;
    }
    codes.into_iter().all(|code| held.contains(code))
}

/// Strict check used before every mutating operation.
///
/// - No IO
/// - No fallback policy: the held set is authoritative
pub fn authorize(held: &PermissionSet, requirement: &PermissionRequirement) -> Result<(), AuthzError> {
    if held.grants_all() {
        return Ok(());
    }

    if let Some(all_of) = &requirement.all_of {
        if let Some(missing) = all_of.iter().find(|p| !held.contains(p.as_str())) {
            return Err(AuthzError::Forbidden(missing.as_str().to_string()));
        }
    }

    if let Some(any_of) = &requirement.any_of {
        if !any_of.is_empty() && !any_of.iter().any(|p| held.contains(p.as_str())) {
            return Err(AuthzError::NoneOf(join_codes(any_of)));
        }
    }

    Ok(())
}

fn join_codes(codes: &[Permission]) -> String {
    codes.iter().map(Permission::as_str).collect::<Vec<_>>().join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigation visibility
// ─────────────────────────────────────────────────────────────────────────────

/// Whether the held permission set has arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionState {
    Loading,
    Loaded(PermissionSet),
}

impl PermissionState {
    pub fn held(&self) -> Option<&PermissionSet> {
        match self {
            PermissionState::Loading => None,
            PermissionState::Loaded(set) => Some(set),
        }
    }
}

/// How navigation treats an unknown or empty permission set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionFallbackPolicy {
    /// Show everything while permissions are loading or came back empty, so a
    /// slow permission fetch never traps the user.
    #[default]
    Permissive,
    /// Hide protected items until the held set proves access.
    Strict,
}

impl core::str::FromStr for PermissionFallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown permission fallback policy '{other}'")),
        }
    }
}

/// Navigation-only visibility check.
///
/// Never use this to gate a mutation; mutating operations call [`authorize`]
/// against the authoritative held set.
pub fn visible(
    requirement: &PermissionRequirement,
    state: &PermissionState,
    policy: PermissionFallbackPolicy,
) -> bool {
    match (state, policy) {
        (PermissionState::Loading, PermissionFallbackPolicy::Permissive) => true,
        (PermissionState::Loading, PermissionFallbackPolicy::Strict) => *requirement == PermissionRequirement::none(),
        (PermissionState::Loaded(held), PermissionFallbackPolicy::Permissive) if held.is_empty() => true,
        (PermissionState::Loaded(held), _) => resolve(requirement, held),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable account of a permission decision.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub granted: bool,
    pub reason: String,
    pub has_all: bool,
    pub missing_all_of: Vec<String>,
    pub unmet_any_of: Option<Vec<String>>,
}

/// Explain why [`authorize`] would allow or deny `requirement`.
pub fn explain(requirement: &PermissionRequirement, held: &PermissionSet) -> Explanation {
    if held.grants_all() {
        return Explanation {
            granted: true,
            reason: "session holds the 'all' permission".to_string(),
            has_all: true,
            missing_all_of: Vec::new(),
            unmet_any_of: None,
        };
    }

    let missing_all_of: Vec<String> = requirement
        .all_of
        .iter()
        .flatten()
        .filter(|p| !held.contains(p.as_str()))
        .map(|p| p.as_str().to_string())
        .collect();

    let unmet_any_of = requirement
        .any_of
        .as_ref()
        .filter(|any| !any.is_empty() && !any.iter().any(|p| held.contains(p.as_str())))
        .map(|any| any.iter().map(|p| p.as_str().to_string()).collect::<Vec<_>>());

    let granted = missing_all_of.is_empty() && unmet_any_of.is_none();
    let reason = if granted {
        "every required permission is held".to_string()
    } else if !missing_all_of.is_empty() {
        format!("missing required permissions: {}", missing_all_of.join(", "))
    } else {
        format!(
            "holds none of: {}",
            unmet_any_of.as_deref().unwrap_or_default().join(", ")
        )
    };

    Explanation {
        granted,
        reason,
        has_all: false,
        missing_all_of,
        unmet_any_of,
    }
}
