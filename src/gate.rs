//! Render-side gates
//!
//! A [`PermissionContext`] holds the grants of the principal a render tree
//! is being built for. Gates consult it synchronously once it is ready.
//! Gates only hide affordances; every mutation is re-checked by a [`Guard`].

use crate::guard::Guard;
use crate::principal::Principal;
use crate::resolver::{any_granted, Permissions, Requirement, Resolver};
use crate::role::{Record, RoleGrant};
use crate::statement::{parse_pair, Resource, CREATE, DELETE};

/// Generic notice shown by gates configured to announce a denial
pub const ACCESS_DENIED_NOTICE: &str = "Access Denied";

// ============================================================================
// Context
// ============================================================================

/// Permission state for one render tree
#[derive(Debug, Clone, Default)]
pub enum PermissionContext {
    /// Principal not resolved yet
    #[default]
    Pending,
    /// Principal resolved (`None` when unauthenticated)
    Ready { principal: Option<Principal>, grants: Vec<RoleGrant> },
}

impl PermissionContext {
    pub fn pending() -> Self {
        PermissionContext::Pending
    }

    /// Build the ready state for a principal
    pub fn resolve(resolver: &Resolver, principal: Option<&Principal>) -> Self {
        PermissionContext::Ready {
            grants: principal.map(|p| resolver.grants_for(p)).unwrap_or_default(),
            principal: principal.cloned(),
        }
    }

    /// Resolve the session's principal through a guard
    pub async fn load(guard: &Guard, token: Option<&str>) -> Self {
        let principal = guard.principal(token).await;
        PermissionContext::resolve(guard.resolver(), principal.as_ref())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PermissionContext::Ready { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            PermissionContext::Ready { principal, .. } => principal.as_ref(),
            PermissionContext::Pending => None,
        }
    }

    /// Whether the principal may perform `action` on `resource`.
    ///
    /// `false` while pending, when unauthenticated, or for an undeclared pair.
    pub fn can(&self, resource: &str, action: &str, data: Option<&Record>) -> bool {
        let Ok((resource, action)) = parse_pair(resource, action) else { return false };
        self.can_typed(resource, action, data)
    }

    pub fn cannot(&self, resource: &str, action: &str, data: Option<&Record>) -> bool {
        !self.can(resource, action, data)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.principal().is_some_and(|p| p.has_role(role))
    }

    fn can_typed(&self, resource: Resource, action: u64, data: Option<&Record>) -> bool {
        match self {
            PermissionContext::Ready { grants, .. } => any_granted(grants, resource, action, data),
            PermissionContext::Pending => false,
        }
    }
}

// ============================================================================
// Gates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateMode {
    Any,
    #[default]
    All,
}

/// What a gate decided to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<T> {
    Loading(Option<T>),
    Content(T),
    Fallback(T),
    AccessDenied(&'static str),
    Nothing,
}

/// Conditional render over a list of requirements
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    requirements: Vec<Requirement>,
    mode: GateMode,
    show_denied: bool,
    misconfigured: bool,
}

impl PermissionGate {
    /// Gate on a single pair; an undeclared pair never opens
    pub fn new(resource: &str, action: &str) -> Self {
        match Requirement::parse(resource, action) {
            Ok(req) => PermissionGate { requirements: vec![req], ..Default::default() },
            Err(e) => {
                tracing::error!(error = %e, "gate references undeclared permission");
                PermissionGate { misconfigured: true, ..Default::default() }
            }
        }
    }

    /// Gate on a permissions map, all pairs required
    pub fn from_permissions(permissions: &Permissions) -> Self {
        match Requirement::from_permissions(permissions) {
            Ok(requirements) => PermissionGate { requirements, ..Default::default() },
            Err(e) => {
                tracing::error!(error = %e, "gate references undeclared permission");
                PermissionGate { misconfigured: true, ..Default::default() }
            }
        }
    }

    pub fn from_requirements(requirements: Vec<Requirement>, mode: GateMode) -> Self {
        PermissionGate { requirements, mode, ..Default::default() }
    }

    /// Visible to holders of `user.create` or `user.delete`
    pub fn admin_only() -> Self {
        PermissionGate::from_requirements(
            vec![
                Requirement { resource: Resource::User, action: CREATE, data: None },
                Requirement { resource: Resource::User, action: DELETE, data: None },
            ],
            GateMode::Any,
        )
    }

    /// Attach record context to every requirement
    pub fn with_data(mut self, data: Record) -> Self {
        for req in &mut self.requirements {
            req.data = Some(data.clone());
        }
        self
    }

    pub fn any(mut self) -> Self {
        self.mode = GateMode::Any;
        self
    }

    /// Render the access-denied notice instead of nothing when no fallback is given
    pub fn show_denied(mut self) -> Self {
        self.show_denied = true;
        self
    }

    pub fn state(&self, ctx: &PermissionContext) -> GateState {
        if !ctx.is_ready() {
            return GateState::Pending;
        }
        if self.misconfigured {
            return GateState::Denied;
        }
        let held = |r: &Requirement| ctx.can_typed(r.resource, r.action, r.data.as_ref());
        let allowed = match self.mode {
            GateMode::All => self.requirements.iter().all(held),
            GateMode::Any => self.requirements.iter().any(held),
        };
        if allowed {
            GateState::Allowed
        } else {
            GateState::Denied
        }
    }

    pub fn render<T>(
        &self,
        ctx: &PermissionContext,
        content: T,
        fallback: Option<T>,
        loading: Option<T>,
    ) -> Rendered<T> {
        match self.state(ctx) {
            GateState::Pending => Rendered::Loading(loading),
            GateState::Allowed => Rendered::Content(content),
            GateState::Denied => match fallback {
                Some(f) => Rendered::Fallback(f),
                None if self.show_denied => Rendered::AccessDenied(ACCESS_DENIED_NOTICE),
                None => Rendered::Nothing,
            },
        }
    }
}
