//! Roleguard - role-based access control
//!
//! A closed statement of resources and actions, flat role tables built per
//! principal, a resolver that ANDs across requested pairs and ORs across
//! held roles, and two enforcement points on top of it: a server-side
//! [`Guard`] that redirects on denial and a render-side [`PermissionGate`].

pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod identity;
pub mod ownership;
pub mod principal;
pub mod resolver;
pub mod role;
pub mod statement;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

pub use config::Config;
pub use error::{Result, RoleguardError};
pub use gate::{GateMode, GateState, PermissionContext, PermissionGate, Rendered, ACCESS_DENIED_NOTICE};
pub use guard::{Denial, Guard, RedirectPaths};
pub use identity::{IdentityProvider, StaticIdentity};
pub use principal::Principal;
pub use resolver::{Permissions, Requirement, Resolver, UnknownRolePolicy};
pub use role::{build_role, Record, RoleGrant, RoleName};
pub use statement::{is_valid_pair, Resource};
pub use store::{SessionInfo, Store};
