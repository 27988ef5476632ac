//! Authorization core: the permission vocabulary, the route-to-module
//! mapper, the permission directory and its two backings, and the decision
//! procedure that combines them.

mod directory;
mod gate;
mod local;
mod remote;

pub use directory::PermissionDirectory;
pub use gate::{authorize, Authorized, Identified};
pub use local::LocalDirectory;
pub use remote::RemoteDirectory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::role::Role;
use crate::models::user::{User, UserStatus};

/// Module codes recognized by the permission model.
pub mod modules {
    /// Every Banner data route is gated by this single module.
    pub const INTEGRATIONS: &str = "integrations";
    /// Identity and role administration routes.
    pub const USERS_ROLES: &str = "users-roles";
}

/// Access level a role holds on a module. WRITE implies READ; a missing
/// entry means no access at all.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum PermissionLevel {
    #[serde(rename = "READ")]
    Read,
    #[serde(rename = "WRITE")]
    Write,
}

impl PermissionLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "READ" => Some(PermissionLevel::Read),
            "WRITE" => Some(PermissionLevel::Write),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "READ",
            PermissionLevel::Write => "WRITE",
        }
    }
}

/// The computed join of a user, its role, and the role's per-module grants.
/// Built fresh on every directory lookup; the unit of authorization
/// decisions. Serialized camelCase for the dashboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissionRecord {
    pub user: User,
    pub role: Option<Role>,
    #[schema(value_type = Object)]
    pub permissions: BTreeMap<String, PermissionLevel>,
    pub status: UserStatus,
}

impl UserPermissionRecord {
    pub fn level_for(&self, module_code: &str) -> Option<PermissionLevel> {
        self.permissions.get(module_code).copied()
    }
}

/// Leading route segments that resolve to a module. Everything not listed
/// falls back to `integrations`, preserving the observed surface where every
/// non-admin route is Banner data.
const ROUTE_MODULES: &[(&str, &str)] = &[
    ("auth", modules::USERS_ROLES),
    ("banner", modules::INTEGRATIONS),
    ("academic-period", modules::INTEGRATIONS),
    ("academic-level", modules::INTEGRATIONS),
    ("program-rule", modules::INTEGRATIONS),
    ("building", modules::INTEGRATIONS),
    ("person", modules::INTEGRATIONS),
    ("instructor", modules::INTEGRATIONS),
];

/// Maps a request path to the module gating it.
///
/// A prefix table rather than the historical "contains `auth/`" substring
/// check, which could misfire on a resource whose name embeds that text.
/// `None` would mean an unprotected route; no table entry produces it today,
/// but the decision procedure honors it.
pub fn module_for_path(path: &str) -> Option<&'static str> {
    let first_segment = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    for (prefix, module) in ROUTE_MODULES {
        if first_segment == *prefix {
            return Some(module);
        }
    }

    Some(modules::INTEGRATIONS)
}
