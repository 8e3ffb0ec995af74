//! Authenticated user value consumed from the transport

use crate::UserId;
use serde::{Deserialize, Serialize};

/// Role of an authenticated user within the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    GameMaster,
    Player,
    Viewer,
}

/// AuthenticatedUser - identity handed in by the transport layer.
///
/// The core never parses tokens; it only consumes this value and asks the
/// campaign membership collaborator for edit access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
}
