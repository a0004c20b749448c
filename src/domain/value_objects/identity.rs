//! Caller identity as handed over by the upstream gateway

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl FromStr for Role {
    type Err = UnknownRole;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self { Self { user_id, role: Role::User } }
    pub fn admin(user_id: Uuid) -> Self { Self { user_id, role: Role::Admin } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}
