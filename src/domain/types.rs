//! Shared domain enumerations aligned with persisted column values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Which author a post query is restricted to.
///
/// Persisted and transported as a user id where `0` means "every author".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum UserScope {
    Global,
    User(i64),
}

impl UserScope {
    pub fn is_global(self) -> bool {
        matches!(self, UserScope::Global)
    }

    pub fn user_id(self) -> Option<i64> {
        match self {
            UserScope::Global => None,
            UserScope::User(id) => Some(id),
        }
    }
}

impl From<i64> for UserScope {
    fn from(value: i64) -> Self {
        if value == 0 {
            UserScope::Global
        } else {
            UserScope::User(value)
        }
    }
}

impl From<UserScope> for i64 {
    fn from(scope: UserScope) -> Self {
        scope.user_id().unwrap_or(0)
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserScope::Global => f.write_str("global"),
            UserScope::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Ordering applied to post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// Pinned first, then newest.
    Latest,
    /// Pinned first, then by score, then newest.
    Hot,
}

impl OrderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderMode::Latest => "latest",
            OrderMode::Hot => "hot",
        }
    }
}

impl FromStr for OrderMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "latest" | "0" => Ok(OrderMode::Latest),
            "hot" | "1" => Ok(OrderMode::Hot),
            other => Err(DomainError::validation(format!(
                "unknown order mode `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum PostType {
    Normal = 0,
    Pinned = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum PostStatus {
    Normal = 0,
    Featured = 1,
    Blocked = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_user_id_means_global_scope() {
        assert_eq!(UserScope::from(0), UserScope::Global);
        assert_eq!(UserScope::from(42), UserScope::User(42));
        assert_eq!(i64::from(UserScope::Global), 0);
        assert_eq!(i64::from(UserScope::User(42)), 42);
    }

    #[test]
    fn scope_serializes_as_user_id() {
        let json = serde_json::to_string(&UserScope::User(7)).expect("serialize scope");
        assert_eq!(json, "7");
        let parsed: UserScope = serde_json::from_str("0").expect("deserialize scope");
        assert!(parsed.is_global());
    }

    #[test]
    fn order_mode_accepts_names_and_legacy_codes() {
        assert_eq!("hot".parse::<OrderMode>(), Ok(OrderMode::Hot));
        assert_eq!("1".parse::<OrderMode>(), Ok(OrderMode::Hot));
        assert_eq!("latest".parse::<OrderMode>(), Ok(OrderMode::Latest));
        assert!("trending".parse::<OrderMode>().is_err());
    }
}
