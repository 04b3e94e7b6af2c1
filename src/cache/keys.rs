//! Cache key definitions.
//!
//! `PostListKey` identifies one page of the global hot listing. Its textual
//! form is `offset:limit`.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;

const PARAM_SEPARATOR: char = ':';

/// One page of the global hot post listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostListKey {
    pub offset: u32,
    pub limit: u32,
}

impl PostListKey {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }
}

impl fmt::Display for PostListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PARAM_SEPARATOR}{}", self.offset, self.limit)
    }
}

impl FromStr for PostListKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(DomainError::validation("post list key must not be empty"));
        }

        let mut params = value.split(PARAM_SEPARATOR);
        let (Some(offset), Some(limit), None) = (params.next(), params.next(), params.next())
        else {
            return Err(DomainError::validation(format!(
                "post list key `{value}` must have the form offset:limit"
            )));
        };

        let offset = offset.parse::<u32>().map_err(|err| {
            DomainError::validation(format!("invalid offset in post list key `{value}`: {err}"))
        })?;
        let limit = limit.parse::<u32>().map_err(|err| {
            DomainError::validation(format!("invalid limit in post list key `{value}`: {err}"))
        })?;

        Ok(Self { offset, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_offset_colon_limit() {
        assert_eq!(PostListKey::new(20, 10).to_string(), "20:10");
    }

    #[test]
    fn parses_well_formed_keys() {
        assert_eq!("0:10".parse::<PostListKey>(), Ok(PostListKey::new(0, 10)));
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["", "10", "1:2:3", "a:10", "10:b", ":", "-1:10"] {
            let err = raw.parse::<PostListKey>().expect_err(raw);
            assert!(matches!(err, DomainError::Validation { .. }), "{raw}");
        }
    }
}
