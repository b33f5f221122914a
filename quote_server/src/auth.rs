//! Caller token checks for the HTTP boundary.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::TokenConfig;
use crate::model::clock::Clock;

/// Why a token was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Unknown or empty token.
    #[error("invalid token")]
    Invalid,
    /// Known token that has been switched off.
    #[error("token is inactive")]
    Inactive,
    /// Known token past its expiry.
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

/// Decides whether a caller token may read or control the service.
pub trait TokenValidator: Send + Sync {
    /// `Ok(())` when the token is accepted.
    fn validate(&self, token: &str) -> Result<(), AccessError>;
}

#[derive(Debug, Clone)]
struct Grant {
    active: bool,
    expires_at: Option<DateTime<Utc>>,
}

/// Fixed token list loaded from configuration.
pub struct StaticTokens {
    grants: HashMap<String, Grant>,
    clock: Arc<dyn Clock>,
}

impl StaticTokens {
    /// Build from `[[auth.tokens]]` entries; later duplicates win.
    pub fn new(tokens: &[TokenConfig], clock: Arc<dyn Clock>) -> Self {
        let grants = tokens
            .iter()
            .map(|t| {
                (
                    t.token.clone(),
                    Grant {
                        active: t.active,
                        expires_at: t.expires_at,
                    },
                )
            })
            .collect();
        Self { grants, clock }
    }

    /// Number of configured tokens.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// No tokens configured: every request is refused.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl TokenValidator for StaticTokens {
    fn validate(&self, token: &str) -> Result<(), AccessError> {
        let grant = self.grants.get(token).ok_or(AccessError::Invalid)?;
        if !grant.active {
            return Err(AccessError::Inactive);
        }
        match grant.expires_at {
            Some(expiry) if expiry <= self.clock.now() => Err(AccessError::Expired(expiry)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clock::ManualClock;
    use chrono::{TimeDelta, TimeZone};

    fn token(token: &str, active: bool, expires_at: Option<DateTime<Utc>>) -> TokenConfig {
        TokenConfig {
            token: token.to_string(),
            active,
            expires_at,
        }
    }

    #[test]
    fn classifies_tokens() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let tokens = StaticTokens::new(
            &[
                token("good", true, None),
                token("off", false, None),
                token("soon", true, Some(now + TimeDelta::hours(1))),
            ],
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens.validate("good"), Ok(()));
        assert_eq!(tokens.validate("off"), Err(AccessError::Inactive));
        assert_eq!(tokens.validate("nope"), Err(AccessError::Invalid));
        assert_eq!(tokens.validate(""), Err(AccessError::Invalid));
        assert_eq!(tokens.validate("soon"), Ok(()));

        clock.advance(TimeDelta::hours(1));
        assert!(matches!(tokens.validate("soon"), Err(AccessError::Expired(_))));
    }
}
