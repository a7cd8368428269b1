//! Static registry secrets and the short-lived query tokens derived from them

use std::fmt;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::config::TOKEN_EXPIRY_MARGIN_SECS;
use crate::version::template::eval_env_vars;

/// A derived bearer token and the instant it stops being usable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryToken {
    pub token: String,
    pub valid_until: Option<DateTime<Utc>>,
}

impl QueryToken {
    pub fn new(token: impl Into<String>, valid_until: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            valid_until: Some(valid_until),
        }
    }

    /// Non-empty and valid for at least the expiry margin past `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        self.valid_until
            .is_some_and(|until| until > now + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS))
    }
}

/// One layer of registry credentials.
///
/// `token` and `username` come from configuration and never change. The
/// derived query token is updated in place behind its own lock.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct RegistryCredential {
    pub token: Option<String>,
    pub username: Option<String>,
    #[serde(skip)]
    query: RwLock<QueryToken>,
}

impl RegistryCredential {
    pub fn new(token: Option<&str>, username: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string),
            username: username.map(str::to_string),
            query: RwLock::default(),
        }
    }

    /// Static secret with `${ENV}` references expanded, if any is set
    pub fn secret(&self) -> Option<String> {
        self.token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| eval_env_vars(token).into_owned())
            .filter(|token| !token.is_empty())
    }

    /// Copy of the current query token
    pub fn query_token(&self) -> QueryToken {
        self.query
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The cached query token, if it is still usable at `now`
    pub fn valid_query_token(&self, now: DateTime<Utc>) -> Option<String> {
        let query = self.query.read().unwrap_or_else(PoisonError::into_inner);
        query.is_valid_at(now).then(|| query.token.clone())
    }

    /// Replace the query token
    pub fn set_query_token(&self, token: QueryToken) {
        *self.query.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

impl Clone for RegistryCredential {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            username: self.username.clone(),
            query: RwLock::new(self.query_token()),
        }
    }
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
