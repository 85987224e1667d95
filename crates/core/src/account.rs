//! Linked-account credential port.
//!
//! A linked account is the user-supplied credential bundle for one provider
//! (OAuth token, API key, shop domain, ...). The account store itself lives
//! outside this system; the platform only consumes it through
//! [`LinkedAccountStore`]. Connectors receive the resolved [`LinkedAccount`]
//! at call time, never at construction, so a token refreshed between calls is
//! picked up without rebuilding anything.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Id;

/// Provider credentials attached to a linked account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Credentials {
    /// OAuth2 bearer credentials.
    Oauth2 { access_token: String },
    /// Static API key credentials.
    ApiKey { key: String },
}

/// A resolved linked account for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub id: Id,
    /// Upper-cased app name this account belongs to (e.g. `"SHOPIFY"`).
    pub app_name: String,
    pub credentials: Credentials,
    /// Provider-specific extras captured at link time (e.g. `shop_domain`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl LinkedAccount {
    /// The OAuth2 access token, or a credentials error if this account uses
    /// a different scheme.
    pub fn oauth_token(&self) -> Result<&str, CoreError> {
        match &self.credentials {
            Credentials::Oauth2 { access_token } => Ok(access_token),
            Credentials::ApiKey { .. } => Err(CoreError::Credentials(
                "linked account does not carry OAuth2 credentials".into(),
            )),
        }
    }

    /// The API key, or a credentials error if this account uses a different
    /// scheme.
    pub fn api_key(&self) -> Result<&str, CoreError> {
        match &self.credentials {
            Credentials::ApiKey { key } => Ok(key),
            Credentials::Oauth2 { .. } => Err(CoreError::Credentials(
                "linked account does not carry API key credentials".into(),
            )),
        }
    }

    /// Look up a metadata value (e.g. the Shopify shop domain).
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Port to the external linked-account store.
#[async_trait]
pub trait LinkedAccountStore: Send + Sync {
    /// Resolve a linked account by id. Credentials are expected to be current
    /// (the store is responsible for token refresh).
    async fn get(&self, id: Id) -> Result<LinkedAccount, CoreError>;
}
