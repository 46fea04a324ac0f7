//! Google Workspace client
//!
//! Sign-in is plain Google OIDC. Group names come from the Admin Directory
//! API, which only answers for users allowed to read the directory; anyone
//! else simply gets no groups.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use trellis_core::{
    AuthServerInfo, IdentityProviderClient, Provider, ProviderTokens, RefreshedToken, Result,
    TokenBundle, TrellisError, UserInfoClaims,
};

use super::common::{status_error, HttpConfig, MAX_GROUP_PAGES};
use super::oidc::{OidcCore, UserInfoResponse};

const ACCOUNTS_URL: &str = "https://accounts.google.com";
const DIRECTORY_URL: &str = "https://admin.googleapis.com";

pub struct GoogleClient {
    core: OidcCore,
    directory_url: String,
}

impl GoogleClient {
    pub const SCOPES: [&'static str; 4] = [
        "openid",
        "email",
        "profile",
        "https://www.googleapis.com/auth/admin.directory.group.readonly",
    ];

    /// An empty `provider.url` means Google's public accounts issuer
    pub fn new(provider: &Provider, redirect_uri: &str, http: &HttpConfig) -> Result<Self> {
        let issuer = if provider.url.is_empty() {
            ACCOUNTS_URL
        } else {
            provider.url.as_str()
        };
        let scopes = Self::SCOPES.iter().map(|s| s.to_string()).collect();
        Ok(Self {
            core: OidcCore::new(provider, issuer, redirect_uri, scopes, http)?,
            directory_url: DIRECTORY_URL.to_string(),
        })
    }

    pub fn with_directory_url(mut self, directory_url: impl Into<String>) -> Self {
        self.directory_url = directory_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Names of the groups `email` belongs to. A 403 means the user may not
    /// read the directory and yields no groups.
    async fn member_groups(&self, tokens: &TokenBundle, email: &str) -> Result<Vec<String>> {
        let http = self.core.http();
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        for page_number in 1.. {
            if page_number > MAX_GROUP_PAGES {
                warn!(pages = MAX_GROUP_PAGES, "Directory group listing did not end");
                return Err(TrellisError::internal_error(format!(
                    "Directory group listing exceeded {} pages",
                    MAX_GROUP_PAGES
                )));
            }

            let mut url = format!(
                "{}/admin/directory/v1/groups?userKey={}&maxResults=200",
                self.directory_url,
                urlencoding::encode(email)
            );
            if let Some(pt) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(pt)));
            }

            let response = http
                .retry_transient(http.inner().get(&url).bearer_auth(&tokens.access_token))
                .await?;
            match response.status() {
                status if status.is_success() => {}
                StatusCode::FORBIDDEN => {
                    warn!("Directory API refused group lookup; continuing without groups");
                    return Ok(Vec::new());
                }
                _ => return Err(status_error(response).await),
            }

            let page: DirectoryGroupsPage = response.json().await.map_err(|e| {
                TrellisError::internal_error(format!("Failed to parse Admin SDK response: {}", e))
            })?;

            names.extend(page.groups.into_iter().filter_map(|g| g.name));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(count = names.len(), "Fetched directory group memberships");
        Ok(names)
    }
}

#[async_trait]
impl IdentityProviderClient for GoogleClient {
    async fn validate(&self) -> Result<()> {
        self.core.validate().await
    }

    async fn auth_server_info(&self) -> Result<AuthServerInfo> {
        self.core.auth_server_info().await
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        self.core.exchange_code(code).await
    }

    #[instrument(skip(self, tokens), fields(provider_id = %self.core.provider_id()))]
    async fn get_user_info(&self, tokens: &TokenBundle) -> Result<UserInfoClaims> {
        let info: UserInfoResponse = self.core.userinfo(tokens).await?;
        let email = info.email.unwrap_or_default();
        let groups = if email.is_empty() {
            Vec::new()
        } else {
            self.member_groups(tokens, &email).await?
        };
        Ok(UserInfoClaims { email, groups })
    }

    async fn refresh_access_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken> {
        self.core.refresh(tokens).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryGroupsPage {
    #[serde(default)]
    groups: Vec<DirectoryGroup>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryGroup {
    name: Option<String>,
}
