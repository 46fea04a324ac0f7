//! Microsoft Entra ID (Azure AD) client
//!
//! Sign-in goes through the tenant's v2.0 OIDC endpoints. Group names are
//! read from Microsoft Graph with the user's own access token, so the app
//! registration needs the delegated `GroupMember.Read.All` permission.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use trellis_core::{
    AuthServerInfo, IdentityProviderClient, Provider, ProviderTokens, RefreshedToken, Result,
    TokenBundle, TrellisError, UserInfoClaims,
};

use super::common::{HttpConfig, MAX_GROUP_PAGES};
use super::oidc::{OidcCore, UserInfoResponse};

const GRAPH_URL: &str = "https://graph.microsoft.com";
const LOGIN_URL: &str = "https://login.microsoftonline.com";

pub struct AzureClient {
    core: OidcCore,
    graph_url: String,
}

impl AzureClient {
    pub const SCOPES: [&'static str; 5] = [
        "openid",
        "email",
        "profile",
        "offline_access",
        "https://graph.microsoft.com/GroupMember.Read.All",
    ];

    /// `provider.url` is either a tenant id/domain or a full authority URL
    pub fn new(provider: &Provider, redirect_uri: &str, http: &HttpConfig) -> Result<Self> {
        let scopes = Self::SCOPES.iter().map(|s| s.to_string()).collect();
        Ok(Self {
            core: OidcCore::new(provider, issuer(&provider.url), redirect_uri, scopes, http)?,
            graph_url: GRAPH_URL.to_string(),
        })
    }

    /// Point Graph calls somewhere else (national clouds, tests)
    pub fn with_graph_url(mut self, graph_url: impl Into<String>) -> Self {
        self.graph_url = graph_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Display names of every group the signed-in user is a direct member of.
    /// Paging links must stay on the Graph host, since each one is sent the
    /// user's token.
    async fn member_groups(&self, tokens: &TokenBundle) -> Result<Vec<String>> {
        let http = self.core.http();
        let graph_prefix = format!("{}/", self.graph_url);
        let mut url = format!(
            "{}/v1.0/me/memberOf/microsoft.graph.group?$select=displayName",
            self.graph_url
        );
        let mut names = Vec::new();

        for page_number in 1.. {
            if page_number > MAX_GROUP_PAGES {
                warn!(pages = MAX_GROUP_PAGES, "Graph group listing did not end");
                return Err(TrellisError::internal_error(format!(
                    "Graph group listing exceeded {} pages",
                    MAX_GROUP_PAGES
                )));
            }

            let response = http
                .execute_with_retry(http.inner().get(&url).bearer_auth(&tokens.access_token))
                .await?;

            let page: GraphListResponse<GraphGroup> = response.json().await.map_err(|e| {
                TrellisError::internal_error(format!("Failed to parse Graph response: {}", e))
            })?;

            names.extend(page.value.into_iter().filter_map(|g| g.display_name));

            match page.next_link {
                Some(next) if next.starts_with(&graph_prefix) => url = next,
                Some(_) => {
                    warn!("Graph paging link points off the Graph host");
                    return Err(TrellisError::internal_error(
                        "Graph paging link points off the Graph host",
                    ));
                }
                None => break,
            }
        }

        debug!(count = names.len(), "Fetched Graph group memberships");
        Ok(names)
    }
}

fn issuer(url: &str) -> String {
    if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("{}/{}/v2.0", LOGIN_URL, url)
    }
}

#[async_trait]
impl IdentityProviderClient for AzureClient {
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
        let groups = self.member_groups(tokens).await?;
        Ok(UserInfoClaims {
            email: info.email.unwrap_or_default(),
            groups,
        })
    }

    async fn refresh_access_token(&self, tokens: &TokenBundle) -> Result<RefreshedToken> {
        self.core.refresh(tokens).await
    }
}

#[derive(Debug, Deserialize)]
struct GraphListResponse<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphGroup {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_from_tenant() {
        assert_eq!(
            issuer("contoso.onmicrosoft.com"),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/v2.0"
        );
        assert_eq!(
            issuer("https://login.microsoftonline.us/tenant/v2.0"),
            "https://login.microsoftonline.us/tenant/v2.0"
        );
    }

    #[test]
    fn test_graph_page_parsing() {
        let page: GraphListResponse<GraphGroup> = serde_json::from_str(
            r#"{
                "value": [{"displayName": "Engineering"}, {"id": "x"}],
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
            }"#,
        )
        .unwrap();
        assert_eq!(page.value.len(), 2);
        assert_eq!(page.value[0].display_name.as_deref(), Some("Engineering"));
        assert!(page.value[1].display_name.is_none());
        assert!(page.next_link.is_some());
    }
}
