//! Keycloak admin REST client implementation

use crate::backoff::BackoffPolicy;
use crate::models::{KeycloakGroup, KeycloakUser};
use crate::pagination::Pager;
use crate::token::{CachedToken, TokenResponse};
use log::{debug, info, warn};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use sync_common::{IdentityProvider, IdpGroup, IdpUser, SyncError, SyncResult};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Default User-Agent when none is provided
const DEFAULT_USER_AGENT: &str = "roster-sync";

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the response-body hint carried in remote errors
const BODY_HINT_LIMIT: usize = 200;

/// Keycloak admin API client.
///
/// Authenticates with the realm's OAuth2 client-credentials grant and caches
/// the access token until shortly before expiry. On `401 Unauthorized` the
/// token is invalidated and the request retried exactly once; a second 401
/// surfaces as an authentication error. Rate-limited requests wait out
/// `429`s against a per-request budget (see [`BackoffPolicy`]).
#[derive(Debug)]
pub struct KeycloakAdminClient {
    base_url: String,
    realm: String,
    client_id: String,
    client_secret: String,
    http_client: Client,
    token: Mutex<Option<CachedToken>>,
    backoff: BackoffPolicy,
}

impl KeycloakAdminClient {
    /// Create a new admin client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The Keycloak base URL (e.g. `https://idp.example.org`)
    /// * `realm` - Realm holding the roster
    /// * `client_id` / `client_secret` - Service-account credentials
    /// * `timeout` - Per-request timeout (default 30s)
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Option<Duration>,
    ) -> SyncResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let http_client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| SyncError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
            token: Mutex::new(None),
            backoff: BackoffPolicy::default(),
        })
    }

    /// Set a custom rate-limit pacing policy
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.realm
        )
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "{}/admin/realms/{}/{}",
            self.base_url,
            self.realm,
            path.trim_start_matches('/')
        )
    }

    /// Return a valid access token, performing the client-credentials
    /// exchange when the cache is empty, stale, or `force` is set.
    pub async fn get_access_token(&self, force: bool) -> SyncResult<String> {
        let mut guard = self.token.lock().await;

        if !force {
            if let Some(cached) = guard.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let response = self
            .http_client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let hint = body_hint(response).await;
            return Err(SyncError::auth(format!(
                "token exchange failed with status {}: {}",
                status, hint
            )));
        }

        let payload: TokenResponse = response.json().await?;
        let access_token = payload
            .access_token
            .ok_or_else(|| SyncError::auth("token endpoint returned no access_token"))?;

        if force {
            info!("access token refreshed for realm {}", self.realm);
        } else {
            debug!("access token fetched for realm {}", self.realm);
        }

        *guard = Some(CachedToken::new(access_token.clone(), payload.expires_in));
        Ok(access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn request_once(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> SyncResult<Response> {
        let mut request = self
            .http_client
            .request(method, url)
            .query(query)
            .bearer_auth(token);
        if let Some(json) = body {
            request = request.json(json);
        }
        Ok(request.send().await?)
    }

    /// Send an authenticated admin request, waiting out rate limits
    /// against this request's pacing budget.
    async fn send_admin(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<serde_json::Value>,
    ) -> SyncResult<Response> {
        let url = self.admin_url(path);
        let mut pacing = self.backoff.start();

        loop {
            match self.send_authed(&method, &url, query, body.as_ref()).await {
                Err(SyncError::RateLimited { retry_after }) => {
                    match pacing.next_delay(retry_after) {
                        Some(delay) => {
                            debug!("rate limited on {}; waiting {:?}", url, delay);
                            sleep(delay).await;
                        }
                        None => {
                            warn!(
                                "rate-limit wait budget exhausted for {} ({:?} left)",
                                url,
                                pacing.remaining()
                            );
                            return Err(SyncError::RateLimited { retry_after });
                        }
                    }
                }
                other => return other,
            }
        }
    }

    /// One authenticated attempt, including the invalidate-and-retry-once
    /// answer to a stale token.
    async fn send_authed(
        &self,
        method: &Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> SyncResult<Response> {
        let token = self.get_access_token(false).await?;
        let response = self
            .request_once(method.clone(), url, query, body, &token)
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return self.check_status(response).await;
        }

        warn!("admin request unauthorized, refreshing token and retrying once");
        self.invalidate_token().await;
        let token = self.get_access_token(true).await?;
        let response = self
            .request_once(method.clone(), url, query, body, &token)
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(SyncError::auth("request unauthorized after token refresh"));
        }
        self.check_status(response).await
    }

    /// Map non-2xx statuses to errors, passing 2xx responses through
    async fn check_status(&self, response: Response) -> SyncResult<Response> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(SyncError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let hint = body_hint(response).await;
            return Err(SyncError::remote(status.as_u16(), hint));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> SyncResult<T> {
        let response = self.send_admin(Method::GET, path, query, None).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            let preview = text.chars().take(BODY_HINT_LIMIT).collect::<String>();
            SyncError::Other(format!(
                "Failed to decode admin API response: {}. Response: {}",
                e, preview
            ))
        })
    }

    /// One page of full user records.
    ///
    /// Requests `briefRepresentation=false` so directory attributes such as
    /// `LDAP_ENTRY_DN` are populated; the teacher detector depends on them.
    pub async fn list_users_page(&self, first: usize, max: usize) -> SyncResult<Vec<IdpUser>> {
        let query = vec![
            ("first".to_string(), first.to_string()),
            ("max".to_string(), max.to_string()),
            ("briefRepresentation".to_string(), "false".to_string()),
            ("search".to_string(), String::new()),
        ];
        let users: Vec<KeycloakUser> = self.get_json("users", &query).await?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    /// Total user count, for progress reporting
    pub async fn user_count(&self) -> SyncResult<usize> {
        self.get_json("users/count", &[]).await
    }

    /// The full nested group tree. The admin API pages top-level groups;
    /// children arrive nested under each page item.
    pub async fn group_tree(&self) -> SyncResult<Vec<IdpGroup>> {
        let mut tree = Vec::new();
        let mut pager = Pager::new(100);
        loop {
            let page: Vec<KeycloakGroup> = self.get_json("groups", &pager.params()).await?;
            let fetched = page.len();
            tree.extend(page.into_iter().map(|g| g.into_idp_group(None)));
            if !pager.advance(fetched) {
                break;
            }
        }
        Ok(tree)
    }

    /// One page of a group's members
    pub async fn group_members_page(
        &self,
        group_id: &str,
        first: usize,
        max: usize,
    ) -> SyncResult<Vec<IdpUser>> {
        let query = vec![
            ("first".to_string(), first.to_string()),
            ("max".to_string(), max.to_string()),
            ("briefRepresentation".to_string(), "false".to_string()),
        ];
        let path = format!("groups/{}/members", group_id);
        let members: Vec<KeycloakUser> = self.get_json(&path, &query).await?;
        Ok(members.into_iter().map(Into::into).collect())
    }

    /// Groups a user is a member of
    pub async fn user_groups(&self, user_id: &str) -> SyncResult<Vec<IdpGroup>> {
        let path = format!("users/{}/groups", user_id);
        let groups: Vec<KeycloakGroup> = self.get_json(&path, &[]).await?;
        Ok(groups
            .into_iter()
            .map(|g| g.into_idp_group(None))
            .collect())
    }

    /// Add a user to a group (idempotent on the provider side)
    pub async fn put_group_membership(&self, user_id: &str, group_id: &str) -> SyncResult<()> {
        let path = format!("users/{}/groups/{}", user_id, group_id);
        self.send_admin(Method::PUT, &path, &[], None).await?;
        Ok(())
    }

    /// Remove a user from a group
    pub async fn delete_group_membership(&self, user_id: &str, group_id: &str) -> SyncResult<()> {
        let path = format!("users/{}/groups/{}", user_id, group_id);
        self.send_admin(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }

    /// Create a user; the new id is parsed from the `Location` header
    pub async fn post_user(&self, user: &IdpUser) -> SyncResult<String> {
        let body = serde_json::to_value(KeycloakUser::from(user))?;
        let response = self.send_admin(Method::POST, "users", &[], Some(body)).await?;
        let status = response.status().as_u16();

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| SyncError::remote(status, "create response missing Location header"))?;

        location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(str::to_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SyncError::remote(status, "Location header carries no user id"))
    }

    /// Update a user record
    pub async fn put_user(&self, user: &IdpUser) -> SyncResult<()> {
        if user.id.is_empty() {
            return Err(SyncError::validation("update requires a user id"));
        }
        let path = format!("users/{}", user.id);
        let body = serde_json::to_value(KeycloakUser::from(user))?;
        self.send_admin(Method::PUT, &path, &[], Some(body)).await?;
        Ok(())
    }
}

async fn body_hint(response: Response) -> String {
    match response.text().await {
        Ok(text) => text.chars().take(BODY_HINT_LIMIT).collect(),
        Err(_) => String::from("<unreadable body>"),
    }
}

#[async_trait::async_trait]
impl IdentityProvider for KeycloakAdminClient {
    async fn list_users(&self, first: usize, max: usize) -> SyncResult<Vec<IdpUser>> {
        self.list_users_page(first, max).await
    }

    async fn count_users(&self) -> SyncResult<usize> {
        self.user_count().await
    }

    async fn get_group_tree(&self) -> SyncResult<Vec<IdpGroup>> {
        self.group_tree().await
    }

    async fn list_group_members(
        &self,
        group_id: &str,
        first: usize,
        max: usize,
    ) -> SyncResult<Vec<IdpUser>> {
        self.group_members_page(group_id, first, max).await
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> SyncResult<()> {
        self.put_group_membership(user_id, group_id).await
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> SyncResult<()> {
        self.delete_group_membership(user_id, group_id).await
    }

    async fn create_user(&self, user: &IdpUser) -> SyncResult<String> {
        self.post_user(user).await
    }

    async fn update_user(&self, user: &IdpUser) -> SyncResult<()> {
        self.put_user(user).await
    }
}
