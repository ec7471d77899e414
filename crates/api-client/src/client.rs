use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use propdesk_api::{
    AuthUser, ListPage, ListQuery, ListResponse, LoginRequest, NormalizedError, Resource,
    TokenResponse,
};
use propdesk_runtime_config::ClientConfig;

use crate::error::{ApiClientError, Result};
use crate::middleware::{self, RequestOptions, Unauthorized};
use crate::refresh::HttpRefresher;
use crate::session::{LoginRedirect, Session, SessionOptions, TokenRefresher};
use crate::storage::SessionStorage;

/// Typed HTTP client for the listing API.
///
/// Every call goes through the session middleware: the bearer token is kept
/// fresh before sending, and a `401` is answered with one refresh and one
/// resubmission before it reaches the caller.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    /// Create a new client for `base_url` (including the API prefix).
    pub fn new(base_url: &str, timeout: Duration, session: Arc<Session>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, session))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str, session: Arc<Session>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    /// Build the client and its session from configuration.
    pub fn from_config(
        config: &ClientConfig,
        storage: Arc<dyn SessionStorage>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.server.timeout_secs);
        let refresher = match config.server.refresh_url() {
            Some(url) => Some(Arc::new(HttpRefresher::new(url, timeout)?) as Arc<dyn TokenRefresher>),
            None => None,
        };
        let mut options = SessionOptions::from(&config.session);
        options.refresh_timeout = timeout;
        let session = Session::create(storage, refresher, redirect, options);
        Self::new(&config.server.api_url(""), timeout, session)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Access the underlying `reqwest::Client`.
    pub fn reqwest_client(&self) -> &reqwest::Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn item_url(&self, resource: Resource, id: &str) -> String {
        self.url(&format!("{}/{}", resource.path(), urlencoding::encode(id)))
    }

    // ── Pipeline ──────────────────────────────────────────────────────────

    /// Send a request through the session middleware.
    ///
    /// Non-2xx responses other than an unrecoverable `401` are returned as-is;
    /// use [`parse_response`] to turn them into errors.
    pub async fn execute(&self, builder: RequestBuilder, options: RequestOptions) -> Result<Response> {
        let request = builder.build()?;
        let since = self.session.expirations();
        let request = middleware::authorize(&self.session, request, options).await;
        if options.skip_auth {
            return Ok(self.client.execute(request).await?);
        }

        let sent_with = middleware::bearer_of(&request);
        let retry = request.try_clone();
        let resp = self.client.execute(request).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let Some(mut retry) = retry else {
            debug!("401 on a request that cannot be resubmitted");
            middleware::on_unauthorized(&self.session, None, since, true).await;
            return Err(unauthorized(resp).await);
        };

        match middleware::on_unauthorized(&self.session, sent_with.as_deref(), since, false).await {
            Unauthorized::Resubmit(token) => {
                middleware::set_bearer(&mut retry, &token);
                let resp = self.client.execute(retry).await?;
                if resp.status() == StatusCode::UNAUTHORIZED {
                    middleware::on_unauthorized(&self.session, None, since, true).await;
                    return Err(unauthorized(resp).await);
                }
                Ok(resp)
            }
            Unauthorized::Reject => Err(unauthorized(resp).await),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = self.execute(builder, RequestOptions::default()).await?;
        parse_response(resp).await
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    /// Sign in and start the session with the issued token.
    pub async fn login(&self, req: &LoginRequest) -> Result<Option<AuthUser>> {
        let builder = self.client.post(self.url("/auth/login")).json(req);
        let resp = self.execute(builder, RequestOptions::anonymous()).await?;
        let body: TokenResponse = parse_response(resp).await?;
        let token = body.into_token().ok_or(ApiClientError::MissingToken)?;
        Ok(self.session.login(&token))
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    /// Refresh the token now, outside of any request.
    pub async fn refresh(&self) -> Result<Option<String>> {
        Ok(self.session.refresh_token().await?)
    }

    // ── Resources ─────────────────────────────────────────────────────────

    pub async fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        query: &ListQuery,
    ) -> Result<ListPage<T>> {
        let builder = self.client.get(self.url(resource.path())).query(query);
        let body: ListResponse<T> = self.send_json(builder).await?;
        Ok(body.into_page(query))
    }

    pub async fn get<T: DeserializeOwned>(&self, resource: Resource, id: &str) -> Result<T> {
        self.send_json(self.client.get(self.item_url(resource, id)))
            .await
    }

    pub async fn create<B: Serialize, T: DeserializeOwned>(
        &self,
        resource: Resource,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.client.post(self.url(resource.path())).json(body))
            .await
    }

    pub async fn update<B: Serialize, T: DeserializeOwned>(
        &self,
        resource: Resource,
        id: &str,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.client.put(self.item_url(resource, id)).json(body))
            .await
    }

    pub async fn delete(&self, resource: Resource, id: &str) -> Result<()> {
        let resp = self
            .execute(
                self.client.delete(self.item_url(resource, id)),
                RequestOptions::default(),
            )
            .await?;
        ensure_success(resp).await.map(|_| ())
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or the normalized error envelope otherwise.
pub async fn parse_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let bytes = ensure_success(resp).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn ensure_success(resp: Response) -> Result<Vec<u8>> {
    let status = resp.status();
    let bytes = resp.bytes().await?.to_vec();
    if !status.is_success() {
        return Err(ApiClientError::Status {
            status: status.as_u16(),
            error: NormalizedError::from_body(status.as_u16(), &bytes),
        });
    }
    Ok(bytes)
}

async fn unauthorized(resp: Response) -> ApiClientError {
    let status = resp.status().as_u16();
    let bytes = resp.bytes().await.unwrap_or_default();
    ApiClientError::Unauthorized(NormalizedError::from_body(status, &bytes))
}
