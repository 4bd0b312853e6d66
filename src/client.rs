//! Backend client
//!
//! Owns the HTTP client, the cookie store, the session manager and the
//! cached conversation history, and exposes the top-level operations. Every
//! authenticated call goes through the same preparation chain first: refill
//! expired cookies, then refresh the session if it is stale. Nothing here is
//! safe for concurrent use — one client per logical session, operations take
//! `&mut self`.

use crate::config::Config;
use crate::cookies::{Cookie, CookieStore, CookieSupplier};
use crate::error::{Error, Result};
use crate::history::{ConversationLister, collect_history};
use crate::idset::IdSet;
use crate::protocol::{
    Conversation, ConversationEvent, ConversationHistoryPage, HistoryItem, ModelInfo,
    ModelsResponse, NewMessageRequest, TitleRequest, TitleResponse, UserAccountInfo,
};
use crate::session::{Session, SessionManager};
use crate::stream::{StreamAction, StreamParser};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Method;
use reqwest::header;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

pub struct Client {
    config: Config,
    http: reqwest::Client,
    cookies: CookieStore,
    sessions: SessionManager,
    /// Conversation history accumulated by [`Client::history`], kept for
    /// [`Client::load_conversation`] lookups.
    history: IdSet<HistoryItem>,
    /// Model slugs the account may use, fetched lazily.
    model_slugs: Vec<String>,
}

impl Client {
    /// Build a client whose cookie store is seeded and refilled through the
    /// given supplier.
    pub async fn new(mut config: Config, supplier: Arc<dyn CookieSupplier>) -> Result<Self> {
        Self::normalize_base_url(&mut config);
        let origin = Self::parse_origin(&config)?;
        let http = Self::build_http(&config)?;
        let cookies = CookieStore::new(origin, supplier).await?;
        Ok(Self {
            config,
            http,
            cookies,
            sessions: SessionManager::new(),
            history: IdSet::default(),
            model_slugs: Vec::new(),
        })
    }

    /// Build a client from an already-obtained cookie set. Without a
    /// supplier, a needed refill fails with [`Error::MissingCookieSupplier`].
    pub fn with_cookies(mut config: Config, cookies: Vec<Cookie>) -> Result<Self> {
        Self::normalize_base_url(&mut config);
        let origin = Self::parse_origin(&config)?;
        let http = Self::build_http(&config)?;
        Ok(Self {
            config,
            http,
            cookies: CookieStore::with_cookies(origin, cookies),
            sessions: SessionManager::new(),
            history: IdSet::default(),
            model_slugs: Vec::new(),
        })
    }

    /// Strip trailing slashes so endpoint paths concatenate cleanly.
    fn normalize_base_url(config: &mut Config) {
        while config.base_url.ends_with('/') {
            config.base_url.pop();
        }
    }

    fn parse_origin(config: &Config) -> Result<Url> {
        Url::parse(&config.base_url).map_err(|source| Error::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })
    }

    fn build_http(config: &Config) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?)
    }

    /// The session currently held, if any.
    pub fn session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/backend-api/{}", self.config.base_url, endpoint)
    }

    /// Refill cookies and refresh the session as needed. Runs before every
    /// outgoing request; both checks are lazy, there are no background
    /// timers.
    async fn prepare_request(&mut self) -> Result<()> {
        self.cookies.ensure_fresh().await?;
        if self.sessions.needs_refresh() {
            let session = self.fetch_session().await?;
            self.sessions.install(session);
        }
        Ok(())
    }

    /// `GET /api/auth/session` — cookie-authenticated, no bearer token.
    async fn fetch_session(&self) -> Result<Session> {
        let url = format!("{}/api/auth/session", self.config.base_url);
        tracing::debug!(%url, "fetching session");
        let response = self
            .http
            .get(&url)
            .header(header::COOKIE, self.cookies.header_value())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                endpoint: "api/auth/session".to_string(),
                status,
                body,
            });
        }
        serde_json::from_str(&body).map_err(|err| Error::decode("session response", err))
    }

    async fn api_request<T: DeserializeOwned, B: Serialize>(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&B>,
    ) -> Result<T> {
        self.prepare_request().await?;
        let url = self.api_url(endpoint);
        let token = self.sessions.access_token().unwrap_or_default().to_string();
        let mut request = self
            .http
            .request(method, &url)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, self.cookies.header_value());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(endpoint, %status, "api request failed");
            return Err(Error::Status {
                endpoint: endpoint.to_string(),
                status,
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|err| Error::decode("api response", err))
    }

    async fn api_get<T: DeserializeOwned>(&mut self, endpoint: &str) -> Result<T> {
        self.api_request::<T, ()>(Method::GET, endpoint, None).await
    }

    async fn api_post<T: DeserializeOwned, B: Serialize>(
        &mut self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        self.api_request(Method::POST, endpoint, Some(body)).await
    }

    /// Retrieve the conversation history, converging on the server's
    /// advertised total where possible. Returns the accumulated items in
    /// first-seen order; the result can be partial when the backend's total
    /// never materializes (that is not an error).
    pub async fn history(&mut self) -> Result<Vec<HistoryItem>> {
        self.update_history().await?;
        Ok(self.history.items().to_vec())
    }

    async fn update_history(&mut self) -> Result<()> {
        let page_limit = self.config.page_limit;
        let max_failed = self.config.max_failed_attempts;
        let backoff = self.config.backoff_ms.clone();
        self.history = collect_history(self, page_limit, max_failed, &backoff).await?;
        Ok(())
    }

    /// Fetch the full conversation tree for a history entry. Unknown ids
    /// trigger one history reload before giving up.
    pub async fn load_conversation(&mut self, uuid: &str) -> Result<Conversation> {
        if self.history.find(uuid).is_none() {
            tracing::warn!(
                conversation_uuid = uuid,
                "conversation not in cached history, reloading"
            );
            self.update_history().await?;
            if self.history.find(uuid).is_none() {
                return Err(Error::ConversationNotFound(uuid.to_string()));
            }
        }
        self.api_get(&format!("conversation/{uuid}")).await
    }

    /// Models available to the account.
    pub async fn models(&mut self) -> Result<Vec<ModelInfo>> {
        let response: ModelsResponse = self.api_get("models").await?;
        self.model_slugs = response.models.iter().map(|m| m.slug.clone()).collect();
        Ok(response.models)
    }

    /// Plan and feature information for the account.
    pub async fn account_info(&mut self) -> Result<UserAccountInfo> {
        self.api_get("accounts/check").await
    }

    /// Ask the backend to title a conversation from its first message.
    pub async fn generate_title(
        &mut self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<String> {
        let request = TitleRequest {
            message_id: message_id.to_string(),
        };
        let response: TitleResponse = self
            .api_post(&format!("conversation/gen_title/{conversation_id}"), &request)
            .await?;
        Ok(response.title)
    }

    async fn ensure_model(&mut self, model: &str) -> Result<()> {
        if self.model_slugs.is_empty() {
            self.models().await?;
        }
        if !self.model_slugs.iter().any(|slug| slug == model) {
            return Err(Error::UnknownModel(model.to_string()));
        }
        Ok(())
    }

    /// Open a new conversation with `text`, streaming the assistant's reply
    /// through `on_event` and returning the new conversation's id. The
    /// backend echoes the outbound message first; that echo is consumed by
    /// title generation and never reaches `on_event`.
    pub async fn send_message<F>(&mut self, text: &str, model: &str, on_event: F) -> Result<String>
    where
        F: FnMut(ConversationEvent),
    {
        self.ensure_model(model).await?;
        let request =
            NewMessageRequest::new_conversation(text, model, self.config.timezone_offset_min);
        self.stream_conversation(&request, on_event).await
    }

    /// Continue an existing conversation. Same streaming contract as
    /// [`Client::send_message`].
    pub async fn send_message_in<F>(
        &mut self,
        conversation_id: &str,
        text: &str,
        model: &str,
        on_event: F,
    ) -> Result<String>
    where
        F: FnMut(ConversationEvent),
    {
        self.ensure_model(model).await?;
        let request = NewMessageRequest::in_conversation(
            text,
            model,
            self.config.timezone_offset_min,
            conversation_id,
        );
        self.stream_conversation(&request, on_event).await
    }

    async fn stream_conversation<F>(
        &mut self,
        request: &NewMessageRequest,
        mut on_event: F,
    ) -> Result<String>
    where
        F: FnMut(ConversationEvent),
    {
        self.prepare_request().await?;
        let url = self.api_url("conversation");
        let token = self.sessions.access_token().unwrap_or_default().to_string();
        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, self.cookies.header_value())
            .header(header::ACCEPT, "text/event-stream")
            .header("DNT", "1")
            .header(header::ORIGIN, self.config.base_url.clone())
            .header(header::REFERER, format!("{}/", self.config.base_url))
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-site")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %url, %body, "conversation request rejected");
            return Err(Error::Status {
                endpoint: "conversation".to_string(),
                status,
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut parser = StreamParser::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for action in parser.feed(&chunk)? {
                self.dispatch(action, &mut on_event).await?;
            }
            if parser.finished() {
                break;
            }
        }
        let (conversation_id, trailing) = parser.finish()?;
        for action in trailing {
            self.dispatch(action, &mut on_event).await?;
        }
        Ok(conversation_id)
    }

    async fn dispatch<F>(&mut self, action: StreamAction, on_event: &mut F) -> Result<()>
    where
        F: FnMut(ConversationEvent),
    {
        match action {
            StreamAction::Deliver(event) => on_event(event),
            StreamAction::GenerateTitle {
                conversation_id,
                message_id,
            } => {
                let title = self.generate_title(&conversation_id, &message_id).await?;
                tracing::info!(%title, %conversation_id, "title generated for new conversation");
            }
            StreamAction::Terminate => {}
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationLister for Client {
    async fn list(&mut self, offset: u32, limit: u32) -> Result<ConversationHistoryPage> {
        self.api_get(&format!("conversations?offset={offset}&limit={limit}"))
            .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url)
            .field("cookies", &self.cookies)
            .field("has_session", &self.sessions.current().is_some())
            .field("cached_history", &self.history.len())
            .finish()
    }
}
