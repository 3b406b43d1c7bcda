use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::UserId,
    protocol::{
        ConversationRecord, ConversationsPayload, CurrentUser, LoginRequest, LoginResponse,
        MessageRecord, SendMessageRequest, UserSearchResult,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    credentials::{CookieCredentials, CredentialSource},
    error::ClientError,
};

/// REST surface of the chat service.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;
    async fn current_user(&self) -> Result<CurrentUser, ClientError>;
    async fn user_conversations(&self) -> Result<Vec<ConversationRecord>, ClientError>;
    /// Conversation with `other_user_id`, or `None` if none exists yet.
    async fn private_conversation(
        &self,
        other_user_id: &UserId,
    ) -> Result<Option<ConversationRecord>, ClientError>;
    async fn send_message(&self, request: &SendMessageRequest)
        -> Result<MessageRecord, ClientError>;
    async fn search_users(&self, term: &str) -> Result<Vec<UserSearchResult>, ClientError>;
}

pub struct HttpChatApi {
    http: Client,
    base_url: Url,
    credentials: Arc<CookieCredentials>,
}

impl HttpChatApi {
    pub fn new(base_url: &str, credentials: Arc<CookieCredentials>) -> Result<Self, ClientError> {
        let base_url = parse_base_url(base_url)?;
        let http = Client::builder()
            .cookie_provider(credentials.jar())
            .build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn credentials(&self) -> Arc<CookieCredentials> {
        Arc::clone(&self.credentials)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ClientError::InvalidServerUrl {
                url: format!("{}{path}", self.base_url),
                reason: err.to_string(),
            })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder, ClientError> {
        let mut builder = self.http.request(method, self.endpoint(path)?);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = self.credentials.access_token().await {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder)
    }

    /// Sends an authenticated request. A 401 triggers one token refresh and
    /// one retry; a second 401 or a failed refresh is `SessionExpired`.
    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(&str, &str)],
    ) -> Result<Response, ClientError> {
        let response = self
            .request(method.clone(), path, body.as_ref(), query)
            .await?
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!(path, "auth: access token rejected; refreshing");
        if let Err(err) = self.refresh_token().await {
            warn!(path, error = %err, "auth: token refresh failed");
            return Err(ClientError::SessionExpired);
        }
        let retried = self
            .request(method, path, body.as_ref(), query)
            .await?
            .send()
            .await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "auth: request still unauthorized after refresh");
            return Err(ClientError::SessionExpired);
        }
        Ok(retried)
    }

    pub async fn refresh_token(&self) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, "auth/refresh-token", Some(&json!({})), &[])
            .await?
            .send()
            .await?;
        let response = check(response).await?;
        // Some deployments only rotate the cookie; others also echo the token.
        if let Ok(body) = response.json::<Value>().await {
            if let Some(token) = body
                .get("accessToken")
                .or_else(|| body.get("AccessToken"))
                .and_then(Value::as_str)
            {
                self.credentials.set_token(Some(token.to_string())).await;
            }
        }
        debug!("auth: token refreshed");
        Ok(())
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(raw).map_err(|err| ClientError::InvalidServerUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_status(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = check(response).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn to_body(value: &impl Serialize) -> Result<Value, ClientError> {
    Ok(serde_json::to_value(value)?)
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, ClientError> {
        let body = to_body(&LoginRequest {
            mail: email.to_string(),
            password: password.to_string(),
        })?;
        let response = self
            .request(Method::POST, "auth/login", Some(&body), &[])
            .await?
            .send()
            .await?;
        let login: LoginResponse = decode(response).await?;
        if login.access_token.is_some() {
            self.credentials.set_token(login.access_token.clone()).await;
        }
        info!(user_id = %login.id, "auth: signed in");
        Ok(login.into())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, "auth/logout", Some(&json!({})), &[])
            .await?
            .send()
            .await;
        self.credentials.clear().await;
        check(response?).await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<CurrentUser, ClientError> {
        let response = self
            .send_authorized(Method::GET, "auth/me", None, &[])
            .await?;
        decode(response).await
    }

    async fn user_conversations(&self) -> Result<Vec<ConversationRecord>, ClientError> {
        let response = self
            .send_authorized(Method::GET, "conversation/user/conversations", None, &[])
            .await?;
        let payload: ConversationsPayload = decode(response).await?;
        Ok(payload.into_records())
    }

    async fn private_conversation(
        &self,
        other_user_id: &UserId,
    ) -> Result<Option<ConversationRecord>, ClientError> {
        let path = format!("conversation/private/{other_user_id}");
        let response = self.send_authorized(Method::GET, &path, None, &[]).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let value: Value = decode(response).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<MessageRecord, ClientError> {
        let body = to_body(request)?;
        let response = self
            .send_authorized(Method::POST, "message/sendMessage", Some(body), &[])
            .await?;
        decode(response).await
    }

    async fn search_users(&self, term: &str) -> Result<Vec<UserSearchResult>, ClientError> {
        match self
            .send_authorized(Method::GET, "auth/search", None, &[("searchTerm", term)])
            .await
        {
            Ok(response) => decode(response).await,
            Err(ClientError::SessionExpired) => {
                warn!("auth: search unauthorized; returning no results");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
