use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    cookie::{CookieStore, Jar},
    header::HeaderValue,
};
use tokio::sync::RwLock;
use url::Url;

/// Source of the bearer credential. Read again on every connection attempt
/// and request, since the token rotates on refresh.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

#[derive(Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn access_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}

/// Reads the access token from the session cookie jar shared with the REST
/// client, falling back to a token handed out in a login response body.
pub struct CookieCredentials {
    jar: Arc<Jar>,
    origin: Url,
    cookie_name: String,
    fallback: RwLock<Option<String>>,
}

impl CookieCredentials {
    pub fn new(jar: Arc<Jar>, origin: Url, cookie_name: impl Into<String>) -> Self {
        Self {
            jar,
            origin,
            cookie_name: cookie_name.into(),
            fallback: RwLock::new(None),
        }
    }

    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.fallback.write().await = token;
    }

    /// Drops both the stored token and the cookie copy.
    pub async fn clear(&self) {
        self.set_token(None).await;
        self.jar.add_cookie_str(
            &format!("{}=; Max-Age=0; Path=/", self.cookie_name),
            &self.origin,
        );
    }

    fn cookie_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        cookie_value(&header, &self.cookie_name)
    }
}

fn cookie_value(header: &HeaderValue, name: &str) -> Option<String> {
    header.to_str().ok()?.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

#[async_trait]
impl CredentialSource for CookieCredentials {
    async fn access_token(&self) -> Option<String> {
        if let Some(token) = self.cookie_token() {
            return Some(token);
        }
        self.fallback.read().await.clone()
    }
}
