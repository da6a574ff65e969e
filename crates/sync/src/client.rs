//! REST client for the customer API.
//!
//! `POST/GET {base}/customers`, `PUT/DELETE {base}/customers/{id}` and
//! `POST {base}/login`. The bearer token returned by login, if any, is sent
//! on every later call.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use fieldbook_core::customers::Customer;
use fieldbook_core::sync::DEFAULT_REMOTE_CALL_TIMEOUT_SECS;
use fieldbook_storage_sqlite::crypto::sha256_hex;

use crate::error::{Result, SyncError};
use crate::remote::{RemoteAuthenticator, RemoteStore};

const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct CustomerPayload<'a> {
    name: &'a str,
    email: &'a str,
}

impl<'a> From<&'a Customer> for CustomerPayload<'a> {
    fn from(customer: &'a Customer) -> Self {
        Self {
            name: &customer.name,
            email: &customer.email,
        }
    }
}

/// Customer as the server returns it. Ids may come back as numbers.
#[derive(Debug, Deserialize)]
struct ServerCustomer {
    #[serde(deserialize_with = "deserialize_server_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl ServerCustomer {
    fn into_customer(self, fallback: Option<&Customer>) -> Customer {
        Customer {
            id: self.id,
            name: self
                .name
                .or_else(|| fallback.map(|c| c.name.clone()))
                .unwrap_or_default(),
            email: self
                .email
                .or_else(|| fallback.map(|c| c.email.clone()))
                .unwrap_or_default(),
            ..Customer::default()
        }
    }
}

fn deserialize_server_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) => Ok(id),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Client for the customer REST API.
#[derive(Debug)]
pub struct CustomerApiClient {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
    authenticated: AtomicBool,
}

impl CustomerApiClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Sync] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Sync] API response error ({}): {}", status, preview);
    }

    /// Create a client with the default request timeout.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(
            base_url,
            Duration::from_secs(DEFAULT_REMOTE_CALL_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            authenticated: AtomicBool::new(false),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn customers_url(&self) -> String {
        format!("{}/customers", self.base_url)
    }

    fn customer_url(&self, id: &str) -> String {
        format!("{}/customers/{}", self.base_url, urlencoding::encode(id))
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let token = self
            .token
            .read()
            .map_err(|_| SyncError::auth("token lock poisoned"))?
            .clone();
        if let Some(token) = token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| SyncError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }
        Ok(headers)
    }

    fn error_from(status: reqwest::StatusCode, body: &str) -> SyncError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            let message = match error.code {
                Some(code) => format!("{}: {}", code, error.message),
                None => error.message,
            };
            return SyncError::api(status.as_u16(), message);
        }
        SyncError::api(status.as_u16(), format!("Request failed: {}", body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!("[Sync] Failed to deserialize response: {}", e);
            SyncError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Checks the status and ignores the body.
    async fn expect_success(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Ok(())
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.token.write() {
            *current = token;
        }
    }
}

#[async_trait]
impl RemoteStore<Customer> for CustomerApiClient {
    /// POST {base}/customers
    async fn create(&self, record: &Customer) -> Result<Customer> {
        let response = self
            .client
            .post(self.customers_url())
            .headers(self.headers()?)
            .json(&CustomerPayload::from(record))
            .send()
            .await?;

        let created: ServerCustomer = Self::parse_response(response).await?;
        if created.id.is_empty() {
            return Err(SyncError::invalid_request(
                "create reply carried an empty id",
            ));
        }
        Ok(created.into_customer(Some(record)))
    }

    /// PUT {base}/customers/{id}
    async fn update(&self, id: &str, record: &Customer) -> Result<()> {
        let response = self
            .client
            .put(self.customer_url(id))
            .headers(self.headers()?)
            .json(&CustomerPayload::from(record))
            .send()
            .await?;

        Self::expect_success(response).await
    }

    /// DELETE {base}/customers/{id}
    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.customer_url(id))
            .headers(self.headers()?)
            .send()
            .await?;

        Self::expect_success(response).await
    }

    /// GET {base}/customers
    async fn list_all(&self) -> Result<Vec<Customer>> {
        let response = self
            .client
            .get(self.customers_url())
            .headers(self.headers()?)
            .send()
            .await?;

        let customers: Vec<ServerCustomer> = Self::parse_response(response).await?;
        Ok(customers
            .into_iter()
            .map(|customer| customer.into_customer(None))
            .collect())
    }
}

#[async_trait]
impl RemoteAuthenticator for CustomerApiClient {
    /// POST {base}/login with the SHA-256 of the password.
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        let payload = LoginRequest {
            username,
            password: sha256_hex(password),
        };
        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);
        if !status.is_success() {
            self.logout();
            return Err(Self::error_from(status, &body));
        }

        let reply: LoginResponse = if body.trim().is_empty() {
            LoginResponse::default()
        } else {
            serde_json::from_str(&body)?
        };
        self.set_token(reply.token);
        self.authenticated.store(true, Ordering::SeqCst);
        debug!("[Session] Remote login succeeded for '{}'", username);
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn logout(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
        self.set_token(None);
    }
}
