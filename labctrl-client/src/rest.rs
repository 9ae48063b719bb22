//! REST half of the remote client.
//!
//! Grounded on `api.py`'s `restful_get`/`restful_post` pair: every call
//! attaches the current bearer token as an `Authorization` header and
//! decodes the body as JSON; this module keeps that shape with `reqwest`
//! standing in for `requests`.

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use labctrl_core::{CommandResponse, SensorOperation, StageOperation};

#[derive(Debug, Error)]
pub enum RestError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// A thin wrapper around a base URL and bearer token. Holds no mutable
/// state of its own — `RemoteDevice` owns the token and passes it in,
/// mirroring how `api.py` rebuilds `self.auth_header` after every
/// reauthentication rather than caching it inside the HTTP helper.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, RestError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, RestError> {
        let mut request = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RestError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RestError::Status { status, body });
        }
        serde_json::from_str(&body).map_err(|e| RestError::Status {
            status,
            body: format!("could not decode response as JSON: {e}: {body}"),
        })
    }

    /// `POST /token`, mirroring `api.py::authenticate`. The server expects
    /// form-encoded credentials and replies with `{access_token, token_type}`.
    pub async fn issue_token(&self, username: &str, password: &str) -> Result<String, RestError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            username: &'a str,
            password: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[allow(dead_code)]
            token_type: String,
        }
        let response = self
            .http
            .post(format!("{}token", self.base_url))
            .form(&LoginRequest { username, password })
            .send()
            .await?;
        let response: TokenResponse = Self::decode(response).await?;
        Ok(response.access_token)
    }

    pub async fn stage_status(&self, token: &str) -> Result<CommandResponse, RestError> {
        self.get_json("data/stage", token).await
    }

    pub async fn stage_command(
        &self,
        token: &str,
        op: &StageOperation,
    ) -> Result<CommandResponse, RestError> {
        self.post_json("stage/command", Some(token), op).await
    }

    pub async fn sensor_status(&self, token: &str) -> Result<CommandResponse, RestError> {
        self.get_json("sensor/status", token).await
    }

    pub async fn sensor_command(
        &self,
        token: &str,
        op: &SensorOperation,
    ) -> Result<CommandResponse, RestError> {
        self.post_json("sensor/command", Some(token), op).await
    }

    pub async fn sensor_batch(&self, token: &str, size: u32) -> Result<CommandResponse, RestError> {
        self.get_json(&format!("data/batch?size={size}"), token).await
    }

    pub async fn device_data(&self, token: &str, device: &str) -> Result<CommandResponse, RestError> {
        self.get_json(&format!("data/{device}"), token).await
    }
}
