//! JSON REST client for the cloud API
//!
//! Authenticates with the `X-Auth-Token` header and maps HTTP failures onto
//! `CloudError`, with 404 as the distinguished not-found kind.

use crate::error::ServiceError;
use otc_cloud::{CloudError, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Thin JSON client
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    token: String,
}

impl RestClient {
    pub fn new(token: &str, request_timeout: Duration) -> std::result::Result<Self, ServiceError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            token: token.to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(self.http.get(url)).await?;
        decode(response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(self.http.post(url).json(body)).await?;
        decode(response).await
    }

    /// POST whose response body is ignored (actions returning 202/204)
    pub async fn post_action<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        self.send(self.http.post(url).json(body)).await?;
        Ok(())
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(self.http.put(url).json(body)).await?;
        decode(response).await
    }

    pub async fn put_action<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        self.send(self.http.put(url).json(body)).await?;
        Ok(())
    }

    pub async fn patch_action<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<()> {
        self.send(self.http.patch(url).json(body)).await?;
        Ok(())
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    /// DELETE returning a body (e.g. a job id)
    pub async fn delete_with_body<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(self.http.delete(url)).await?;
        decode(response).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        tracing::debug!("{} {}", status.as_u16(), response.url());

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(transport)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn transport(err: reqwest::Error) -> CloudError {
    CloudError::Transport(err.to_string())
}

/// Map a non-success response onto a typed error
pub(crate) fn api_error(status: StatusCode, body: &str) -> CloudError {
    let message = error_message(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        } else {
            body.trim().to_string()
        }
    });

    if status == StatusCode::NOT_FOUND {
        CloudError::NotFound(message)
    } else {
        CloudError::api(status.as_u16(), message)
    }
}

/// Services disagree on the error envelope; try the known shapes
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/error_msg"),
        value.pointer("/errMsg"),
        value.pointer("/message"),
        value.pointer("/NeutronError/message"),
        value.pointer("/itemNotFound/message"),
        value.pointer("/badRequest/message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

/// Client bound to one service endpoint and project
#[derive(Debug, Clone)]
pub struct ServiceClient {
    rest: RestClient,
    endpoint: String,
    project_id: String,
}

impl ServiceClient {
    pub fn new(rest: RestClient, endpoint: impl Into<String>, project_id: &str) -> Self {
        Self {
            rest,
            endpoint: endpoint.into(),
            project_id: project_id.to_string(),
        }
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Absolute URL for a path relative to the endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}
