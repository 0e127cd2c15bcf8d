use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{StatusCode, header};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{GetField, config::GithubConfig, render::format_stamp};

use super::{PublishError, PublishSink, PutOutcome};

const API_BASE: &str = "https://api.github.com";

#[derive(Serialize)]
struct PutRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// Publishes through the GitHub contents API; the blob `sha` is the revision.
pub struct GithubSink {
    http: reqwest::Client,
    api_base: String,
    token: String,
    repo: String,
    branch: String,
}

impl GithubSink {
    pub fn new(config: &GithubConfig) -> Result<Self, PublishError> {
        Self::with_api_base(API_BASE, config)
    }

    pub fn with_api_base(api_base: &str, config: &GithubConfig) -> Result<Self, PublishError> {
        let http = reqwest::ClientBuilder::new()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{path}", self.api_base, self.repo)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.contents_url(path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/vnd.github+json")
    }
}

#[async_trait]
impl PublishSink for GithubSink {
    async fn revision(&self, path: &str) -> Result<Option<String>, PublishError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status().as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(Some(body.get_str_field("sha")?))
    }

    async fn put_content(
        &self,
        path: &str,
        bytes: &[u8],
        base_revision: Option<&str>,
    ) -> Result<PutOutcome, PublishError> {
        let request = PutRequest {
            message: format!(
                "Update Nostr directory ({} UTC)",
                format_stamp(OffsetDateTime::now_utc())
            ),
            content: STANDARD.encode(bytes),
            branch: &self.branch,
            sha: base_revision,
        };

        let response = self
            .request(reqwest::Method::PUT, path)
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(PutOutcome::Written),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => Ok(PutOutcome::Conflict),
            status => Err(PublishError::Status(status.as_u16())),
        }
    }
}
