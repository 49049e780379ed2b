//! HTTP client for the Aggregate briefcase endpoints

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::digest::{DigestChallenge, DigestRequest};
use super::{AggregateApi, RawDocument, SubmissionPage};
use crate::config::{AggregateConfig, AuthScheme};
use crate::error::{Result, SyncError};

/// Aggregate API client
///
/// Cloning is cheap: clones share the underlying connection pool.
#[derive(Clone)]
pub struct AggregateClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    auth: AuthScheme,
}

impl std::fmt::Debug for AggregateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl AggregateClient {
    /// Create a client using the configured default auth scheme
    pub fn new(config: &AggregateConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/xml"));

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            auth: config.auth_scheme,
        })
    }

    /// Same server and pool, different auth scheme
    pub fn with_auth(&self, auth: AuthScheme) -> Self {
        Self {
            auth,
            ..self.clone()
        }
    }

    pub fn auth(&self) -> AuthScheme {
        self.auth
    }

    pub fn submission_list_url(
        &self,
        form_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<Url> {
        let page_size = page_size.to_string();
        Url::parse_with_params(
            &format!("{}/view/submissionList", self.base_url),
            &[
                ("formId", form_id),
                ("numEntries", page_size.as_str()),
                ("cursor", cursor.unwrap_or("")),
            ],
        )
        .map_err(|e| SyncError::config(format!("invalid Aggregate URL: {}", e)))
    }

    pub fn download_url(&self, form_id: &str, submission_id: &str) -> Result<Url> {
        let form_path = format!(
            "{}[@version=null and @uiVersion=null]/data[@key={}]",
            form_id, submission_id
        );
        Url::parse_with_params(
            &format!("{}/view/downloadSubmission", self.base_url),
            &[("formId", form_path.as_str())],
        )
        .map_err(|e| SyncError::config(format!("invalid Aggregate URL: {}", e)))
    }

    async fn get_text(&self, url: Url) -> Result<String> {
        let response = match self.auth {
            AuthScheme::Basic => {
                self.http
                    .get(url.clone())
                    .basic_auth(&self.username, Some(&self.password))
                    .send()
                    .await?
            },
            AuthScheme::Digest => {
                let first = self.http.get(url.clone()).send().await?;
                match digest_challenge(first.status(), first.headers()) {
                    Some(challenge) => {
                        let uri = request_target(&url);
                        let cnonce = Uuid::new_v4().simple().to_string();
                        let authorization = challenge.authorization(&DigestRequest {
                            username: &self.username,
                            password: &self.password,
                            method: "GET",
                            uri: &uri,
                            cnonce: &cnonce,
                            nc: 1,
                        })?;
                        debug!(realm = %challenge.realm, "Answering digest challenge");
                        self.http
                            .get(url.clone())
                            .header(AUTHORIZATION, authorization)
                            .send()
                            .await?
                    },
                    None => first,
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::transport(format!(
                "GET {} returned {}",
                url.path(),
                status
            )));
        }

        Ok(response.text().await?)
    }
}

fn digest_challenge(status: StatusCode, headers: &HeaderMap) -> Option<DigestChallenge> {
    if status != StatusCode::UNAUTHORIZED {
        return None;
    }
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(DigestChallenge::parse)
}

/// Path and query as they appear on the request line
fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[async_trait]
impl AggregateApi for AggregateClient {
    async fn list_submissions(
        &self,
        form_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<SubmissionPage> {
        let url = self.submission_list_url(form_id, page_size, cursor)?;
        let body = self.get_text(url).await?;
        SubmissionPage::from_xml(&body)
    }

    async fn download_submission(
        &self,
        form_id: &str,
        submission_id: &str,
    ) -> Result<RawDocument> {
        let url = self.download_url(form_id, submission_id)?;
        let body = self.get_text(url).await?;
        Ok(RawDocument {
            submission_id: submission_id.to_string(),
            body,
        })
    }
}
