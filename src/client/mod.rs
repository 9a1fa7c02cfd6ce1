//! REST client for the data-management platform.
//!
//! A thin wrapper over the platform's HTTP API: resolving containers,
//! listing a project's subjects and sessions, reading a subject's analyses,
//! and downloading analysis output files. All calls are sequential; there is
//! no retry logic, so every request either succeeds or surfaces an error.

use crate::models::{Analysis, Container, Job, Project, Session, Subject};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the platform client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to the platform at {url}")]
    Connect { url: String },

    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("platform API error {status} for {url}: {body}")]
    Api {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write download to {path}")]
    Download {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Connection settings for the platform client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

/// Client for the platform's REST API.
pub struct PlatformClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl PlatformClient {
    /// Create a client with the configured timeout.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn map_send_error(&self, url: &str, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout {
                url: url.to_string(),
                seconds: self.config.timeout_seconds,
            }
        } else if e.is_connect() {
            ClientError::Connect {
                url: self.config.base_url.clone(),
            }
        } else {
            ClientError::Http(e)
        }
    }

    async fn get_raw(&self, url: &str) -> Result<reqwest::Response> {
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .header(
                "Authorization",
                format!("scitran-user {}", self.config.api_key),
            )
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status,
                url: url.to_string(),
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.get_raw(&url).await?;

        response
            .json::<T>()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }

    /// Fetch any container by id, with its parent references.
    pub async fn get_container(&self, id: &str) -> Result<Container> {
        self.get_json(&format!("containers/{id}")).await
    }

    /// Fetch a project by id.
    pub async fn get_project(&self, id: &str) -> Result<Project> {
        self.get_json(&format!("projects/{id}")).await
    }

    /// List all subjects under a project.
    pub async fn list_subjects(&self, project_id: &str) -> Result<Vec<Subject>> {
        self.get_json(&format!("projects/{project_id}/subjects")).await
    }

    /// List all sessions under a project, each with its owning subject.
    pub async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        self.get_json(&format!("projects/{project_id}/sessions")).await
    }

    /// List all analyses recorded against a subject.
    pub async fn list_analyses(&self, subject_id: &str) -> Result<Vec<Analysis>> {
        self.get_json(&format!("subjects/{subject_id}/analyses")).await
    }

    /// Fetch a full job record by id.
    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.get_json(&format!("jobs/{id}")).await
    }

    /// Download a named analysis output file to a local path.
    pub async fn download_file(
        &self,
        analysis_id: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<()> {
        let url = self.url(&format!("analyses/{analysis_id}/files/{file_name}"));
        let response = self.get_raw(&url).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Decode { url, source })?;

        std::fs::write(dest, &bytes).map_err(|source| ClientError::Download {
            path: dest.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client(base_url: &str) -> PlatformClient {
        PlatformClient::new(ClientConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_url_joining() {
        let client = make_client("https://platform.example.com/api");
        assert_eq!(
            client.url("projects/p1/subjects"),
            "https://platform.example.com/api/projects/p1/subjects"
        );
    }

    #[test]
    fn test_url_joining_trailing_slash() {
        let client = make_client("https://platform.example.com/api/");
        assert_eq!(client.url("jobs/j1"), "https://platform.example.com/api/jobs/j1");
    }

    #[test]
    fn test_connect_error_display() {
        let err = ClientError::Connect {
            url: "https://platform.example.com/api".to_string(),
        };
        assert!(err.to_string().contains("cannot connect"));
    }
}
