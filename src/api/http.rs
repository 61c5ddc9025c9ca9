use super::SchedulerApi;
use crate::error::{ConfigUnavailable, PersistError, RemoteError};
use crate::model::{
    AllocationProposal, OptimizerDefaults, OptimizerParameters, PersistAssignment, RunConfig,
    Semester,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SEMESTER_PAGE_SIZE: u32 = 100;

/// `{ data, message, status }` wrapper used by the backend's JSON responses.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    #[serde(rename = "semestre_nome")]
    semester: &'a str,
    #[serde(flatten)]
    parameters: OptimizerParameters,
}

#[derive(Debug, Serialize)]
struct BulkPersistRequest<'a> {
    #[serde(rename = "alocacoes")]
    assignments: &'a [PersistAssignment],
}

/// Transport-level failure, converted into the collaborator-specific error at each call site.
#[derive(Debug)]
enum ResponseError {
    Transport(String),
    Status { status: u16, message: String },
    Decode(String),
}

impl From<reqwest::Error> for ResponseError {
    fn from(e: reqwest::Error) -> Self {
        ResponseError::Transport(e.to_string())
    }
}

impl From<ResponseError> for RemoteError {
    fn from(e: ResponseError) -> Self {
        match e {
            ResponseError::Transport(msg) => RemoteError::Transport(msg),
            ResponseError::Status { status, message } => RemoteError::Status { status, message },
            ResponseError::Decode(msg) => RemoteError::Decode(msg),
        }
    }
}

impl From<ResponseError> for PersistError {
    fn from(e: ResponseError) -> Self {
        match e {
            ResponseError::Transport(msg) | ResponseError::Decode(msg) => {
                PersistError::Transport(msg)
            }
            ResponseError::Status { status, message } => PersistError::Status { status, message },
        }
    }
}

impl From<ResponseError> for ConfigUnavailable {
    fn from(e: ResponseError) -> Self {
        match e {
            ResponseError::Transport(msg) | ResponseError::Decode(msg) => ConfigUnavailable(msg),
            ResponseError::Status { status, message } => {
                ConfigUnavailable(format!("{status}: {message}"))
            }
        }
    }
}

/// [`SchedulerApi`] backed by the scheduling backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpSchedulerApi {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpSchedulerApi {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid API base URL: {base_url}"))?;
        // Url::join replaces the last path segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(format!("offering-allocator/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ResponseError> {
        self.base_url
            .join(path)
            .map_err(|e| ResponseError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ResponseError> {
        tracing::debug!(%url, "GET");
        let resp = self.http.get(url).send().await?;
        read_json(resp).await
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, ResponseError> {
        tracing::debug!(%url, "POST");
        let resp = self.http.post(url).json(body).send().await?;
        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ResponseError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    // Prefer the backend's own message; fall back to the status reason.
    let message = resp
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(ResponseError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ResponseError> {
    let resp = check_status(resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| ResponseError::Decode(e.to_string()))
}

#[async_trait]
impl SchedulerApi for HttpSchedulerApi {
    async fn fetch_default_config(&self) -> Result<OptimizerDefaults, ConfigUnavailable> {
        let url = self.endpoint("api/ag/config/defaults")?;
        let body: Envelope<OptimizerDefaults> = self.get_json(url).await?;
        Ok(body.data)
    }

    async fn fetch_semester_candidates(&self) -> Result<Vec<Semester>, RemoteError> {
        let mut url = self.endpoint("api/semestres")?;
        url.query_pairs_mut()
            .append_pair("page", "1")
            .append_pair("per_page", &SEMESTER_PAGE_SIZE.to_string());
        let body: Envelope<Vec<Semester>> = self.get_json(url).await?;
        Ok(body.data)
    }

    async fn execute_optimization(
        &self,
        config: &RunConfig,
    ) -> Result<AllocationProposal, RemoteError> {
        let url = self.endpoint("api/ag/executar")?;
        let request = ExecuteRequest {
            semester: &config.semester,
            parameters: config.parameters(),
        };
        let resp = self.post(url, &request).await?;
        let body: Envelope<AllocationProposal> = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body.data)
    }

    async fn persist_assignments(
        &self,
        assignments: &[PersistAssignment],
    ) -> Result<(), PersistError> {
        let url = self.endpoint("api/alocacoes/bulk")?;
        self.post(url, &BulkPersistRequest { assignments }).await?;
        Ok(())
    }

    async fn persist_assignment(&self, assignment: &PersistAssignment) -> Result<(), PersistError> {
        let url = self.endpoint("api/alocacoes")?;
        self.post(url, assignment).await?;
        Ok(())
    }
}
