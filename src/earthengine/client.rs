//! Earth Engine REST client implementing the catalog and export capabilities.

use super::expression::{self, Expr};
use crate::auth::{Session, bearer_token};
use crate::constants::earthengine::{BASE_URL, FILE_FORMAT};
use crate::error::{Error, Result};
use crate::export::{ExportJob, ExportRequest, ExportService, JobState, JobStatus};
use crate::http::{read_json, request_error};
use crate::imagery::{CatalogQuery, ImageHandle, ImageSet, ImageryCatalog};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

const SERVICE: &str = "Earth Engine";

/// Earth Engine client bound to one cloud project.
#[derive(Debug)]
pub struct EarthEngineClient<S> {
    http: Client,
    project: String,
    session: Mutex<S>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ComputeResponse {
    result: Value,
}

/// Long-running operation as returned by the export and poll endpoints.
#[derive(Debug, Clone, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct OperationMetadata {
    #[serde(default)]
    state: Option<String>,
}

impl Operation {
    fn job_state(&self) -> JobState {
        let state = self.metadata.as_ref().and_then(|m| m.state.as_deref());
        match state {
            Some("PENDING") => JobState::Submitted,
            Some("RUNNING" | "CANCELLING") => JobState::Active,
            Some("SUCCEEDED") if self.error.is_none() => JobState::Completed,
            Some("SUCCEEDED" | "FAILED" | "CANCELLED") => JobState::Failed,
            _ if self.error.is_some() => JobState::Failed,
            _ if self.done => JobState::Completed,
            _ => JobState::Active,
        }
    }
}

impl<S: Session> EarthEngineClient<S> {
    /// Client for `project` on the public API endpoint.
    pub fn new(http: Client, project: impl Into<String>, session: S) -> Self {
        Self {
            http,
            project: project.into(),
            session: Mutex::new(session),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Establish or renew the session.
    pub async fn connect(&self) -> Result<()> {
        bearer_token(&self.session).await.map(|_| ())
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let token = bearer_token(&self.session).await?;
        self.http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(url, e))
    }

    async fn compute(&self, expression: Expr) -> Result<Value> {
        let url = format!("{}/projects/{}/value:compute", self.base_url, self.project);
        let response = self
            .post(&url, &json!({ "expression": expression.into_graph() }))
            .await?;
        let body: ComputeResponse = read_json(response, SERVICE).await?;
        Ok(body.result)
    }

    async fn operation(&self, name: &str) -> Result<(Operation, Value)> {
        let url = format!("{}/{name}", self.base_url);
        let token = bearer_token(&self.session).await?;
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let raw: Value = read_json(response, SERVICE).await?;
        let operation = serde_json::from_value(raw.clone()).map_err(|e| Error::RemoteResponse {
            service: SERVICE,
            reason: format!("malformed operation: {e}"),
        })?;
        Ok((operation, raw))
    }
}

impl<S: Session> ImageryCatalog for EarthEngineClient<S> {
    async fn query(&self, query: &CatalogQuery<'_>) -> Result<ImageSet> {
        let collection = expression::filtered_collection(
            query.collection,
            query.window,
            query.region,
            query.cloud_max,
        );

        let count = self.compute(expression::size(collection.clone())).await?;
        let len = count
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::RemoteResponse {
                service: SERVICE,
                reason: format!("expected an image count, got {count}"),
            })?;
        debug!("{len} image(s) match in {}", query.collection);

        Ok(ImageSet {
            handle: ImageHandle::new(collection.into_value()),
            len,
        })
    }

    fn median(&self, set: &ImageSet) -> Result<ImageHandle> {
        let collection = Expr::from_value(set.handle.expression().clone());
        Ok(ImageHandle::new(expression::median(collection).into_value()))
    }

    fn select_bands(&self, image: &ImageHandle, bands: &[String]) -> Result<ImageHandle> {
        let image = Expr::from_value(image.expression().clone());
        Ok(ImageHandle::new(
            expression::select_bands(image, bands).into_value(),
        ))
    }
}

/// Body of an `image:export` request.
fn export_body(request: &ExportRequest) -> Value {
    let image = Expr::from_value(request.image.expression().clone());
    let clipped = expression::clip_to_bounds(image, request.bounds, request.scale_m);

    json!({
        "expression": clipped.into_graph(),
        "description": request.description,
        "fileExportOptions": {
            "fileFormat": FILE_FORMAT,
            "driveDestination": {
                "folder": request.folder,
                "filenamePrefix": request.file_name_prefix,
            },
        },
    })
}

impl<S: Session> ExportService for EarthEngineClient<S> {
    async fn submit(&self, request: &ExportRequest) -> Result<String> {
        let url = format!("{}/projects/{}/image:export", self.base_url, self.project);
        let response = self.post(&url, &export_body(request)).await?;
        let operation: Operation = read_json(response, SERVICE).await?;
        Ok(operation.name)
    }

    async fn status(&self, job: &ExportJob) -> Result<JobStatus> {
        let (operation, raw) = self.operation(&job.id).await?;
        Ok(JobStatus {
            state: operation.job_state(),
            detail: raw,
        })
    }

    async fn cancel(&self, job: &ExportJob) -> Result<()> {
        let url = format!("{}/{}:cancel", self.base_url, job.id);
        let response = self.post(&url, &json!({})).await?;
        let _: Value = read_json(response, SERVICE).await?;
        Ok(())
    }
}
