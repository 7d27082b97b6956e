//! Vertex AI batch prediction over REST, with Cloud Storage for job input and output.

use crate::batch::{BatchError, BatchJob, BatchJobRequest, BatchService, JobState, JobStatus};
use crate::config::BatchConfig;
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

#[derive(Deserialize, Debug)]
struct CreatedJob {
    name: String,
}

#[derive(Deserialize, Debug)]
struct JobResource {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<JobErrorBody>,
}

#[derive(Deserialize, Debug)]
struct JobErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ObjectItem {
    name: String,
}

#[derive(Clone, Debug)]
pub struct VertexBatchService {
    client: ReqwestClient,
    vertex_api_url: String,
    storage_api_url: String,
    storage_upload_url: String,
    project_id: String,
    location: String,
    bucket: String,
    access_token: String,
}

impl VertexBatchService {
    pub fn from_config(config: &BatchConfig) -> Result<Self, BatchError> {
        let project_id = config
            .project_id
            .clone()
            .ok_or_else(|| BatchError::MissingConfig("batch.project_id (GCP_PROJECT_ID)".into()))?;
        let access_token = config.access_token.clone().ok_or_else(|| {
            BatchError::MissingConfig("batch.access_token (GCP_ACCESS_TOKEN)".into())
        })?;
        let client = ReqwestClient::builder().build()?;
        Ok(Self {
            client,
            vertex_api_url: config.vertex_api_url.trim_end_matches('/').to_string(),
            storage_api_url: config.storage_api_url.trim_end_matches('/').to_string(),
            storage_upload_url: config.storage_upload_url.trim_end_matches('/').to_string(),
            project_id,
            location: config.location.clone(),
            bucket: config.bucket.clone(),
            access_token,
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    fn object_url(&self, object: &str) -> Result<Url, BatchError> {
        let mut url = Url::parse(&format!("{}/b/{}/o", self.storage_api_url, self.bucket))
            .map_err(|e| BatchError::Malformed(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BatchError::Malformed("storage URL cannot be a base".into()))?
            .push(object);
        Ok(url)
    }

    async fn upload(&self, object: &str, body: String) -> Result<(), BatchError> {
        let url = format!("{}/b/{}/o", self.storage_upload_url, self.bucket);
        let response = self
            .authed(self.client.post(url))
            .query(&[("uploadType", "media"), ("name", object)])
            .header(reqwest::header::CONTENT_TYPE, "application/jsonl")
            .body(body)
            .send()
            .await?;
        ensure_success(response).await?;
        debug!("Uploaded gs://{}/{object}", self.bucket);
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, BatchError> {
        let url = format!("{}/b/{}/o", self.storage_api_url, self.bucket);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .authed(self.client.get(&url))
                .query(&[("prefix", prefix)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = ensure_success(request.send().await?).await?;
            let page: ObjectList = response.json().await?;
            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(names)
    }
}

async fn ensure_success(response: Response) -> Result<Response, BatchError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(BatchError::Api { status, body })
    }
}

fn is_prediction_file(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    name.contains("prediction") && file_name.ends_with(".jsonl")
}

#[async_trait]
impl BatchService for VertexBatchService {
    async fn submit(&self, request: BatchJobRequest) -> Result<BatchJob, BatchError> {
        let base = format!("batch/{}", request.display_name);
        let input_object = format!("{base}/input.jsonl");
        let output_prefix = format!("{base}/output");

        self.upload(&input_object, request.input_jsonl).await?;

        let mut body = json!({
            "displayName": request.display_name,
            "model": request.model,
            "inputConfig": {
                "instancesFormat": "jsonl",
                "gcsSource": { "uris": [format!("gs://{}/{input_object}", self.bucket)] }
            },
            "outputConfig": {
                "predictionsFormat": "jsonl",
                "gcsDestination": {
                    "outputUriPrefix": format!("gs://{}/{output_prefix}", self.bucket)
                }
            }
        });
        if let Some(parameters) = request.model_parameters {
            body["modelParameters"] = parameters;
        }

        let url = format!(
            "{}/v1/projects/{}/locations/{}/batchPredictionJobs",
            self.vertex_api_url, self.project_id, self.location
        );
        let response = self
            .authed(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        let created: CreatedJob = ensure_success(response).await?.json().await?;
        info!("Created batch prediction job {}.", created.name);

        Ok(BatchJob {
            name: created.name,
            display_name: request.display_name,
            output_prefix,
        })
    }

    async fn status(&self, job: &BatchJob) -> Result<JobStatus, BatchError> {
        let url = format!("{}/v1/{}", self.vertex_api_url, job.name);
        let response = self.authed(self.client.get(url)).send().await?;
        let resource: JobResource = ensure_success(response).await?.json().await?;
        Ok(JobStatus {
            state: JobState::from_api(&resource.state),
            error: resource
                .error
                .map(|e| e.message)
                .filter(|message| !message.is_empty()),
        })
    }

    async fn fetch_results(&self, job: &BatchJob) -> Result<String, BatchError> {
        let mut names: Vec<String> = self
            .list_objects(&job.output_prefix)
            .await?
            .into_iter()
            .filter(|name| is_prediction_file(name))
            .collect();
        names.sort();

        if names.is_empty() {
            return Err(BatchError::Malformed(format!(
                "no prediction files under gs://{}/{}",
                self.bucket, job.output_prefix
            )));
        }

        let mut combined = String::new();
        for name in names {
            let url = self.object_url(&name)?;
            let response = self
                .authed(self.client.get(url))
                .query(&[("alt", "media")])
                .send()
                .await?;
            let text = ensure_success(response).await?.text().await?;
            combined.push_str(text.trim_end());
            combined.push('\n');
        }
        Ok(combined)
    }
}
