//! # Batch Service Tests
//!
//! The Vertex AI batch client against a mock server, and the bounded polling loop.

mod common;

use common::setup_tracing;
use ctfrag::batch::{
    run_batch_job, wait_for_completion, BatchError, BatchJob, BatchJobRequest, BatchService,
    JobState, PollPolicy, VertexBatchService,
};
use ctfrag::config::BatchConfig;
use ctfrag_test_utils::ScriptedBatchService;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOB_NAME: &str = "projects/proj/locations/us-central1/batchPredictionJobs/77";

fn vertex_service(server: &MockServer) -> VertexBatchService {
    let config = BatchConfig {
        vertex_api_url: server.uri(),
        storage_api_url: format!("{}/storage/v1", server.uri()),
        storage_upload_url: format!("{}/upload/storage/v1", server.uri()),
        project_id: Some("proj".to_string()),
        location: "us-central1".to_string(),
        bucket: "bkt".to_string(),
        access_token: Some("tok".to_string()),
        ..BatchConfig::default()
    };
    VertexBatchService::from_config(&config).unwrap()
}

fn fast_policy(timeout: Duration) -> PollPolicy {
    PollPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        multiplier: 2.0,
        timeout,
    }
}

fn request(display_name: &str) -> BatchJobRequest {
    BatchJobRequest {
        display_name: display_name.to_string(),
        model: "publishers/google/models/gemini-2.5-flash".to_string(),
        input_jsonl: "{\"ctftime_id\": 1}\n{\"ctftime_id\": 2}".to_string(),
        model_parameters: None,
    }
}

async fn mount_submission(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/bkt/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "batch/job-1/input.jsonl"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/proj/locations/us-central1/batchPredictionJobs"))
        .and(body_partial_json(json!({
            "displayName": "job-1",
            "inputConfig": { "gcsSource": { "uris": ["gs://bkt/batch/job-1/input.jsonl"] } },
            "outputConfig": { "gcsDestination": { "outputUriPrefix": "gs://bkt/batch/job-1/output" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": JOB_NAME })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_vertex_job_round_trip() {
    // --- 1. Arrange ---
    setup_tracing();
    let server = MockServer::start().await;
    mount_submission(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/v1/{JOB_NAME}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "state": "JOB_STATE_RUNNING" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{JOB_NAME}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "state": "JOB_STATE_SUCCEEDED" })),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bkt/o"))
        .and(query_param("prefix", "batch/job-1/output"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "name": "batch/job-1/output/prediction-model-1/predictions_00002.jsonl" }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bkt/o"))
        .and(query_param("prefix", "batch/job-1/output"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "name": "batch/job-1/output/prediction-model-1/predictions_00001.jsonl" },
                { "name": "batch/job-1/output/prediction-model-1/errors.txt" }
            ],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/v1/b/bkt/o/batch%2Fjob-1%2Foutput%2F.*predictions_00001\.jsonl$"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ctftime_id\": 1}\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/storage/v1/b/bkt/o/batch%2Fjob-1%2Foutput%2F.*predictions_00002\.jsonl$"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ctftime_id\": 2}"))
        .mount(&server)
        .await;

    let service = vertex_service(&server);

    // --- 2. Act ---
    let output = run_batch_job(
        &service,
        request("job-1"),
        &fast_policy(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    // --- 3. Assert ---
    assert_eq!(output, "{\"ctftime_id\": 1}\n{\"ctftime_id\": 2}\n");
}

#[tokio::test]
async fn test_failed_job_carries_the_provider_message() {
    // --- 1. Arrange ---
    let server = MockServer::start().await;
    mount_submission(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{JOB_NAME}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state": "JOB_STATE_FAILED",
            "error": { "code": 8, "message": "Quota exceeded" }
        })))
        .mount(&server)
        .await;
    let service = vertex_service(&server);

    // --- 2. Act ---
    let result = run_batch_job(
        &service,
        request("job-1"),
        &fast_policy(Duration::from_secs(5)),
        &CancellationToken::new(),
    )
    .await;

    // --- 3. Assert ---
    match result {
        Err(BatchError::JobFailed { job, state, message }) => {
            assert_eq!(job, "job-1");
            assert_eq!(state, JobState::Failed);
            assert_eq!(message, "Quota exceeded");
        }
        other => panic!("expected a failed job, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_errors_surface_status_and_body() {
    // --- 1. Arrange ---
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/bkt/o"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;
    let service = vertex_service(&server);

    // --- 2. Act ---
    let result = service.submit(request("job-1")).await;

    // --- 3. Assert ---
    assert!(matches!(
        result,
        Err(BatchError::Api { status: 403, ref body }) if body == "forbidden"
    ));
}

#[tokio::test]
async fn test_finished_job_without_predictions_is_malformed() {
    // --- 1. Arrange ---
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bkt/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    let service = vertex_service(&server);
    let job = BatchJob {
        name: JOB_NAME.to_string(),
        display_name: "job-1".to_string(),
        output_prefix: "batch/job-1/output".to_string(),
    };

    // --- 2. Act ---
    let result = service.fetch_results(&job).await;

    // --- 3. Assert ---
    assert!(matches!(result, Err(BatchError::Malformed(_))));
}

#[tokio::test]
async fn test_wait_gives_up_after_the_timeout() {
    // --- 1. Arrange ---
    let service = ScriptedBatchService::new();
    service.hang("stuck");
    let job = service.submit(request("stuck-job")).await.unwrap();

    // --- 2. Act ---
    let result = wait_for_completion(
        &service,
        &job,
        &fast_policy(Duration::from_millis(30)),
        &CancellationToken::new(),
    )
    .await;

    // --- 3. Assert ---
    assert!(matches!(result, Err(BatchError::Timeout { ref job, .. }) if job == "stuck-job"));
}

#[tokio::test]
async fn test_wait_stops_when_cancelled() {
    // --- 1. Arrange ---
    let service = ScriptedBatchService::new();
    service.hang("stuck");
    let job = service.submit(request("stuck-job")).await.unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    // --- 2. Act ---
    let result = wait_for_completion(
        &service,
        &job,
        &fast_policy(Duration::from_secs(30)),
        &cancel,
    )
    .await;

    // --- 3. Assert ---
    assert!(matches!(result, Err(BatchError::Cancelled(ref job)) if job == "stuck-job"));
}
