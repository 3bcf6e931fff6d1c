//! Weaviate REST backend for the scene index.
//!
//! Uses the `/v1/batch/objects` endpoint; each object carries the embedding
//! as an explicit vector plus the denormalized scene metadata under the
//! `Scene` class.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{BatchItemOutcome, IndexError, SceneIndex, SceneVectorRecord};
use crate::config::VectorConfig;

#[derive(Clone)]
pub struct WeaviateIndex {
    http: reqwest::Client,
    base_url: String,
    class_name: String,
}

impl WeaviateIndex {
    pub fn new(config: &VectorConfig) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            class_name: config.class_name.clone(),
        })
    }
}

#[derive(Serialize)]
struct BatchRequest {
    objects: Vec<BatchObject>,
}

#[derive(Serialize)]
struct BatchObject {
    class: String,
    properties: serde_json::Value,
    vector: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchReplyItem {
    #[serde(default)]
    result: Option<BatchItemResult>,
}

#[derive(Deserialize)]
struct BatchItemResult {
    #[serde(default)]
    errors: Option<BatchItemErrors>,
}

#[derive(Deserialize)]
struct BatchItemErrors {
    #[serde(default)]
    error: Vec<BatchErrorMessage>,
}

#[derive(Deserialize)]
struct BatchErrorMessage {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl SceneIndex for WeaviateIndex {
    async fn batch_write(
        &self,
        records: &[SceneVectorRecord],
    ) -> Result<Vec<BatchItemOutcome>, IndexError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let objects = records
            .iter()
            .map(|record| BatchObject {
                class: self.class_name.clone(),
                properties: json!({
                    "jobId": record.job_id,
                    "sceneId": record.scene_id,
                    "sceneNumber": record.sequence_number,
                    "analysisTitle": record.title,
                    "analysisSummary": record.summary,
                    "characters": record.characters,
                    "locations": record.locations,
                }),
                vector: record.vector.clone(),
            })
            .collect();

        let url = format!("{}/v1/batch/objects", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&BatchRequest { objects })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: Vec<BatchReplyItem> = response.json().await?;
        if reply.len() != records.len() {
            return Err(IndexError::InvalidResponse(format!(
                "expected {} batch results, got {}",
                records.len(),
                reply.len()
            )));
        }

        let outcomes = records
            .iter()
            .zip(reply)
            .map(|(record, item)| {
                let error = item
                    .result
                    .and_then(|result| result.errors)
                    .map(|errors| {
                        errors
                            .error
                            .into_iter()
                            .map(|e| e.message)
                            .collect::<Vec<_>>()
                            .join("; ")
                    })
                    .filter(|joined| !joined.is_empty());
                BatchItemOutcome {
                    scene_id: record.scene_id.clone(),
                    error,
                }
            })
            .collect();
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> VectorConfig {
        VectorConfig {
            base_url: server.uri(),
            class_name: "Scene".to_string(),
            request_timeout_secs: 5,
        }
    }

    fn record(scene_id: &str) -> SceneVectorRecord {
        SceneVectorRecord {
            scene_id: scene_id.to_string(),
            job_id: "job-1".to_string(),
            sequence_number: 2,
            title: "Rooftop confrontation".to_string(),
            summary: "Mara corners Janek.".to_string(),
            characters: vec!["MARA".to_string()],
            locations: vec!["ROOFTOP".to_string()],
            vector: vec![0.5, 0.25],
        }
    }

    #[tokio::test]
    async fn batch_write_maps_per_item_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .and(body_partial_json(json!({
                "objects": [{"class": "Scene", "properties": {"sceneId": "scene-job-1-2"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"result": {}},
            ])))
            .mount(&server)
            .await;

        let index = WeaviateIndex::new(&config_for(&server)).expect("index builds");
        let outcomes = index
            .batch_write(&[record("scene-job-1-2")])
            .await
            .expect("write");
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].error.is_none());
    }

    #[tokio::test]
    async fn item_errors_do_not_fail_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"result": {"errors": {"error": [{"message": "invalid vector length"}]}}},
            ])))
            .mount(&server)
            .await;

        let index = WeaviateIndex::new(&config_for(&server)).expect("index builds");
        let outcomes = index.batch_write(&[record("s")]).await.expect("write");
        assert_eq!(
            outcomes[0].error.as_deref(),
            Some("invalid vector length")
        );
    }

    #[tokio::test]
    async fn server_failure_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/batch/objects"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let index = WeaviateIndex::new(&config_for(&server)).expect("index builds");
        let err = index.batch_write(&[record("s")]).await.expect_err("fails");
        assert!(matches!(err, IndexError::Status { status: 500, .. }));
    }
}
