use serde::{Deserialize, Serialize};
use snapcam_common::analysis::{AnalysisResult, DetectedObject, NormalizedVertex, SceneLabel};
use tracing::debug;

use crate::credentials::{Credentials, CredentialsError};

const ANNOTATE_PATH: &str = "/v1/images:annotate";
const FEATURES: [&str; 2] = ["OBJECT_LOCALIZATION", "LABEL_DETECTION"];

// ---------------------------------------------------------------------------
// Backend wire types (Cloud Vision `images:annotate`)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct BatchAnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageContent<'a>,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct BatchAnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    localized_object_annotations: Vec<LocalizedObjectAnnotation>,
    #[serde(default)]
    label_annotations: Vec<EntityAnnotation>,
    #[serde(default)]
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalizedObjectAnnotation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundingPoly {
    #[serde(default)]
    normalized_vertices: Vec<NormalizedVertex>,
}

#[derive(Debug, Deserialize)]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin client for the vision backend's annotate endpoint.
pub struct VisionClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl VisionClient {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(VisionError::Request)?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Run object localization and label detection on base64 image content
    /// (no `data:` prefix).
    pub async fn annotate(&self, content: &str) -> Result<AnalysisResult, VisionError> {
        let body = BatchAnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent { content },
                features: FEATURES
                    .iter()
                    .map(|&feature_type| Feature { feature_type })
                    .collect(),
            }],
        };

        let url = format!("{}{}", self.endpoint, ANNOTATE_PATH);
        debug!(url, bytes = content.len(), "sending annotate request");

        let response = self
            .credentials
            .authorize(&self.http, self.http.post(&url))
            .await
            .map_err(VisionError::Auth)?
            .json(&body)
            .send()
            .await
            .map_err(VisionError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VisionError::Status(status.as_u16(), text));
        }

        let batch: BatchAnnotateResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Decode(e.to_string()))?;

        let first = batch.responses.into_iter().next().unwrap_or_default();
        into_analysis(first)
    }
}

fn into_analysis(resp: AnnotateImageResponse) -> Result<AnalysisResult, VisionError> {
    if let Some(status) = resp.error {
        return Err(VisionError::Backend {
            code: status.code,
            message: status.message,
        });
    }

    let objects = resp
        .localized_object_annotations
        .into_iter()
        .map(|obj| DetectedObject {
            name: obj.name,
            confidence: obj.score,
            bounding_box: obj
                .bounding_poly
                .map(|poly| poly.normalized_vertices)
                .unwrap_or_default(),
        })
        .collect();

    let labels = resp
        .label_annotations
        .into_iter()
        .map(|label| SceneLabel {
            description: label.description,
            confidence: label.score,
        })
        .collect();

    Ok(AnalysisResult { objects, labels })
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("vision request failed: {0}")]
    Request(reqwest::Error),
    #[error("vision backend returned HTTP {0}: {1}")]
    Status(u16, String),
    #[error("failed to decode vision response: {0}")]
    Decode(String),
    #[error("vision backend error {code}: {message}")]
    Backend { code: i32, message: String },
    #[error("failed to authorize vision request: {0}")]
    Auth(CredentialsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AnnotateImageResponse {
        let batch: BatchAnnotateResponse = serde_json::from_str(json).unwrap();
        batch.responses.into_iter().next().unwrap_or_default()
    }

    #[test]
    fn maps_objects_and_labels() {
        let resp = parse(
            r#"{"responses":[{
                "localizedObjectAnnotations":[{
                    "mid":"/m/01","name":"Cup","score":0.91,
                    "boundingPoly":{"normalizedVertices":[{"x":0.1,"y":0.2},{"x":0.5},{"y":0.9}]}
                }],
                "labelAnnotations":[{"mid":"/m/02","description":"Tableware","score":0.88,"topicality":0.88}]
            }]}"#,
        );
        let result = into_analysis(resp).unwrap();
        assert_eq!(result.objects[0].name, "Cup");
        assert_eq!(result.objects[0].confidence, 0.91);
        assert_eq!(result.objects[0].bounding_box.len(), 3);
        assert_eq!(result.objects[0].bounding_box[1], NormalizedVertex { x: 0.5, y: 0.0 });
        assert_eq!(result.labels[0].description, "Tableware");
    }

    #[test]
    fn missing_annotations_are_empty() {
        let result = into_analysis(parse(r#"{"responses":[{}]}"#)).unwrap();
        assert!(result.objects.is_empty());
        assert!(result.labels.is_empty());

        let result = into_analysis(parse(r#"{}"#)).unwrap();
        assert_eq!(result, AnalysisResult::default());
    }

    #[test]
    fn object_without_polygon_gets_empty_box() {
        let resp = parse(r#"{"responses":[{"localizedObjectAnnotations":[{"name":"Dog","score":0.5}]}]}"#);
        let result = into_analysis(resp).unwrap();
        assert!(result.objects[0].bounding_box.is_empty());
    }

    #[test]
    fn per_image_error_is_surfaced() {
        let resp = parse(r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#);
        let err = into_analysis(resp).unwrap_err();
        assert!(matches!(err, VisionError::Backend { code: 3, .. }));
    }

    #[test]
    fn request_asks_for_both_features() {
        let body = BatchAnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageContent { content: "AAAA" },
                features: FEATURES
                    .iter()
                    .map(|&feature_type| Feature { feature_type })
                    .collect(),
            }],
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["requests"][0]["image"]["content"], "AAAA");
        assert_eq!(v["requests"][0]["features"][0]["type"], "OBJECT_LOCALIZATION");
        assert_eq!(v["requests"][0]["features"][1]["type"], "LABEL_DETECTION");
    }
}
