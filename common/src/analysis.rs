use serde::{Deserialize, Serialize};

/// Body of `POST /analyze-image`.
///
/// `image` is optional on the wire so the server can answer a missing
/// field with its own 400 body instead of a generic JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
        }
    }
}

/// A corner of a bounding polygon, in `[0,1]` image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedVertex {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f64,
    #[serde(default, rename = "boundingBox")]
    pub bounding_box: Vec<NormalizedVertex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLabel {
    pub description: String,
    pub confidence: f64,
}

/// What the server returns and the client renders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub labels: Vec<SceneLabel>,
}

impl AnalysisResult {
    /// Stand-in shown when the analysis endpoint cannot be reached.
    pub fn placeholder() -> Self {
        Self {
            objects: vec![DetectedObject {
                name: "placeholder object".into(),
                confidence: 0.86,
                bounding_box: Vec::new(),
            }],
            labels: vec![SceneLabel {
                description: "example label".into(),
                confidence: 0.73,
            }],
        }
    }
}

/// Error body for 4xx/5xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_uses_camel_case_and_defaults_empty() {
        let json = r#"{"objects":[{"name":"cup","confidence":0.5}],"labels":[]}"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert!(result.objects[0].bounding_box.is_empty());

        let out = serde_json::to_value(&result).unwrap();
        assert!(out["objects"][0].get("boundingBox").is_some());
    }

    #[test]
    fn missing_image_field_deserializes_to_none() {
        let req: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(req.image.is_none());
    }

    #[test]
    fn placeholder_has_one_object_and_one_label() {
        let p = AnalysisResult::placeholder();
        assert_eq!(p.objects.len(), 1);
        assert_eq!(p.labels.len(), 1);
        assert_eq!(p.objects[0].name, "placeholder object");
        assert_eq!(p.labels[0].description, "example label");
    }

    #[test]
    fn error_body_omits_empty_details() {
        let body = ErrorBody {
            error: "No image provided".into(),
            details: None,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"error":"No image provided"}"#
        );
    }
}
