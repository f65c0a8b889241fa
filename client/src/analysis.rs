use std::collections::VecDeque;
use std::time::Duration;

use snapcam_common::analysis::{AnalysisResult, AnalyzeRequest};
use snapcam_common::dataurl::DataUrl;
use tokio::time::Instant;
use tracing::{info, warn};

const REVEAL_STEP: Duration = Duration::from_millis(120);
const SCROLL_DELAY: Duration = Duration::from_millis(400);

/// Posts captured frames to the analysis server.
///
/// Failures never reach the user: any error is logged and replaced by
/// [`AnalysisResult::placeholder`].
#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    url: String,
}

impl AnalysisClient {
    pub fn new(url: &str) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(AnalysisError::Request)?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    pub async fn analyze(&self, image: &DataUrl) -> AnalysisResult {
        match self.try_analyze(image).await {
            Ok(result) => {
                info!(
                    objects = result.objects.len(),
                    labels = result.labels.len(),
                    "analysis received"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, url = self.url, "analysis failed, showing placeholder");
                AnalysisResult::placeholder()
            }
        }
    }

    async fn try_analyze(&self, image: &DataUrl) -> Result<AnalysisResult, AnalysisError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&AnalyzeRequest::new(image.to_string()))
            .send()
            .await
            .map_err(AnalysisError::Request)?;
        if !resp.status().is_success() {
            return Err(AnalysisError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(AnalysisError::Decode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Request(reqwest::Error),
    #[error("analysis server returned HTTP {0}")]
    Status(u16),
    #[error("failed to decode analysis response: {0}")]
    Decode(reqwest::Error),
}

// ---------------------------------------------------------------------------
// Result panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResultItem {
    pub text: String,
    pub reveal_after: Duration,
}

/// The two result lists, each item with its staggered reveal delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPanel {
    pub objects: Vec<ResultItem>,
    pub labels: Vec<ResultItem>,
    pub scroll_after: Duration,
}

pub fn render(result: &AnalysisResult) -> ResultPanel {
    let objects = result
        .objects
        .iter()
        .enumerate()
        .map(|(i, obj)| ResultItem {
            text: line(&obj.name, obj.confidence),
            reveal_after: REVEAL_STEP * i as u32,
        })
        .collect();

    let offset = result.objects.len();
    let labels = result
        .labels
        .iter()
        .enumerate()
        .map(|(j, label)| ResultItem {
            text: line(&label.description, label.confidence),
            reveal_after: REVEAL_STEP * (offset + j) as u32,
        })
        .collect();

    ResultPanel {
        objects,
        labels,
        scroll_after: SCROLL_DELAY,
    }
}

fn line(name: &str, confidence: f64) -> String {
    format!("{name} (Confidence: {:.1}%)", confidence * 100.0)
}

/// One visible change to the result panel.
#[derive(Debug, Clone, PartialEq)]
pub enum RevealStep {
    Object(String),
    Label(String),
    /// Bring the panel into view.
    Scroll,
}

/// A [`ResultPanel`] turned into deadlines, drained as time passes.
#[derive(Debug)]
pub struct Reveal {
    pending: VecDeque<(Instant, RevealStep)>,
}

impl Reveal {
    pub fn new(panel: ResultPanel, start: Instant) -> Self {
        let mut steps: Vec<(Instant, RevealStep)> = panel
            .objects
            .into_iter()
            .map(|item| (start + item.reveal_after, RevealStep::Object(item.text)))
            .chain(
                panel
                    .labels
                    .into_iter()
                    .map(|item| (start + item.reveal_after, RevealStep::Label(item.text))),
            )
            .collect();
        steps.push((start + panel.scroll_after, RevealStep::Scroll));
        // Stable: items sharing a deadline keep panel order.
        steps.sort_by_key(|(at, _)| *at);
        Self {
            pending: steps.into(),
        }
    }

    pub fn next_at(&self) -> Option<Instant> {
        self.pending.front().map(|(at, _)| *at)
    }

    /// Remove and return every step whose deadline is at or before `now`.
    pub fn due(&mut self, now: Instant) -> Vec<RevealStep> {
        let mut due = Vec::new();
        while let Some((at, _)) = self.pending.front() {
            if *at > now {
                break;
            }
            if let Some((_, step)) = self.pending.pop_front() {
                due.push(step);
            }
        }
        due
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }
}
