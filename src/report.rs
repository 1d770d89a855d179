//! Interview reports
//!
//! Snapshots captured at question boundaries are averaged into a
//! body-language summary, graded into per-dimension feedback, and encoded
//! as a JSON report.

use crate::error::AnalysisError;
use crate::types::MetricsSnapshot;
use crate::{POISE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

// ============================================================================
// Capture
// ============================================================================

/// Metrics captured at the end of one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionMetrics {
    pub question_index: u32,
    pub metrics: MetricsSnapshot,
}

/// Collects one snapshot per answered question
#[derive(Debug, Clone, Default)]
pub struct InterviewRecorder {
    captured: Vec<QuestionMetrics>,
}

impl InterviewRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, question_index: u32, metrics: MetricsSnapshot) {
        self.captured.push(QuestionMetrics {
            question_index,
            metrics,
        });
    }

    pub fn captured(&self) -> &[QuestionMetrics] {
        &self.captured
    }

    pub fn len(&self) -> usize {
        self.captured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }

    pub fn clear(&mut self) {
        self.captured.clear();
    }

    /// Summary over everything captured so far, if anything was
    pub fn summary(&self) -> Option<BodyLanguageSummary> {
        let snapshots: Vec<MetricsSnapshot> = self.captured.iter().map(|q| q.metrics).collect();
        BodyLanguageSummary::from_snapshots(&snapshots)
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Rounded per-field averages plus a short written summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyLanguageSummary {
    #[serde(flatten)]
    pub averages: MetricsSnapshot,
    pub summary: String,
}

impl BodyLanguageSummary {
    /// `None` when there is nothing to summarize
    pub fn from_snapshots(snapshots: &[MetricsSnapshot]) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }

        let n = snapshots.len() as f64;
        let mean = |field: fn(&MetricsSnapshot) -> f64| -> f64 {
            (snapshots.iter().map(field).sum::<f64>() / n).round()
        };

        let averages = MetricsSnapshot {
            eye_contact_percent: mean(|s| f64::from(s.eye_contact_percent)) as u32,
            posture_score: mean(|s| f64::from(s.posture_score)) as u32,
            gesture_count: mean(|s| s.gesture_count as f64) as u64,
            smile_percent: mean(|s| f64::from(s.smile_percent)) as u32,
            hand_presence_percent: mean(|s| f64::from(s.hand_presence_percent)) as u32,
            advanced_posture_score: mean(|s| f64::from(s.advanced_posture_score)) as u32,
            speaking_percent: mean(|s| f64::from(s.speaking_percent)) as u32,
            head_tilt_score: mean(|s| f64::from(s.head_tilt_score)) as u32,
            engagement_score: mean(|s| f64::from(s.engagement_score)) as u32,
            confidence_score: mean(|s| f64::from(s.confidence_score)) as u32,
        };

        Some(Self {
            summary: summary_lines(&averages).join(". "),
            averages,
        })
    }
}

/// Encouraging one-liners for averaged metrics
pub fn summary_lines(averages: &MetricsSnapshot) -> Vec<&'static str> {
    let mut lines = Vec::new();

    lines.push(match averages.eye_contact_percent {
        60.. => "Great eye contact",
        30.. => "Moderate eye contact",
        _ => "Try to make more eye contact",
    });
    lines.push(match averages.posture_score {
        60.. => "Good posture",
        30.. => "Posture is okay, but could be improved",
        _ => "Work on improving posture",
    });
    if averages.smile_percent >= 40 {
        lines.push("Friendly and approachable demeanor");
    }
    if averages.gesture_count >= 3 {
        lines.push("Used hand gestures effectively");
    }
    if averages.hand_presence_percent < 10 {
        lines.push("Try to use hands a bit more for expression");
    }

    lines
}

// ============================================================================
// Feedback
// ============================================================================

/// Score band for a feedback dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLevel {
    Excellent,
    Good,
    NeedsImprovement,
    Poor,
}

impl FeedbackLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => FeedbackLevel::Excellent,
            60.. => FeedbackLevel::Good,
            40.. => FeedbackLevel::NeedsImprovement,
            _ => FeedbackLevel::Poor,
        }
    }
}

/// Scores below this get a recommendation
pub const RECOMMENDATION_THRESHOLD: u32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDimension {
    EyeContact,
    Posture,
    Confidence,
}

impl FeedbackDimension {
    pub const ALL: [FeedbackDimension; 3] = [
        FeedbackDimension::EyeContact,
        FeedbackDimension::Posture,
        FeedbackDimension::Confidence,
    ];

    pub fn score(self, metrics: &MetricsSnapshot) -> u32 {
        match self {
            FeedbackDimension::EyeContact => metrics.eye_contact_percent,
            FeedbackDimension::Posture => metrics.posture_score,
            FeedbackDimension::Confidence => metrics.confidence_score,
        }
    }

    pub fn message(self, level: FeedbackLevel) -> &'static str {
        use FeedbackDimension::*;
        use FeedbackLevel::*;

        match (self, level) {
            (EyeContact, Excellent) => "Excellent eye contact maintained throughout the interview.",
            (EyeContact, Good) => "Good eye contact, try to maintain it more consistently.",
            (EyeContact, NeedsImprovement) => {
                "Eye contact needs improvement. Practice looking at the camera more often."
            }
            (EyeContact, Poor) => {
                "Poor eye contact. Focus on looking directly at the camera during responses."
            }
            (Posture, Excellent) => "Excellent posture maintained throughout the interview.",
            (Posture, Good) => "Good posture overall, maintain this professional appearance.",
            (Posture, NeedsImprovement) => {
                "Posture could be improved. Sit up straight and keep shoulders level."
            }
            (Posture, Poor) => "Poor posture detected. Focus on sitting upright with shoulders back.",
            (Confidence, Excellent) => {
                "Very confident and engaging presence throughout the interview."
            }
            (Confidence, Good) => "Good confidence level, try to show more enthusiasm.",
            (Confidence, NeedsImprovement) => {
                "Confidence needs improvement. Practice speaking with more conviction."
            }
            (Confidence, Poor) => {
                "Low confidence detected. Work on building self-assurance and positive body language."
            }
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            FeedbackDimension::EyeContact => {
                "Practice maintaining eye contact with the camera 70-80% of the time"
            }
            FeedbackDimension::Posture => {
                "Focus on sitting upright with shoulders back and head held high"
            }
            FeedbackDimension::Confidence => {
                "Work on projecting confidence through facial expressions and body language"
            }
        }
    }
}

/// Line used when no dimension needs work
pub const NO_RECOMMENDATIONS: &str =
    "Excellent body language and professional presence! Keep up the great work.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFeedback {
    pub score: u32,
    pub level: FeedbackLevel,
    pub message: String,
}

impl DimensionFeedback {
    fn grade(dimension: FeedbackDimension, metrics: &MetricsSnapshot) -> Self {
        let score = dimension.score(metrics);
        let level = FeedbackLevel::from_score(score);
        Self {
            score,
            level,
            message: dimension.message(level).to_string(),
        }
    }
}

/// Graded feedback for a (usually averaged) snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyLanguageFeedback {
    pub eye_contact: DimensionFeedback,
    pub posture: DimensionFeedback,
    pub confidence: DimensionFeedback,
    pub overall_score: u32,
    pub recommendations: Vec<String>,
}

impl BodyLanguageFeedback {
    pub fn from_metrics(metrics: &MetricsSnapshot) -> Self {
        let eye_contact = DimensionFeedback::grade(FeedbackDimension::EyeContact, metrics);
        let posture = DimensionFeedback::grade(FeedbackDimension::Posture, metrics);
        let confidence = DimensionFeedback::grade(FeedbackDimension::Confidence, metrics);

        let total = eye_contact.score + posture.score + confidence.score;
        let overall_score = (f64::from(total) / 3.0).round() as u32;

        let mut recommendations: Vec<String> = FeedbackDimension::ALL
            .iter()
            .filter(|d| d.score(metrics) < RECOMMENDATION_THRESHOLD)
            .map(|d| d.recommendation().to_string())
            .collect();
        if recommendations.is_empty() {
            recommendations.push(NO_RECOMMENDATIONS.to_string());
        }

        Self {
            eye_contact,
            posture,
            confidence,
            overall_score,
            recommendations,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Complete interview report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyLanguageReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub questions: Vec<QuestionMetrics>,
    /// Absent when no question was captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BodyLanguageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<BodyLanguageFeedback>,
}

/// Report encoder
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, recorder: &InterviewRecorder) -> BodyLanguageReport {
        let summary = recorder.summary();
        let feedback = summary
            .as_ref()
            .map(|s| BodyLanguageFeedback::from_metrics(&s.averages));

        BodyLanguageReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: POISE_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            questions: recorder.captured().to_vec(),
            summary,
            feedback,
        }
    }

    pub fn encode_to_json(&self, recorder: &InterviewRecorder) -> Result<String, AnalysisError> {
        let report = self.encode(recorder);
        serde_json::to_string_pretty(&report).map_err(AnalysisError::JsonError)
    }
}
