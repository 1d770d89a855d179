//! poise.frame_record.v1 schema definition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EstimatorKind, FrameObservation};

/// Current schema version
pub const SCHEMA_VERSION: &str = "poise.frame_record.v1";

fn ready() -> bool {
    true
}

/// One recorded sampling tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Schema version identifier
    pub schema_version: String,
    /// Unique record identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Capture timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Interview question this frame belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<u32>,
    /// False when the video source had no frame at this tick
    #[serde(default = "ready")]
    pub video_ready: bool,
    #[serde(default)]
    pub observation: FrameObservation,
    /// Estimators that errored or timed out on this frame
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<EstimatorKind>,
}

impl FrameRecord {
    /// Create a record for a ready frame
    pub fn new(timestamp: DateTime<Utc>, observation: FrameObservation) -> Self {
        FrameRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            record_id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp,
            question: None,
            video_ready: true,
            observation,
            failures: Vec::new(),
        }
    }

    /// Create a record for a tick where no frame was available
    pub fn not_ready(timestamp: DateTime<Utc>) -> Self {
        FrameRecord {
            video_ready: false,
            ..FrameRecord::new(timestamp, FrameObservation::default())
        }
    }

    pub fn with_question(mut self, question: u32) -> Self {
        self.question = Some(question);
        self
    }

    pub fn with_failure(mut self, estimator: EstimatorKind) -> Self {
        if !self.failures.contains(&estimator) {
            self.failures.push(estimator);
        }
        self
    }

    pub fn failed(&self, estimator: EstimatorKind) -> bool {
        self.failures.contains(&estimator)
    }

    /// Validate the record schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if self.observation.points().any(|p| !p.is_finite()) {
            return Err(ValidationError::NonFiniteCoordinate);
        }

        if !self.video_ready && !self.observation.is_empty() {
            return Err(ValidationError::ObservationWithoutFrame);
        }

        Ok(())
    }
}

/// Validation errors for frame records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Landmark coordinates must be finite")]
    NonFiniteCoordinate,

    #[error("Record carries landmarks but video_ready is false")]
    ObservationWithoutFrame,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LandmarkPoint, PoseKeypoint, PoseKeypointName, PoseLandmarks};

    #[test]
    fn test_serialize_record() {
        let record = FrameRecord::new(Utc::now(), FrameObservation::default())
            .with_question(2)
            .with_failure(EstimatorKind::Hand);
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("poise.frame_record.v1"));
        assert!(json.contains(r#""question":2"#));
        assert!(json.contains(r#""failures":["hand"]"#));
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let json = r#"{
            "schema_version": "poise.frame_record.v1",
            "timestamp": "2024-01-15T08:30:00Z"
        }"#;

        let record: FrameRecord = serde_json::from_str(json).unwrap();
        assert!(record.video_ready);
        assert!(record.observation.is_empty());
        assert!(record.question.is_none());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_deserialize_pose_record() {
        let json = r#"{
            "schema_version": "poise.frame_record.v1",
            "timestamp": "2024-01-15T08:30:00Z",
            "question": 0,
            "observation": {
                "pose": {"keypoints": [{"name": "nose", "x": 320.0, "y": 100.0, "score": 0.8}]}
            },
            "failures": ["face"]
        }"#;

        let record: FrameRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.question, Some(0));
        assert!(record.failed(EstimatorKind::Face));
        assert!(!record.failed(EstimatorKind::Pose));
        assert_eq!(
            record.observation.pose.unwrap().keypoint(PoseKeypointName::Nose, 0.5),
            Some(LandmarkPoint::new(320.0, 100.0))
        );
    }

    #[test]
    fn test_validation() {
        let record = FrameRecord::new(Utc::now(), FrameObservation::default());
        assert!(record.validate().is_ok());

        let mut wrong_version = record.clone();
        wrong_version.schema_version = "poise.frame_record.v0".to_string();
        assert!(matches!(
            wrong_version.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));

        let observation = FrameObservation {
            pose: Some(PoseLandmarks::new(vec![PoseKeypoint::new(
                PoseKeypointName::Nose,
                f64::NAN,
                0.0,
            )])),
            ..Default::default()
        };
        assert_eq!(
            FrameRecord::new(Utc::now(), observation.clone()).validate(),
            Err(ValidationError::NonFiniteCoordinate)
        );

        let mut blind = FrameRecord::not_ready(Utc::now());
        assert!(blind.validate().is_ok());
        blind.observation = FrameObservation {
            pose: Some(PoseLandmarks::new(vec![PoseKeypoint::new(
                PoseKeypointName::Nose,
                1.0,
                1.0,
            )])),
            ..Default::default()
        };
        assert_eq!(
            blind.validate(),
            Err(ValidationError::ObservationWithoutFrame)
        );
    }
}
