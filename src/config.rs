//! Analyzer configuration
//!
//! Every threshold the detectors and composite scores use lives here, with
//! defaults matching the reference behavior. Pixel thresholds are expressed in
//! the landmark estimator's native coordinate space.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default sampling interval (about 2 Hz)
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 500;

/// Default wall-clock budget for one estimator call
pub const DEFAULT_ESTIMATOR_TIMEOUT_MS: u64 = 2_000;

/// Default moving-average window (samples)
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub sampling: SamplingConfig,
    /// Capacity of each moving-average smoother
    pub smoothing_window: usize,
    pub detectors: DetectorThresholds,
    pub composite: CompositeThresholds,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            detectors: DetectorThresholds::default(),
            composite: CompositeThresholds::default(),
        }
    }
}

/// Sampling loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
    /// Per-call estimator budget; `None` waits indefinitely
    pub estimator_timeout_ms: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            estimator_timeout_ms: Some(DEFAULT_ESTIMATOR_TIMEOUT_MS),
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn estimator_timeout(&self) -> Option<Duration> {
        self.estimator_timeout_ms.map(Duration::from_millis)
    }
}

/// Per-frame detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorThresholds {
    /// Max |avg iris x - nose x| for eye contact (px)
    pub eye_contact_horizontal_px: f64,
    /// Max |avg iris y - nose y| for eye contact (px)
    pub eye_contact_vertical_px: f64,
    /// Mouth height/width ratio above which the subject is speaking
    pub speaking_mouth_ratio: f64,
    /// Mouth height/width ratio above which the subject is smiling
    pub smile_mouth_ratio: f64,
    /// Max vertical ear difference for a level head (px)
    pub head_tilt_px: f64,
    /// Max horizontal offset between shoulder/hip and ear/shoulder midpoints (px)
    pub posture_alignment_px: f64,
    /// Max vertical shoulder difference (px)
    pub posture_level_px: f64,
    /// Fingertip-to-wrist distance above which a finger counts as extended
    pub finger_extension: f64,
    /// Extended fingers needed for a hand to count as gesturing
    pub min_extended_fingers: usize,
    /// Pose keypoints scored below this are treated as missing
    pub min_keypoint_score: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            eye_contact_horizontal_px: 30.0,
            eye_contact_vertical_px: 40.0,
            speaking_mouth_ratio: 0.25,
            smile_mouth_ratio: 0.35,
            head_tilt_px: 20.0,
            posture_alignment_px: 30.0,
            posture_level_px: 20.0,
            finger_extension: 0.1,
            min_extended_fingers: 3,
            min_keypoint_score: 0.0,
        }
    }
}

/// Activation ratios and elevation cut-offs for the composite scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeThresholds {
    pub eye_contact_ratio: f64,
    pub speaking_ratio: f64,
    pub head_tilt_ratio: f64,
    pub posture_ratio: f64,
    /// Engagement score above which a frame counts as elevated
    pub elevated_engagement: u32,
    /// Confidence score above which a frame counts as elevated
    pub elevated_confidence: u32,
}

impl Default for CompositeThresholds {
    fn default() -> Self {
        Self {
            eye_contact_ratio: 0.5,
            speaking_ratio: 0.3,
            head_tilt_ratio: 0.7,
            posture_ratio: 0.6,
            elevated_engagement: 50,
            elevated_confidence: 60,
        }
    }
}

impl AnalyzerConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: AnalyzerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, AnalysisError> {
        serde_json::to_string_pretty(self).map_err(AnalysisError::JsonError)
    }

    /// Reject configurations the sampler cannot run with
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.sampling.interval_ms == 0 {
            return Err(AnalysisError::InvalidConfig(
                "sampling.interval_ms must be positive".to_string(),
            ));
        }
        if self.sampling.estimator_timeout_ms == Some(0) {
            return Err(AnalysisError::InvalidConfig(
                "sampling.estimator_timeout_ms must be positive".to_string(),
            ));
        }
        if self.smoothing_window == 0 {
            return Err(AnalysisError::InvalidConfig(
                "smoothing_window must be positive".to_string(),
            ));
        }

        let d = &self.detectors;
        let c = &self.composite;
        let thresholds = [
            ("detectors.eye_contact_horizontal_px", d.eye_contact_horizontal_px),
            ("detectors.eye_contact_vertical_px", d.eye_contact_vertical_px),
            ("detectors.speaking_mouth_ratio", d.speaking_mouth_ratio),
            ("detectors.smile_mouth_ratio", d.smile_mouth_ratio),
            ("detectors.head_tilt_px", d.head_tilt_px),
            ("detectors.posture_alignment_px", d.posture_alignment_px),
            ("detectors.posture_level_px", d.posture_level_px),
            ("detectors.finger_extension", d.finger_extension),
            ("detectors.min_keypoint_score", d.min_keypoint_score),
            ("composite.eye_contact_ratio", c.eye_contact_ratio),
            ("composite.speaking_ratio", c.speaking_ratio),
            ("composite.head_tilt_ratio", c.head_tilt_ratio),
            ("composite.posture_ratio", c.posture_ratio),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if d.min_extended_fingers > 5 {
            return Err(AnalysisError::InvalidConfig(format!(
                "detectors.min_extended_fingers must be at most 5, got {}",
                d.min_extended_fingers
            )));
        }

        Ok(())
    }
}
