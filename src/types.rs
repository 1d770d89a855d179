//! Core types for the Poise pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark points from the estimators, the per-tick frame
//! observation, session counters, and the published metrics snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Landmarks
// ============================================================================

/// A single landmark in the estimator's native coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    /// Depth, when the estimator provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// Midpoint of two landmarks (2D)
    pub fn midpoint(&self, other: &LandmarkPoint) -> LandmarkPoint {
        LandmarkPoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }
}

/// Face mesh landmark indices (MediaPipe Face Mesh with refined irises)
pub mod face_mesh {
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_IRIS_CENTER: usize = 468;
    pub const RIGHT_IRIS_CENTER: usize = 473;
    pub const LEFT_EAR: usize = 234;
    pub const RIGHT_EAR: usize = 454;
    pub const MOUTH_LEFT_CORNER: usize = 61;
    pub const MOUTH_RIGHT_CORNER: usize = 291;
    pub const UPPER_INNER_LIP: usize = 13;
    pub const LOWER_INNER_LIP: usize = 14;

    /// Outer lip ring, starting at the left corner
    pub const MOUTH_OUTER: [usize; 12] = [61, 84, 17, 314, 405, 320, 307, 375, 321, 308, 324, 318];

    /// Number of points in a refined face mesh
    pub const REFINED_POINT_COUNT: usize = 478;
}

/// A detected face: ordered, indexed landmark sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<LandmarkPoint>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    /// Landmark at a face mesh index, if the estimator produced it
    pub fn point(&self, index: usize) -> Option<LandmarkPoint> {
        self.points.get(index).copied()
    }
}

/// Hand joints used by the gesture detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandJoint {
    Wrist,
    ThumbTip,
    IndexTip,
    MiddleTip,
    RingTip,
    PinkyTip,
}

impl HandJoint {
    pub const FINGERTIPS: [HandJoint; 5] = [
        HandJoint::ThumbTip,
        HandJoint::IndexTip,
        HandJoint::MiddleTip,
        HandJoint::RingTip,
        HandJoint::PinkyTip,
    ];

    pub fn index(self) -> usize {
        match self {
            HandJoint::Wrist => 0,
            HandJoint::ThumbTip => 4,
            HandJoint::IndexTip => 8,
            HandJoint::MiddleTip => 12,
            HandJoint::RingTip => 16,
            HandJoint::PinkyTip => 20,
        }
    }
}

/// Which hand the estimator believes it saw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

/// A detected hand: 21 ordered keypoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub keypoints: Vec<LandmarkPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handedness: Option<Handedness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl HandLandmarks {
    pub const KEYPOINT_COUNT: usize = 21;

    pub fn new(keypoints: Vec<LandmarkPoint>) -> Self {
        Self {
            keypoints,
            handedness: None,
            score: None,
        }
    }

    pub fn joint(&self, joint: HandJoint) -> Option<LandmarkPoint> {
        self.keypoints.get(joint.index()).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.keypoints.len() >= Self::KEYPOINT_COUNT
    }
}

/// Body pose keypoint names (MoveNet / COCO topology)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseKeypointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

/// A named body keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseKeypoint {
    pub name: PoseKeypointName,
    pub x: f64,
    pub y: f64,
    /// Keypoint confidence (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl PoseKeypoint {
    pub fn new(name: PoseKeypointName, x: f64, y: f64) -> Self {
        Self {
            name,
            x,
            y,
            score: None,
        }
    }

    pub fn point(&self) -> LandmarkPoint {
        LandmarkPoint::new(self.x, self.y)
    }
}

/// A detected body pose
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseLandmarks {
    pub keypoints: Vec<PoseKeypoint>,
}

impl PoseLandmarks {
    pub fn new(keypoints: Vec<PoseKeypoint>) -> Self {
        Self { keypoints }
    }

    /// First keypoint with the given name whose score clears `min_score`.
    ///
    /// Keypoints without a score are always accepted.
    pub fn keypoint(&self, name: PoseKeypointName, min_score: f64) -> Option<LandmarkPoint> {
        self.keypoints
            .iter()
            .find(|k| k.name == name && k.score.map_or(true, |s| s >= min_score))
            .map(PoseKeypoint::point)
    }
}

// ============================================================================
// Per-tick observation
// ============================================================================

/// Everything the three estimators reported for one sampled frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// At most one face
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceLandmarks>,
    /// Zero or more hands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hands: Vec<HandLandmarks>,
    /// At most one body pose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseLandmarks>,
}

impl FrameObservation {
    pub fn is_empty(&self) -> bool {
        self.face.is_none() && self.hands.is_empty() && self.pose.is_none()
    }

    /// Iterate over every landmark coordinate in the observation
    pub fn points(&self) -> impl Iterator<Item = LandmarkPoint> + '_ {
        let face = self.face.iter().flat_map(|f| f.points.iter().copied());
        let hands = self.hands.iter().flat_map(|h| h.keypoints.iter().copied());
        let pose = self
            .pose
            .iter()
            .flat_map(|p| p.keypoints.iter().map(PoseKeypoint::point));
        face.chain(hands).chain(pose)
    }
}

/// The three landmark capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Face,
    Hand,
    Pose,
}

impl EstimatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimatorKind::Face => "face",
            EstimatorKind::Hand => "hand",
            EstimatorKind::Pose => "pose",
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session state and output
// ============================================================================

/// Per-session frame counters, reset at each question boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounters {
    /// Frames that passed the readiness guard
    pub total_frames: u64,
    pub eye_contact_frames: u64,
    pub speaking_frames: u64,
    pub good_posture_frames: u64,
    pub advanced_posture_frames: u64,
    pub good_head_tilt_frames: u64,
    pub hand_presence_frames: u64,
    /// Gesturing hands summed over all frames
    pub gesture_occurrences: u64,
    pub smile_frames: u64,
    pub engagement_frames: u64,
    pub confidence_frames: u64,
}

impl SignalCounters {
    /// `count / total_frames`, or 0 before the first frame
    pub fn ratio(&self, count: u64) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            count as f64 / self.total_frames as f64
        }
    }

    /// Ratio as a rounded whole percentage
    pub fn percent(&self, count: u64) -> u32 {
        round_percent(self.ratio(count) * 100.0)
    }

    /// Session-to-date ratios feeding the composite scores
    pub fn ratios(&self) -> SignalRatios {
        SignalRatios {
            eye_contact: self.ratio(self.eye_contact_frames),
            speaking: self.ratio(self.speaking_frames),
            head_tilt: self.ratio(self.good_head_tilt_frames),
            posture: self.ratio(self.good_posture_frames),
            gestures_seen: self.gesture_occurrences > 0,
        }
    }
}

/// Session-to-date signal ratios (0-1)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalRatios {
    pub eye_contact: f64,
    pub speaking: f64,
    pub head_tilt: f64,
    pub posture: f64,
    pub gestures_seen: bool,
}

/// What the detectors concluded for a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSignals {
    pub eye_contact: bool,
    pub speaking: bool,
    pub good_head_tilt: bool,
    pub smile: bool,
    pub hands_present: bool,
    pub gestures: u32,
    pub good_posture: bool,
}

/// Externally visible metrics, republished every tick.
///
/// Percentages are whole numbers in 0-100. Field names follow the feedback
/// payload convention (camelCase).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Smoothed
    pub eye_contact_percent: u32,
    /// Smoothed
    pub posture_score: u32,
    /// Raw, cumulative for the session
    pub gesture_count: u64,
    /// Raw
    pub smile_percent: u32,
    /// Raw
    pub hand_presence_percent: u32,
    /// Raw
    pub advanced_posture_score: u32,
    /// Smoothed
    pub speaking_percent: u32,
    /// Smoothed
    pub head_tilt_score: u32,
    /// Smoothed
    pub engagement_score: u32,
    /// Smoothed
    pub confidence_score: u32,
}

impl MetricsSnapshot {
    pub fn is_zero(&self) -> bool {
        *self == MetricsSnapshot::default()
    }
}

/// Round a non-negative percentage to the nearest whole number
pub fn round_percent(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round() as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = MetricsSnapshot {
            eye_contact_percent: 80,
            gesture_count: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["eyeContactPercent"], 80);
        assert_eq!(json["gestureCount"], 3);
        assert_eq!(json["advancedPostureScore"], 0);
    }

    #[test]
    fn test_pose_keypoint_deserialization() {
        let json = r#"{"keypoints": [
            {"name": "left_shoulder", "x": 10.0, "y": 20.0, "score": 0.9},
            {"name": "right_shoulder", "x": 30.0, "y": 20.0}
        ]}"#;
        let pose: PoseLandmarks = serde_json::from_str(json).unwrap();
        assert_eq!(pose.keypoints.len(), 2);
        assert_eq!(
            pose.keypoint(PoseKeypointName::LeftShoulder, 0.0),
            Some(LandmarkPoint::new(10.0, 20.0))
        );
        assert!(pose.keypoint(PoseKeypointName::LeftShoulder, 0.95).is_none());
        assert!(pose.keypoint(PoseKeypointName::RightShoulder, 0.95).is_some());
        assert!(pose.keypoint(PoseKeypointName::LeftHip, 0.0).is_none());
    }

    #[test]
    fn test_empty_observation() {
        let observation: FrameObservation = serde_json::from_str("{}").unwrap();
        assert!(observation.is_empty());
        assert_eq!(observation.points().count(), 0);
    }

    #[test]
    fn test_counter_ratios_before_first_frame() {
        let counters = SignalCounters {
            eye_contact_frames: 3,
            ..Default::default()
        };
        assert_eq!(counters.ratio(counters.eye_contact_frames), 0.0);
        assert_eq!(counters.percent(counters.eye_contact_frames), 0);
    }

    #[test]
    fn test_counter_percent_rounding() {
        let counters = SignalCounters {
            total_frames: 3,
            eye_contact_frames: 2,
            ..Default::default()
        };
        // 66.67 rounds up
        assert_eq!(counters.percent(counters.eye_contact_frames), 67);
    }

    #[test]
    fn test_face_point_lookup_out_of_range() {
        let face = FaceLandmarks::new(vec![LandmarkPoint::new(0.0, 0.0); 10]);
        assert!(face.point(face_mesh::NOSE_TIP).is_some());
        assert!(face.point(face_mesh::LEFT_IRIS_CENTER).is_none());
    }
}
