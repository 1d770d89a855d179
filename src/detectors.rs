//! Signal detectors
//!
//! Per-frame classifiers over landmark geometry, plus the composite
//! engagement/confidence scores computed from session-to-date ratios.
//!
//! Detectors never fail: when a required landmark is missing they report the
//! signal as absent for that frame and log the gap at debug level.

use crate::config::{CompositeThresholds, DetectorThresholds};
use crate::geometry::distance;
use crate::types::{
    face_mesh, FaceLandmarks, FrameObservation, FrameSignals, HandJoint, HandLandmarks,
    LandmarkPoint, PoseKeypointName, PoseLandmarks, SignalRatios,
};
use tracing::debug;

/// Runs every per-frame detector over an observation
#[derive(Debug, Clone, Default)]
pub struct SignalDetector {
    thresholds: DetectorThresholds,
}

impl SignalDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DetectorThresholds {
        &self.thresholds
    }

    /// Classify one frame
    pub fn detect(&self, observation: &FrameObservation) -> FrameSignals {
        let mut signals = FrameSignals::default();

        if let Some(face) = &observation.face {
            signals.eye_contact = detect_eye_contact(face, &self.thresholds);
            signals.speaking = detect_speaking(face, &self.thresholds);
            signals.good_head_tilt = detect_head_tilt(face, &self.thresholds);
            signals.smile = detect_smile(face, &self.thresholds);
        }

        if !observation.hands.is_empty() {
            signals.hands_present = true;
            signals.gestures = count_gestures(&observation.hands, &self.thresholds);
        }

        if let Some(pose) = &observation.pose {
            signals.good_posture = detect_posture(pose, &self.thresholds);
        }

        signals
    }
}

/// Look up several face landmarks at once, logging the first missing index
fn face_points<const N: usize>(
    face: &FaceLandmarks,
    indices: [usize; N],
    detector: &str,
) -> Option<[LandmarkPoint; N]> {
    let mut points = [LandmarkPoint::new(0.0, 0.0); N];
    for (slot, index) in points.iter_mut().zip(indices) {
        match face.point(index) {
            Some(point) => *slot = point,
            None => {
                debug!(
                    detector,
                    index,
                    available = face.points.len(),
                    "face landmark missing"
                );
                return None;
            }
        }
    }
    Some(points)
}

/// Irises centered on the nose tip approximate gaze at the camera
pub fn detect_eye_contact(face: &FaceLandmarks, thresholds: &DetectorThresholds) -> bool {
    let Some([left_iris, right_iris, nose]) = face_points(
        face,
        [
            face_mesh::LEFT_IRIS_CENTER,
            face_mesh::RIGHT_IRIS_CENTER,
            face_mesh::NOSE_TIP,
        ],
        "eye_contact",
    ) else {
        return false;
    };

    let iris = left_iris.midpoint(&right_iris);
    let horizontal_offset = (iris.x - nose.x).abs();
    let vertical_offset = (iris.y - nose.y).abs();

    horizontal_offset < thresholds.eye_contact_horizontal_px
        && vertical_offset < thresholds.eye_contact_vertical_px
}

/// Mouth aspect ratio over the outer lip ring as a proxy for speech
pub fn detect_speaking(face: &FaceLandmarks, thresholds: &DetectorThresholds) -> bool {
    let ring = face_mesh::MOUTH_OUTER;
    let Some([left, right, top, bottom]) =
        face_points(face, [ring[0], ring[6], ring[3], ring[9]], "speaking")
    else {
        return false;
    };

    let width = distance(&left, &right);
    let height = distance(&top, &bottom);
    mouth_ratio(height, width).is_some_and(|ratio| ratio > thresholds.speaking_mouth_ratio)
}

/// Wide inner-lip opening between the mouth corners
pub fn detect_smile(face: &FaceLandmarks, thresholds: &DetectorThresholds) -> bool {
    let Some([left, right, top, bottom]) = face_points(
        face,
        [
            face_mesh::MOUTH_LEFT_CORNER,
            face_mesh::MOUTH_RIGHT_CORNER,
            face_mesh::UPPER_INNER_LIP,
            face_mesh::LOWER_INNER_LIP,
        ],
        "smile",
    ) else {
        return false;
    };

    let width = (right.x - left.x).abs();
    let height = (bottom.y - top.y).abs();
    mouth_ratio(height, width).is_some_and(|ratio| ratio > thresholds.smile_mouth_ratio)
}

/// Height over width, undefined for a degenerate mouth
fn mouth_ratio(height: f64, width: f64) -> Option<f64> {
    if width > f64::EPSILON {
        Some(height / width)
    } else {
        None
    }
}

/// Level ears mean the head is not tilted
pub fn detect_head_tilt(face: &FaceLandmarks, thresholds: &DetectorThresholds) -> bool {
    let Some([left_ear, right_ear]) = face_points(
        face,
        [face_mesh::LEFT_EAR, face_mesh::RIGHT_EAR],
        "head_tilt",
    ) else {
        return false;
    };

    (left_ear.y - right_ear.y).abs() < thresholds.head_tilt_px
}

/// Upright, centered posture: shoulders over hips, level shoulders, head over
/// shoulders. Any missing keypoint means not detected.
pub fn detect_posture(pose: &PoseLandmarks, thresholds: &DetectorThresholds) -> bool {
    let min_score = thresholds.min_keypoint_score;
    let required = [
        PoseKeypointName::LeftShoulder,
        PoseKeypointName::RightShoulder,
        PoseKeypointName::LeftHip,
        PoseKeypointName::RightHip,
        PoseKeypointName::LeftEar,
        PoseKeypointName::RightEar,
    ];

    let mut points = [LandmarkPoint::new(0.0, 0.0); 6];
    for (slot, name) in points.iter_mut().zip(required) {
        match pose.keypoint(name, min_score) {
            Some(point) => *slot = point,
            None => {
                debug!(keypoint = ?name, "pose keypoint missing");
                return false;
            }
        }
    }
    let [left_shoulder, right_shoulder, left_hip, right_hip, left_ear, right_ear] = points;

    let shoulder_mid = left_shoulder.midpoint(&right_shoulder);
    let hip_mid = left_hip.midpoint(&right_hip);
    let ear_mid = left_ear.midpoint(&right_ear);

    let shoulder_alignment = (shoulder_mid.x - hip_mid.x).abs();
    let shoulder_level = (left_shoulder.y - right_shoulder.y).abs();
    let head_alignment = (ear_mid.x - shoulder_mid.x).abs();

    shoulder_alignment < thresholds.posture_alignment_px
        && shoulder_level < thresholds.posture_level_px
        && head_alignment < thresholds.posture_alignment_px
}

/// Number of hands held open (enough fingertips extended away from the wrist)
pub fn count_gestures(hands: &[HandLandmarks], thresholds: &DetectorThresholds) -> u32 {
    hands
        .iter()
        .filter(|hand| is_open_hand(hand, thresholds))
        .count() as u32
}

fn is_open_hand(hand: &HandLandmarks, thresholds: &DetectorThresholds) -> bool {
    if !hand.is_complete() {
        debug!(keypoints = hand.keypoints.len(), "incomplete hand skipped");
        return false;
    }
    let Some(wrist) = hand.joint(HandJoint::Wrist) else {
        return false;
    };

    let extended = HandJoint::FINGERTIPS
        .iter()
        .filter_map(|&tip| hand.joint(tip))
        .filter(|tip| distance(&wrist, tip) > thresholds.finger_extension)
        .count();

    extended >= thresholds.min_extended_fingers
}

// ============================================================================
// Composite scores
// ============================================================================

/// 25 points each for eye contact, speaking, level head and good posture,
/// when their session ratio exceeds its activation threshold.
pub fn engagement_score(ratios: &SignalRatios, thresholds: &CompositeThresholds) -> u32 {
    let mut score = 0;
    if ratios.eye_contact > thresholds.eye_contact_ratio {
        score += 25;
    }
    if ratios.speaking > thresholds.speaking_ratio {
        score += 25;
    }
    if ratios.head_tilt > thresholds.head_tilt_ratio {
        score += 25;
    }
    if ratios.posture > thresholds.posture_ratio {
        score += 25;
    }
    score
}

/// 30 eye contact + 30 posture + 20 level head + 20 any gesture, capped at 100
pub fn confidence_score(ratios: &SignalRatios, thresholds: &CompositeThresholds) -> u32 {
    let mut score = 0;
    if ratios.eye_contact > thresholds.eye_contact_ratio {
        score += 30;
    }
    if ratios.posture > thresholds.posture_ratio {
        score += 30;
    }
    if ratios.head_tilt > thresholds.head_tilt_ratio {
        score += 20;
    }
    if ratios.gestures_seen {
        score += 20;
    }
    score.min(100)
}
