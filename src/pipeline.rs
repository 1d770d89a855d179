//! Pipeline orchestration
//!
//! This module provides the synchronous core of the engine: a session-scoped
//! processor that turns one frame observation into one metrics snapshot.
//!
//! Stages per frame:
//! 1. SignalDetector - per-frame booleans and gesture count
//! 2. SignalCounters - session-to-date frame counts
//! 3. Composite scores - engagement/confidence from session ratios
//! 4. MetricSmoothers - moving averages over the percentages
//! 5. MetricsSnapshot - published output

use crate::config::{AnalyzerConfig, CompositeThresholds};
use crate::detectors::{confidence_score, engagement_score, SignalDetector};
use crate::error::AnalysisError;
use crate::smoother::MetricSmoothers;
use crate::types::{round_percent, FrameObservation, MetricsSnapshot, SignalCounters};
use tracing::debug;

/// Run a sequence of observations through a fresh processor (stateless, one-shot).
///
/// Returns one snapshot per observation.
///
/// # Example
/// ```ignore
/// let snapshots = process_observations(&observations, &AnalyzerConfig::default());
/// let last = snapshots.last().copied().unwrap_or_default();
/// ```
pub fn process_observations(
    observations: &[FrameObservation],
    config: &AnalyzerConfig,
) -> Vec<MetricsSnapshot> {
    let mut processor = SignalProcessor::with_config(config);
    observations
        .iter()
        .map(|observation| processor.process(observation))
        .collect()
}

/// Session-scoped signal state: counters, smoothers and the last snapshot.
///
/// One processor belongs to one active session. Call [`SignalProcessor::reset`]
/// at each question boundary.
#[derive(Debug, Clone)]
pub struct SignalProcessor {
    detector: SignalDetector,
    composite: CompositeThresholds,
    counters: SignalCounters,
    smoothers: MetricSmoothers,
    latest: MetricsSnapshot,
}

impl Default for SignalProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalProcessor {
    /// Create a processor with default thresholds and a 10 sample window
    pub fn new() -> Self {
        Self::with_config(&AnalyzerConfig::default())
    }

    pub fn with_config(config: &AnalyzerConfig) -> Self {
        Self {
            detector: SignalDetector::new(config.detectors.clone()),
            composite: config.composite.clone(),
            counters: SignalCounters::default(),
            smoothers: MetricSmoothers::new(config.smoothing_window),
            latest: MetricsSnapshot::default(),
        }
    }

    /// Create a processor with a specific smoothing window (samples)
    pub fn with_smoothing_window(window: usize) -> Self {
        Self::with_config(&AnalyzerConfig {
            smoothing_window: window,
            ..AnalyzerConfig::default()
        })
    }

    /// Fold one frame into the session and return the new snapshot
    pub fn process(&mut self, observation: &FrameObservation) -> MetricsSnapshot {
        // Stage 1: Per-frame detection
        let signals = self.detector.detect(observation);

        // Stage 2: Session counters
        let c = &mut self.counters;
        c.total_frames += 1;
        if signals.eye_contact {
            c.eye_contact_frames += 1;
        }
        if signals.speaking {
            c.speaking_frames += 1;
        }
        if signals.good_head_tilt {
            c.good_head_tilt_frames += 1;
        }
        if signals.smile {
            c.smile_frames += 1;
        }
        if signals.hands_present {
            c.hand_presence_frames += 1;
            c.gesture_occurrences += u64::from(signals.gestures);
        }
        if signals.good_posture {
            c.good_posture_frames += 1;
            c.advanced_posture_frames += 1;
        }

        // Stage 3: Composite scores against session-to-date ratios
        let ratios = self.counters.ratios();
        let engagement = engagement_score(&ratios, &self.composite);
        let confidence = confidence_score(&ratios, &self.composite);
        if engagement > self.composite.elevated_engagement {
            self.counters.engagement_frames += 1;
        }
        if confidence > self.composite.elevated_confidence {
            self.counters.confidence_frames += 1;
        }

        // Stage 4: Smoothing
        let c = &self.counters;
        let s = &mut self.smoothers;
        s.eye_contact.add(f64::from(c.percent(c.eye_contact_frames)));
        s.posture.add(f64::from(c.percent(c.good_posture_frames)));
        s.speaking.add(f64::from(c.percent(c.speaking_frames)));
        s.head_tilt.add(f64::from(c.percent(c.good_head_tilt_frames)));
        s.engagement.add(f64::from(c.percent(c.engagement_frames)));
        s.confidence.add(f64::from(c.percent(c.confidence_frames)));

        // Stage 5: Snapshot
        let snapshot = MetricsSnapshot {
            eye_contact_percent: round_percent(s.eye_contact.average()),
            posture_score: round_percent(s.posture.average()),
            gesture_count: c.gesture_occurrences,
            smile_percent: c.percent(c.smile_frames),
            hand_presence_percent: c.percent(c.hand_presence_frames),
            advanced_posture_score: c.percent(c.advanced_posture_frames),
            speaking_percent: round_percent(s.speaking.average()),
            head_tilt_score: round_percent(s.head_tilt.average()),
            engagement_score: round_percent(s.engagement.average()),
            confidence_score: round_percent(s.confidence.average()),
        };

        debug!(
            frame = c.total_frames,
            engagement,
            confidence,
            eye_contact = snapshot.eye_contact_percent,
            posture = snapshot.posture_score,
            "frame processed"
        );

        self.latest = snapshot;
        snapshot
    }

    /// Parse an observation from JSON, process it, and return the snapshot as JSON
    pub fn process_json(&mut self, observation_json: &str) -> Result<String, AnalysisError> {
        let observation: FrameObservation = serde_json::from_str(observation_json)?;
        if observation.points().any(|p| !p.is_finite()) {
            return Err(AnalysisError::InvalidObservation(
                "landmark coordinates must be finite".to_string(),
            ));
        }
        let snapshot = self.process(&observation);
        serde_json::to_string(&snapshot).map_err(AnalysisError::JsonError)
    }

    /// Zero every counter, clear every smoother, and fall back to the default snapshot
    pub fn reset(&mut self) {
        self.counters = SignalCounters::default();
        self.smoothers.reset();
        self.latest = MetricsSnapshot::default();
    }

    /// Most recent snapshot (all zeros before the first frame)
    pub fn latest(&self) -> MetricsSnapshot {
        self.latest
    }

    pub fn counters(&self) -> &SignalCounters {
        &self.counters
    }

    pub fn smoothers(&self) -> &MetricSmoothers {
        &self.smoothers
    }
}
