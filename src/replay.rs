//! Offline replay of recorded frames
//!
//! Two ways to push a recording through the engine:
//! - [`ReplaySession`] / [`replay_records`] feed records straight into a
//!   [`SignalProcessor`], one snapshot per ready record.
//! - [`ReplayFeed`] stands in for the camera and all three estimators so the
//!   async [`LifecycleController`] can sample a recording in real time.
//!
//! In both, a change of question index captures the current snapshot into an
//! [`InterviewRecorder`] and resets the session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::AnalyzerConfig;
use crate::controller::LifecycleController;
use crate::error::{AnalysisError, EstimatorError};
use crate::estimator::{
    BodyPoseEstimator, FaceMeshEstimator, HandPoseEstimator, LandmarkModels, ModelLoader,
    ModelProvider, VideoFrame, VideoSource,
};
use crate::pipeline::SignalProcessor;
use crate::report::InterviewRecorder;
use crate::schema::{FrameRecord, FrameRecordAdapter};
use crate::types::{
    EstimatorKind, FaceLandmarks, FrameObservation, HandLandmarks, MetricsSnapshot, PoseLandmarks,
};

/// The observation a live sampler would have produced for this record
fn observed(record: &FrameRecord) -> FrameObservation {
    let o = &record.observation;
    FrameObservation {
        face: o.face.clone().filter(|_| !record.failed(EstimatorKind::Face)),
        hands: if record.failed(EstimatorKind::Hand) {
            Vec::new()
        } else {
            o.hands.clone()
        },
        pose: o.pose.clone().filter(|_| !record.failed(EstimatorKind::Pose)),
    }
}

fn ensure_valid(records: &[FrameRecord]) -> Result<(), AnalysisError> {
    match FrameRecordAdapter::validate_records(records).first() {
        Some(failure) => Err(AnalysisError::InvalidObservation(format!(
            "Invalid record {}: {}",
            failure.index, failure.error
        ))),
        None => Ok(()),
    }
}

// ============================================================================
// Synchronous replay
// ============================================================================

/// Streaming replay: push records one at a time
#[derive(Debug, Clone)]
pub struct ReplaySession {
    processor: SignalProcessor,
    recorder: InterviewRecorder,
    question: Option<u32>,
    processed: usize,
    skipped: usize,
}

impl ReplaySession {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            processor: SignalProcessor::with_config(config),
            recorder: InterviewRecorder::new(),
            question: None,
            processed: 0,
            skipped: 0,
        }
    }

    /// Fold one record in. Returns the new snapshot, or `None` when the
    /// record had no frame.
    pub fn push(&mut self, record: &FrameRecord) -> Result<Option<MetricsSnapshot>, AnalysisError> {
        record
            .validate()
            .map_err(|e| AnalysisError::InvalidObservation(e.to_string()))?;

        // Unlabeled records stay with the current question, 0 before any label
        let next = record.question.or(self.question).unwrap_or(0);
        match self.question {
            Some(current) if current != next => self.capture(current),
            _ => {}
        }
        self.question = Some(next);

        if !record.video_ready {
            self.skipped += 1;
            return Ok(None);
        }

        self.processed += 1;
        Ok(Some(self.processor.process(&observed(record))))
    }

    fn capture(&mut self, question: u32) {
        debug!(question, "Question boundary, capturing metrics");
        self.recorder.record(question, self.processor.latest());
        self.processor.reset();
    }

    pub fn latest(&self) -> MetricsSnapshot {
        self.processor.latest()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Capture the final question and hand back everything recorded
    pub fn finish(mut self) -> InterviewRecorder {
        if let Some(question) = self.question {
            self.capture(question);
        }
        self.recorder
    }
}

/// Result of a synchronous replay
#[derive(Debug, Clone)]
pub struct ReplayOutput {
    /// One per ready record
    pub snapshots: Vec<MetricsSnapshot>,
    pub recorder: InterviewRecorder,
    /// Records without a frame
    pub skipped: usize,
}

/// Replay a whole recording through a fresh processor
pub fn replay_records(
    records: &[FrameRecord],
    config: &AnalyzerConfig,
) -> Result<ReplayOutput, AnalysisError> {
    ensure_valid(records)?;

    let mut session = ReplaySession::new(config);
    let mut snapshots = Vec::with_capacity(records.len());
    for record in records {
        if let Some(snapshot) = session.push(record)? {
            snapshots.push(snapshot);
        }
    }

    let skipped = session.skipped();
    Ok(ReplayOutput {
        snapshots,
        recorder: session.finish(),
        skipped,
    })
}

// ============================================================================
// Replay through the live controller
// ============================================================================

/// A recording posing as camera plus estimators.
///
/// Every call to [`VideoSource::current_frame`] consumes one record; records
/// with `video_ready = false` yield no frame. Estimators answer from the
/// record the frame came from and fail where the record says they failed.
#[derive(Debug, Default)]
pub struct ReplayFeed {
    records: RwLock<Vec<FrameRecord>>,
    cursor: AtomicUsize,
}

impl ReplayFeed {
    pub fn new(records: Vec<FrameRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Replace the recording and rewind
    pub fn load(&self, records: Vec<FrameRecord>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records;
        self.cursor.store(0, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records not yet handed out
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.cursor.load(Ordering::SeqCst))
    }

    /// True once a frame was requested past the end of the recording, so the
    /// tick that consumed the last record has finished
    pub fn is_drained(&self) -> bool {
        self.cursor.load(Ordering::SeqCst) > self.len()
    }

    fn lookup<T>(
        &self,
        frame: &VideoFrame,
        kind: EstimatorKind,
        pick: impl FnOnce(&FrameObservation) -> Vec<T>,
    ) -> Result<Vec<T>, EstimatorError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let record = usize::try_from(frame.index)
            .ok()
            .and_then(|i| records.get(i))
            .ok_or_else(|| EstimatorError::new(kind, format!("no recorded frame {}", frame.index)))?;

        if record.failed(kind) {
            return Err(EstimatorError::new(kind, "recorded failure"));
        }
        Ok(pick(&record.observation))
    }

    /// The feed as a set of loaded models
    pub fn landmark_models(self: &Arc<Self>) -> LandmarkModels {
        LandmarkModels {
            face: self.clone(),
            hand: self.clone(),
            pose: self.clone(),
        }
    }
}

impl VideoSource for ReplayFeed {
    fn current_frame(&self) -> Option<VideoFrame> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let record = records.get(index)?;
        if !record.video_ready {
            return None;
        }

        Some(VideoFrame {
            captured_at: record.timestamp,
            ..VideoFrame::without_pixels(index as u64, 0, 0)
        })
    }
}

#[async_trait]
impl FaceMeshEstimator for ReplayFeed {
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
        self.lookup(frame, EstimatorKind::Face, |o| o.face.iter().cloned().collect())
    }
}

#[async_trait]
impl HandPoseEstimator for ReplayFeed {
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<HandLandmarks>, EstimatorError> {
        self.lookup(frame, EstimatorKind::Hand, |o| o.hands.clone())
    }
}

#[async_trait]
impl BodyPoseEstimator for ReplayFeed {
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<PoseLandmarks>, EstimatorError> {
        self.lookup(frame, EstimatorKind::Pose, |o| o.pose.iter().cloned().collect())
    }
}

/// Loader handing out a [`ReplayFeed`] as the landmark models
pub struct ReplayLoader {
    feed: Arc<ReplayFeed>,
}

impl ReplayLoader {
    pub fn new(feed: Arc<ReplayFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl ModelLoader for ReplayLoader {
    async fn load(&self) -> Result<LandmarkModels, AnalysisError> {
        Ok(self.feed.landmark_models())
    }
}

/// Split a recording into consecutive per-question runs.
///
/// Records without a question index belong to the current run (question 0 at
/// the start).
pub fn split_by_question(records: Vec<FrameRecord>) -> Vec<(u32, Vec<FrameRecord>)> {
    let mut runs: Vec<(u32, Vec<FrameRecord>)> = Vec::new();
    for record in records {
        let question = record
            .question
            .or_else(|| runs.last().map(|(q, _)| *q))
            .unwrap_or(0);
        match runs.last_mut() {
            Some((current, run)) if *current == question => run.push(record),
            _ => runs.push((question, vec![record])),
        }
    }
    runs
}

/// Sample a recording through a live controller, one question at a time.
///
/// Runs in (possibly paused) tokio time at the configured sampling interval.
pub async fn simulate_records(
    records: Vec<FrameRecord>,
    config: AnalyzerConfig,
) -> Result<InterviewRecorder, AnalysisError> {
    ensure_valid(&records)?;

    let feed = Arc::new(ReplayFeed::default());
    let provider = Arc::new(ModelProvider::new(Arc::new(ReplayLoader::new(feed.clone()))));
    let mut controller = LifecycleController::new(provider, config)?;
    let period = controller.config().sampling.interval();
    let mut recorder = InterviewRecorder::new();

    for (question, run) in split_by_question(records) {
        info!(question, frames = run.len(), "Simulating question");
        feed.load(run);
        controller.reset();
        controller.start(feed.clone(), true).await?;
        while !feed.is_drained() {
            tokio::time::sleep(period).await;
        }
        controller.shutdown().await;
        recorder.record(question, controller.latest_metrics());
    }

    Ok(recorder)
}
