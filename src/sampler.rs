//! Frame sampler
//!
//! The sampling task pulls the current frame, runs the face, hand and pose
//! estimators one after another, and folds the observation into the shared
//! session. A tick always finishes before the next one is scheduled.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SamplingConfig;
use crate::error::EstimatorError;
use crate::estimator::{LandmarkModels, VideoFrame, VideoSource};
use crate::pipeline::SignalProcessor;
use crate::types::{EstimatorKind, FrameObservation, MetricsSnapshot, SignalCounters};

/// Sampler diagnostics for one controller (not reset at question boundaries)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Timer ticks observed
    pub ticks: u64,
    /// Ticks skipped because the video source had no ready frame
    pub skipped_ticks: u64,
    /// Ticks whose observation reached the processor
    pub processed_frames: u64,
    /// Ticks whose results were dropped because sampling stopped mid-tick
    pub discarded_ticks: u64,
    /// Ticks whose results were dropped because the session reset mid-tick
    pub superseded_ticks: u64,
    pub estimator_failures: u64,
    pub estimator_timeouts: u64,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotReady,
    Discarded,
    Superseded,
    Published(MetricsSnapshot),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session state shared by a controller and its sampling task
#[derive(Debug)]
pub(crate) struct Session {
    processor: Mutex<SignalProcessor>,
    stats: Mutex<SamplerStats>,
    snapshots: watch::Sender<MetricsSnapshot>,
    /// Bumped on every reset, only while holding `processor`
    generation: AtomicU64,
}

impl Session {
    pub(crate) fn new(processor: SignalProcessor) -> Self {
        let (snapshots, _) = watch::channel(MetricsSnapshot::default());
        Self {
            processor: Mutex::new(processor),
            stats: Mutex::new(SamplerStats::default()),
            snapshots,
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fold an observation into the session and publish the result.
    ///
    /// Returns `None` when the session was reset after `generation` was read.
    pub(crate) fn ingest(
        &self,
        observation: &FrameObservation,
        generation: u64,
    ) -> Option<MetricsSnapshot> {
        let mut processor = lock(&self.processor);
        if self.generation() != generation {
            return None;
        }
        let snapshot = processor.process(observation);
        self.snapshots.send_replace(snapshot);
        Some(snapshot)
    }

    fn clear(&self, processor: &mut SignalProcessor) {
        processor.reset();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.snapshots.send_replace(MetricsSnapshot::default());
    }

    pub(crate) fn reset(&self) {
        let mut processor = lock(&self.processor);
        self.clear(&mut processor);
    }

    /// Latest snapshot followed by a reset, atomically with respect to ticks
    pub(crate) fn checkpoint(&self) -> MetricsSnapshot {
        let mut processor = lock(&self.processor);
        let snapshot = *self.snapshots.borrow();
        self.clear(&mut processor);
        snapshot
    }

    pub(crate) fn latest(&self) -> MetricsSnapshot {
        *self.snapshots.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.snapshots.subscribe()
    }

    pub(crate) fn counters(&self) -> SignalCounters {
        *lock(&self.processor).counters()
    }

    pub(crate) fn stats(&self) -> SamplerStats {
        *lock(&self.stats)
    }

    fn record(&self, update: impl FnOnce(&mut SamplerStats)) {
        update(&mut lock(&self.stats));
    }
}

/// Per-tick estimator bookkeeping, merged into the session stats afterwards
#[derive(Debug, Default)]
struct TickErrors {
    failures: u64,
    timeouts: u64,
}

/// Pulls frames and runs the estimators for one sampling task
pub struct FrameSampler {
    video: Arc<dyn VideoSource>,
    models: LandmarkModels,
    estimator_timeout: Option<Duration>,
}

impl FrameSampler {
    pub fn new(video: Arc<dyn VideoSource>, models: LandmarkModels, config: &SamplingConfig) -> Self {
        Self {
            video,
            models,
            estimator_timeout: config.estimator_timeout(),
        }
    }

    /// Run the three estimators against one frame.
    ///
    /// Failed or timed out calls contribute nothing to the observation.
    async fn observe(&self, frame: &VideoFrame, errors: &mut TickErrors) -> FrameObservation {
        let faces = self
            .bounded(EstimatorKind::Face, self.models.face.estimate(frame), errors)
            .await;
        let hands = self
            .bounded(EstimatorKind::Hand, self.models.hand.estimate(frame), errors)
            .await;
        let poses = self
            .bounded(EstimatorKind::Pose, self.models.pose.estimate(frame), errors)
            .await;

        FrameObservation {
            face: faces.into_iter().next(),
            hands,
            pose: poses.into_iter().next(),
        }
    }

    async fn bounded<T, F>(&self, kind: EstimatorKind, call: F, errors: &mut TickErrors) -> Vec<T>
    where
        F: Future<Output = Result<Vec<T>, EstimatorError>>,
    {
        let result = match self.estimator_timeout {
            Some(budget) => match tokio::time::timeout(budget, call).await {
                Ok(result) => result,
                Err(_) => {
                    errors.timeouts += 1;
                    warn!(estimator = %kind, budget_ms = budget.as_millis() as u64, "Estimator call timed out");
                    return Vec::new();
                }
            },
            None => call.await,
        };

        match result {
            Ok(detections) => detections,
            Err(e) => {
                errors.failures += 1;
                warn!(estimator = %kind, error = %e, "Estimator call failed");
                Vec::new()
            }
        }
    }

    /// One sampling step: guard, estimate, fold, publish
    pub(crate) async fn tick(
        &self,
        session: &Session,
        shutdown: &watch::Receiver<bool>,
    ) -> TickOutcome {
        let Some(frame) = self.video.current_frame() else {
            session.record(|s| {
                s.ticks += 1;
                s.skipped_ticks += 1;
            });
            debug!("Video source not ready, skipping tick");
            return TickOutcome::NotReady;
        };

        let generation = session.generation();
        let mut errors = TickErrors::default();
        let observation = self.observe(&frame, &mut errors).await;

        let outcome = if *shutdown.borrow() {
            debug!(frame = frame.index, "Sampling stopped mid-tick, discarding results");
            TickOutcome::Discarded
        } else {
            match session.ingest(&observation, generation) {
                Some(snapshot) => TickOutcome::Published(snapshot),
                None => {
                    debug!(frame = frame.index, "Session reset mid-tick, dropping frame");
                    TickOutcome::Superseded
                }
            }
        };

        session.record(|s| {
            s.ticks += 1;
            s.estimator_failures += errors.failures;
            s.estimator_timeouts += errors.timeouts;
            match outcome {
                TickOutcome::Discarded => s.discarded_ticks += 1,
                TickOutcome::Superseded => s.superseded_ticks += 1,
                _ => s.processed_frames += 1,
            }
        });

        outcome
    }

    /// Sampling loop; returns once `shutdown` flips to true or its sender is dropped
    pub(crate) async fn run(
        self,
        session: Arc<Session>,
        mut shutdown: watch::Receiver<bool>,
        period: Duration,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "Frame sampler running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.tick(&session, &shutdown).await == TickOutcome::Discarded {
                        break;
                    }
                }
            }
        }

        info!("Frame sampler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::flat_face;
    use crate::estimator::testing::{blind_models, Broken};
    use crate::estimator::FaceMeshEstimator;
    use crate::types::FaceLandmarks;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Camera {
        ready: AtomicBool,
    }

    impl Camera {
        fn new(ready: bool) -> Arc<Self> {
            Arc::new(Self {
                ready: AtomicBool::new(ready),
            })
        }
    }

    impl VideoSource for Camera {
        fn current_frame(&self) -> Option<VideoFrame> {
            self.ready
                .load(Ordering::SeqCst)
                .then(|| VideoFrame::without_pixels(0, 640, 480))
        }
    }

    struct Staring;

    #[async_trait]
    impl FaceMeshEstimator for Staring {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
            Ok(vec![flat_face(320.0, 240.0)])
        }
    }

    struct Slow;

    #[async_trait]
    impl FaceMeshEstimator for Slow {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(vec![flat_face(320.0, 240.0)])
        }
    }

    struct Hanging;

    #[async_trait]
    impl FaceMeshEstimator for Hanging {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
            std::future::pending().await
        }
    }

    fn sampler(camera: Arc<Camera>, face: Arc<dyn FaceMeshEstimator>) -> FrameSampler {
        let models = LandmarkModels {
            face,
            ..blind_models()
        };
        FrameSampler::new(camera, models, &SamplingConfig::default())
    }

    fn session() -> Session {
        Session::new(SignalProcessor::new())
    }

    #[tokio::test]
    async fn test_not_ready_tick_is_skipped() {
        let session = session();
        let (_tx, rx) = watch::channel(false);
        let sampler = sampler(Camera::new(false), Arc::new(Staring));

        assert_eq!(sampler.tick(&session, &rx).await, TickOutcome::NotReady);
        assert_eq!(session.counters().total_frames, 0);
        assert_eq!(session.stats().skipped_ticks, 1);
    }

    #[tokio::test]
    async fn test_ready_tick_publishes() {
        let session = session();
        let mut snapshots = session.subscribe();
        let (_tx, rx) = watch::channel(false);
        let sampler = sampler(Camera::new(true), Arc::new(Staring));

        let outcome = sampler.tick(&session, &rx).await;
        let TickOutcome::Published(snapshot) = outcome else {
            panic!("expected a published snapshot, got {outcome:?}");
        };

        assert_eq!(snapshot.eye_contact_percent, 100);
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(*snapshots.borrow_and_update(), snapshot);
        assert_eq!(session.counters().total_frames, 1);
    }

    #[tokio::test]
    async fn test_estimator_failure_counts_frame_without_detection() {
        let session = session();
        let (_tx, rx) = watch::channel(false);
        let sampler = sampler(Camera::new(true), Arc::new(Broken));

        let outcome = sampler.tick(&session, &rx).await;

        assert_eq!(outcome, TickOutcome::Published(MetricsSnapshot::default()));
        assert_eq!(session.counters().total_frames, 1);
        assert_eq!(session.counters().eye_contact_frames, 0);
        assert_eq!(session.stats().estimator_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_estimator_times_out() {
        let session = session();
        let (_tx, rx) = watch::channel(false);
        let sampler = sampler(Camera::new(true), Arc::new(Hanging));

        let outcome = sampler.tick(&session, &rx).await;

        assert!(matches!(outcome, TickOutcome::Published(_)));
        assert_eq!(session.stats().estimator_timeouts, 1);
        assert_eq!(session.counters().total_frames, 1);
    }

    #[tokio::test]
    async fn test_stopped_mid_tick_discards_results() {
        let session = session();
        let (tx, rx) = watch::channel(false);
        let sampler = sampler(Camera::new(true), Arc::new(Staring));
        tx.send_replace(true);

        assert_eq!(sampler.tick(&session, &rx).await, TickOutcome::Discarded);
        assert_eq!(session.counters().total_frames, 0);
        assert!(session.latest().is_zero());
        assert_eq!(session.stats().discarded_ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_mid_tick_drops_the_frame() {
        let session = session();
        let (_tx, rx) = watch::channel(false);
        let sampler = sampler(Camera::new(true), Arc::new(Slow));

        let (outcome, _) = tokio::join!(sampler.tick(&session, &rx), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.reset();
        });

        assert_eq!(outcome, TickOutcome::Superseded);
        assert_eq!(session.counters().total_frames, 0);
        assert!(session.latest().is_zero());
        assert_eq!(session.stats().superseded_ticks, 1);
        assert_eq!(session.stats().processed_frames, 0);

        // The next tick belongs to the new question
        assert!(matches!(sampler.tick(&session, &rx).await, TickOutcome::Published(_)));
        assert_eq!(session.counters().total_frames, 1);
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let session = session();
        let stale = session.generation();
        session.checkpoint();

        assert!(session.ingest(&FrameObservation::default(), stale).is_none());
        assert!(session
            .ingest(&FrameObservation::default(), session.generation())
            .is_some());
    }

    #[test]
    fn test_checkpoint_returns_then_resets() {
        let session = session();
        let observation = FrameObservation {
            face: Some(flat_face(320.0, 240.0)),
            ..Default::default()
        };
        session.ingest(&observation, session.generation());

        let captured = session.checkpoint();
        assert_eq!(captured.eye_contact_percent, 100);
        assert!(session.latest().is_zero());
        assert_eq!(session.counters().total_frames, 0);
    }
}
