//! Lifecycle controller
//!
//! Owns one analysis session: the shared processor state and, while enabled,
//! the background sampling task. The host drives it with
//! [`LifecycleController::start`], [`LifecycleController::reset`] at question
//! boundaries, and [`LifecycleController::stop`] (or drop) on teardown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::estimator::{ModelProvider, VideoSource};
use crate::pipeline::SignalProcessor;
use crate::sampler::{FrameSampler, SamplerStats, Session};
use crate::types::{MetricsSnapshot, SignalCounters};

/// Whether a sampling task is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Sampling,
}

struct SamplingTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Host-facing handle for one analysis session.
///
/// Must be used from within a tokio runtime.
pub struct LifecycleController {
    provider: Arc<ModelProvider>,
    config: AnalyzerConfig,
    session: Arc<Session>,
    task: Option<SamplingTask>,
}

impl LifecycleController {
    /// Create an idle controller. The provider may be shared with other sessions.
    pub fn new(provider: Arc<ModelProvider>, config: AnalyzerConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let session = Arc::new(Session::new(SignalProcessor::with_config(&config)));
        Ok(Self {
            provider,
            config,
            session,
            task: None,
        })
    }

    /// Enable or disable sampling against `video`.
    ///
    /// Enabling loads the landmark models first (once per provider); on failure
    /// the error is returned and the controller stays idle. Enabling while
    /// already sampling has no effect. `enabled = false` behaves like
    /// [`LifecycleController::stop`].
    pub async fn start(
        &mut self,
        video: Arc<dyn VideoSource>,
        enabled: bool,
    ) -> Result<(), AnalysisError> {
        if !enabled {
            self.stop();
            return Ok(());
        }
        if self.state() == SamplerState::Sampling {
            debug!("Sampling already active");
            return Ok(());
        }

        let models = self.provider.models().await?.clone();
        let sampler = FrameSampler::new(video, models, &self.config.sampling);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let period = self.config.sampling.interval();
        let handle = tokio::spawn(sampler.run(self.session.clone(), shutdown_rx, period));

        self.task = Some(SamplingTask { shutdown, handle });
        info!(interval_ms = self.config.sampling.interval_ms, "Body language sampling started");
        Ok(())
    }

    /// Cancel the sampling task. A tick already in flight finishes but does
    /// not update state or publish.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            // The task may have exited already; nothing left to signal then
            let _ = task.shutdown.send(true);
            info!("Body language sampling stopped");
        }
    }

    /// Stop and wait for the sampling task to exit
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.shutdown.send(true);
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Sampling task ended abnormally");
            }
            info!("Body language sampling shut down");
        }
    }

    /// Zero counters and smoothers and publish the all-zero snapshot.
    ///
    /// Sampling continues if active.
    pub fn reset(&self) {
        self.session.reset();
        debug!("Session metrics reset");
    }

    /// Capture the current snapshot and reset in one step (question boundary)
    pub fn checkpoint(&self) -> MetricsSnapshot {
        self.session.checkpoint()
    }

    /// Most recently published snapshot (all zeros before the first tick)
    pub fn latest_metrics(&self) -> MetricsSnapshot {
        self.session.latest()
    }

    /// Change notifications for every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.session.subscribe()
    }

    pub fn state(&self) -> SamplerState {
        match &self.task {
            Some(task) if !task.handle.is_finished() => SamplerState::Sampling,
            _ => SamplerState::Idle,
        }
    }

    pub fn counters(&self) -> SignalCounters {
        self.session.counters()
    }

    pub fn stats(&self) -> SamplerStats {
        self.session.stats()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::fixtures::flat_face;
    use crate::error::EstimatorError;
    use crate::estimator::testing::{blind_models, Blind, Broken, CountingLoader};
    use crate::estimator::{FaceMeshEstimator, LandmarkModels, VideoFrame};
    use crate::types::FaceLandmarks;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(500);

    struct Camera {
        frames: AtomicU64,
    }

    impl VideoSource for Camera {
        fn current_frame(&self) -> Option<VideoFrame> {
            let index = self.frames.fetch_add(1, Ordering::SeqCst);
            Some(VideoFrame::without_pixels(index, 640, 480))
        }
    }

    fn camera() -> Arc<dyn VideoSource> {
        Arc::new(Camera {
            frames: AtomicU64::new(0),
        })
    }

    struct Staring;

    #[async_trait]
    impl FaceMeshEstimator for Staring {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
            Ok(vec![flat_face(320.0, 240.0)])
        }
    }

    fn controller_with(face: Arc<dyn FaceMeshEstimator>) -> LifecycleController {
        let models = LandmarkModels {
            face,
            ..blind_models()
        };
        let provider = Arc::new(ModelProvider::preloaded(models));
        LifecycleController::new(provider, AnalyzerConfig::default()).unwrap()
    }

    /// Sleep until just after the `n`th tick since `start` (the first fires immediately)
    async fn after_start(n: u32) {
        tokio::time::sleep(TICK * (n - 1) + TICK / 2).await;
    }

    /// Sleep over the next `n` ticks, starting between two ticks
    async fn over(n: u32) {
        tokio::time::sleep(TICK * n).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_blind_estimators_publish_zero_snapshot() {
        let mut controller = controller_with(Arc::new(Blind));
        controller.start(camera(), true).await.unwrap();
        after_start(10).await;

        assert_eq!(controller.counters().total_frames, 10);
        assert!(controller.latest_metrics().is_zero());
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_eye_contact_every_tick_reaches_100() {
        let mut controller = controller_with(Arc::new(Staring));
        controller.start(camera(), true).await.unwrap();
        after_start(10).await;

        assert_eq!(controller.counters().total_frames, 10);
        assert_eq!(controller.latest_metrics().eye_contact_percent, 100);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_published_snapshots() {
        let mut controller = controller_with(Arc::new(Staring));
        let mut updates = controller.subscribe();
        controller.start(camera(), true).await.unwrap();

        updates.changed().await.unwrap();
        assert_eq!(updates.borrow_and_update().eye_contact_percent, 100);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let mut controller = controller_with(Arc::new(Staring));
        controller.start(camera(), true).await.unwrap();
        controller.start(camera(), true).await.unwrap();
        after_start(3).await;

        // A second task would double the frame count
        assert_eq!(controller.counters().total_frames, 3);
        assert_eq!(controller.state(), SamplerState::Sampling);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_load_failure_stays_idle() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..Default::default()
        });
        let provider = Arc::new(ModelProvider::new(loader));
        let mut controller = LifecycleController::new(provider, AnalyzerConfig::default()).unwrap();

        let result = controller.start(camera(), true).await;

        assert!(matches!(result, Err(AnalysisError::ModelLoad(_))));
        assert_eq!(controller.state(), SamplerState::Idle);
        after_start(3).await;
        assert_eq!(controller.counters().total_frames, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_publishing() {
        let mut controller = controller_with(Arc::new(Staring));
        controller.start(camera(), true).await.unwrap();
        after_start(2).await;
        controller.stop();
        assert_eq!(controller.state(), SamplerState::Idle);

        let frozen = controller.counters().total_frames;
        over(5).await;
        assert_eq!(controller.counters().total_frames, frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_behaves_like_stop() {
        let mut controller = controller_with(Arc::new(Staring));
        controller.start(camera(), true).await.unwrap();
        after_start(1).await;
        controller.start(camera(), false).await.unwrap();

        assert_eq!(controller.state(), SamplerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimator_failure_still_counts_frame() {
        let mut controller = controller_with(Arc::new(Broken));
        controller.start(camera(), true).await.unwrap();
        after_start(4).await;

        assert_eq!(controller.counters().total_frames, 4);
        assert_eq!(controller.counters().eye_contact_frames, 0);
        assert_eq!(controller.stats().estimator_failures, 4);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_sampling() {
        let mut controller = controller_with(Arc::new(Staring));
        controller.start(camera(), true).await.unwrap();
        after_start(3).await;

        controller.reset();
        assert!(controller.latest_metrics().is_zero());
        assert_eq!(controller.counters().total_frames, 0);

        over(1).await;
        assert_eq!(controller.counters().total_frames, 1);
        assert_eq!(controller.state(), SamplerState::Sampling);
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_provider_loads_once() {
        let loader = Arc::new(CountingLoader::default());
        let provider = Arc::new(ModelProvider::new(loader.clone()));

        let mut first = LifecycleController::new(provider.clone(), AnalyzerConfig::default()).unwrap();
        let mut second = LifecycleController::new(provider, AnalyzerConfig::default()).unwrap();
        first.start(camera(), true).await.unwrap();
        second.start(camera(), true).await.unwrap();

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        first.shutdown().await;
        second.shutdown().await;
    }

    #[test]
    fn test_rejects_invalid_config() {
        let provider = Arc::new(ModelProvider::preloaded(blind_models()));
        let config = AnalyzerConfig {
            smoothing_window: 0,
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            LifecycleController::new(provider, config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }
}
