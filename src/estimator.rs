//! Capability providers
//!
//! The engine never runs a model itself. The caller supplies a video source and
//! three landmark estimators (face mesh, hand pose, body pose) behind these
//! traits, plus a [`ModelLoader`] that builds the estimators. [`ModelProvider`]
//! loads them at most once per process and can be shared between sessions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{AnalysisError, EstimatorError};
use crate::types::{FaceLandmarks, HandLandmarks, PoseLandmarks};

/// A frame handed to the estimators.
///
/// `pixels` is opaque to the engine; estimators interpret it.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Monotonic frame number assigned by the source
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub pixels: Arc<[u8]>,
}

impl VideoFrame {
    /// A frame without pixel data, for sources whose estimators look frames up by index
    pub fn without_pixels(index: u64, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            captured_at: Utc::now(),
            pixels: Arc::from(Vec::new()),
        }
    }
}

/// Live video supplied by the caller
pub trait VideoSource: Send + Sync {
    /// Current frame, or `None` while the source is not ready
    fn current_frame(&self) -> Option<VideoFrame>;
}

#[async_trait]
pub trait FaceMeshEstimator: Send + Sync {
    /// Zero or one face
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError>;
}

#[async_trait]
pub trait HandPoseEstimator: Send + Sync {
    /// Zero or more hands
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<HandLandmarks>, EstimatorError>;
}

#[async_trait]
pub trait BodyPoseEstimator: Send + Sync {
    /// Zero or one pose
    async fn estimate(&self, frame: &VideoFrame) -> Result<Vec<PoseLandmarks>, EstimatorError>;
}

/// The three loaded estimators
#[derive(Clone)]
pub struct LandmarkModels {
    pub face: Arc<dyn FaceMeshEstimator>,
    pub hand: Arc<dyn HandPoseEstimator>,
    pub pose: Arc<dyn BodyPoseEstimator>,
}

impl fmt::Debug for LandmarkModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LandmarkModels").finish_non_exhaustive()
    }
}

/// Builds the estimators (downloads weights, warms up backends, ...)
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<LandmarkModels, AnalysisError>;
}

/// Load-once holder for the landmark models.
///
/// Concurrent callers share a single in-flight load. A failed load leaves the
/// provider empty so a later call can retry.
pub struct ModelProvider {
    loader: Arc<dyn ModelLoader>,
    models: OnceCell<LandmarkModels>,
}

impl ModelProvider {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: OnceCell::new(),
        }
    }

    /// Provider around models that are already built
    pub fn preloaded(models: LandmarkModels) -> Self {
        struct Ready(LandmarkModels);

        #[async_trait]
        impl ModelLoader for Ready {
            async fn load(&self) -> Result<LandmarkModels, AnalysisError> {
                Ok(self.0.clone())
            }
        }

        Self {
            loader: Arc::new(Ready(models.clone())),
            models: OnceCell::new_with(Some(models)),
        }
    }

    /// Loaded models, loading them first if needed
    pub async fn models(&self) -> Result<&LandmarkModels, AnalysisError> {
        self.models
            .get_or_try_init(|| async {
                info!("Loading landmark models");
                match self.loader.load().await {
                    Ok(models) => {
                        info!("Landmark models loaded");
                        Ok(models)
                    }
                    Err(e) => {
                        warn!(error = %e, "Landmark model load failed");
                        Err(e)
                    }
                }
            })
            .await
    }

    pub fn is_loaded(&self) -> bool {
        self.models.initialized()
    }
}

impl fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProvider")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::types::EstimatorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Estimators that always report nothing
    pub struct Blind;

    #[async_trait]
    impl FaceMeshEstimator for Blind {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl HandPoseEstimator for Blind {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<HandLandmarks>, EstimatorError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl BodyPoseEstimator for Blind {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<PoseLandmarks>, EstimatorError> {
            Ok(Vec::new())
        }
    }

    pub fn blind_models() -> LandmarkModels {
        let blind = Arc::new(Blind);
        LandmarkModels {
            face: blind.clone(),
            hand: blind.clone(),
            pose: blind,
        }
    }

    /// Loader that counts calls, optionally failing, optionally slow
    #[derive(Default)]
    pub struct CountingLoader {
        pub calls: AtomicUsize,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self) -> Result<LandmarkModels, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AnalysisError::ModelLoad("weights unavailable".to_string()));
            }
            Ok(blind_models())
        }
    }

    /// Face estimator that always errors
    pub struct Broken;

    #[async_trait]
    impl FaceMeshEstimator for Broken {
        async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
            Err(EstimatorError::new(EstimatorKind::Face, "backend lost"))
        }
    }
}
