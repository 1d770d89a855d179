//! Poise - real-time body-language signals for interview practice
//!
//! Poise samples a live video feed at a fixed interval, runs caller-supplied
//! face mesh, hand pose and body pose estimators on each frame, and turns the
//! landmarks into smoothed session metrics: eye contact, posture, speaking,
//! head tilt, gestures, smiling, engagement and confidence.
//!
//! ## Modules
//!
//! - **Signal pipeline**: geometry → per-frame detectors → session counters →
//!   composite scores → moving-average smoothing → metrics snapshot
//! - **Live sampling**: frame sampler and lifecycle controller on tokio
//! - **Offline**: recorded frame schema, replay, and interview reports

pub mod config;
pub mod controller;
pub mod detectors;
pub mod error;
pub mod estimator;
pub mod geometry;
pub mod pipeline;
pub mod replay;
pub mod report;
pub mod sampler;
pub mod schema;
pub mod smoother;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::AnalyzerConfig;
pub use controller::{LifecycleController, SamplerState};
pub use error::{AnalysisError, EstimatorError};
pub use estimator::{
    BodyPoseEstimator, FaceMeshEstimator, HandPoseEstimator, LandmarkModels, ModelLoader,
    ModelProvider, VideoFrame, VideoSource,
};
pub use pipeline::{process_observations, SignalProcessor};
pub use types::{FrameObservation, MetricsSnapshot};

// Schema exports
pub use schema::{FrameRecord, FrameRecordAdapter, SCHEMA_VERSION};

// Offline exports
pub use replay::{replay_records, simulate_records, ReplayFeed};
pub use report::{BodyLanguageReport, InterviewRecorder, ReportEncoder};

/// Poise version embedded in every report
pub const POISE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "poise";
