use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use poise::report::FeedbackLevel;
use poise::types::{face_mesh, FaceLandmarks, HandLandmarks, LandmarkPoint, PoseLandmarks};
use poise::{
    replay_records, AnalyzerConfig, BodyPoseEstimator, EstimatorError, FaceMeshEstimator,
    FrameRecordAdapter, HandPoseEstimator, InterviewRecorder, LandmarkModels, LifecycleController,
    ModelProvider, ReportEncoder, SamplerState, VideoFrame, VideoSource,
};

const TICK: Duration = Duration::from_millis(500);

struct Webcam {
    frames: AtomicU64,
}

impl VideoSource for Webcam {
    fn current_frame(&self) -> Option<VideoFrame> {
        let index = self.frames.fetch_add(1, Ordering::SeqCst);
        Some(VideoFrame::without_pixels(index, 640, 480))
    }
}

/// Face mesh that reports a face looking at the camera while `looking` is set
struct Candidate {
    looking: AtomicBool,
}

#[async_trait]
impl FaceMeshEstimator for Candidate {
    async fn estimate(&self, _: &VideoFrame) -> Result<Vec<FaceLandmarks>, EstimatorError> {
        if !self.looking.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let point = LandmarkPoint::new(320.0, 240.0);
        Ok(vec![FaceLandmarks::new(vec![point; face_mesh::REFINED_POINT_COUNT])])
    }
}

#[async_trait]
impl HandPoseEstimator for Candidate {
    async fn estimate(&self, _: &VideoFrame) -> Result<Vec<HandLandmarks>, EstimatorError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl BodyPoseEstimator for Candidate {
    async fn estimate(&self, _: &VideoFrame) -> Result<Vec<PoseLandmarks>, EstimatorError> {
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn two_question_interview_produces_report() {
    let candidate = Arc::new(Candidate {
        looking: AtomicBool::new(true),
    });
    let models = LandmarkModels {
        face: candidate.clone(),
        hand: candidate.clone(),
        pose: candidate.clone(),
    };
    let provider = Arc::new(ModelProvider::preloaded(models));
    let mut controller = LifecycleController::new(provider, AnalyzerConfig::default()).unwrap();
    let webcam = Arc::new(Webcam {
        frames: AtomicU64::new(0),
    });
    let mut recorder = InterviewRecorder::new();

    controller.start(webcam.clone(), true).await.unwrap();
    assert_eq!(controller.state(), SamplerState::Sampling);

    // Question 0: four ticks looking at the camera
    tokio::time::sleep(TICK * 3 + TICK / 2).await;
    let first = controller.checkpoint();
    assert_eq!(first.eye_contact_percent, 100);
    assert!(controller.latest_metrics().is_zero());
    recorder.record(0, first);

    // Question 1: four ticks looking away
    candidate.looking.store(false, Ordering::SeqCst);
    tokio::time::sleep(TICK * 4).await;
    assert_eq!(controller.counters().total_frames, 4);
    recorder.record(1, controller.checkpoint());

    controller.shutdown().await;
    assert_eq!(controller.state(), SamplerState::Idle);
    assert_eq!(webcam.frames.load(Ordering::SeqCst), 8);

    let report = ReportEncoder::with_instance_id("session-1".to_string()).encode(&recorder);
    let summary = report.summary.unwrap();
    assert_eq!(summary.averages.eye_contact_percent, 50);
    assert_eq!(
        summary.summary,
        "Moderate eye contact. Work on improving posture. Try to use hands a bit more for expression"
    );

    let feedback = report.feedback.unwrap();
    assert_eq!(feedback.eye_contact.level, FeedbackLevel::NeedsImprovement);
    assert_eq!(feedback.posture.level, FeedbackLevel::Poor);
    assert_eq!(feedback.recommendations.len(), 3);
}

#[test]
fn replaying_a_recording_captures_each_question() {
    let ndjson = r#"
{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:00Z", "question": 0, "observation": {"hands": [{"keypoints": []}]}}
{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:00.5Z", "question": 0}
{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:01Z", "question": 1, "video_ready": false}
{"schema_version": "poise.frame_record.v1", "timestamp": "2024-01-15T08:30:01.5Z", "question": 1}
"#;

    let records = FrameRecordAdapter::parse_ndjson(ndjson).unwrap();
    let output = replay_records(&records, &AnalyzerConfig::default()).unwrap();

    assert_eq!(output.snapshots.len(), 3);
    assert_eq!(output.skipped, 1);

    let captured = output.recorder.captured();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].metrics.hand_presence_percent, 50);
    assert_eq!(captured[1].metrics.hand_presence_percent, 0);
}
