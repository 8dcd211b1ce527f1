// 인코딩 모듈
// Opus 오디오 + VP8 비디오 → WebM 컨테이너 (실시간 녹화 세션)

pub mod audio_pipeline;
pub mod session;
pub mod video_pipeline;

use std::sync::atomic::AtomicU64;

pub use audio_pipeline::{AudioBatch, AudioPipeline};
pub use session::{Backends, Session, SessionState, SessionStats};
pub use video_pipeline::{VideoFrame, VideoPipeline, VideoSettings};

/// 싱크가 수락한 유닛 카운터 (파이프라인 ↔ 세션 공유)
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub video_frames: AtomicU64,
    pub audio_packets: AtomicU64,
}
