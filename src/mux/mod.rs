// 먹싱 싱크 모듈
// 압축된 오디오/비디오 유닛을 하나의 타임스탬프 컨테이너 스트림으로 인터리빙

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::MuxError;

/// Matroska 코덱 ID
pub const OPUS_CODEC_ID: &str = "A_OPUS";
pub const VP8_CODEC_ID: &str = "V_VP8";

/// Opus 트랙 seek pre-roll (80ms)
pub const OPUS_SEEK_PRE_ROLL: Duration = Duration::from_nanos(80_000_000);

/// 싱크가 부여한 트랙 번호
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u64);

/// 비디오 트랙 색 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Colour {
    pub bits_per_channel: u8,
    pub chroma_subsampling_horz: u8,
    pub chroma_subsampling_vert: u8,
}

impl Colour {
    /// 8bit, 크로마 서브샘플링 1/1
    pub fn eight_bit() -> Self {
        Self {
            bits_per_channel: 8,
            chroma_subsampling_horz: 1,
            chroma_subsampling_vert: 1,
        }
    }
}

/// 오디오 트랙 설정 (create 시 한 번 생성, 이후 불변)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackConfig {
    pub codec_id: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    /// 디코더 초기화용 CodecPrivate (OpusHead)
    pub codec_private: Vec<u8>,
    pub seek_pre_roll: Duration,
    pub codec_delay: Duration,
}

/// 비디오 트랙 설정 (create 시 한 번 생성, 이후 불변)
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrackConfig {
    pub codec_id: &'static str,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub colour: Colour,
}

/// 인코드 호출마다 생성되어 즉시 싱크로 전달되는 압축 유닛
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedUnit<'a> {
    pub payload: &'a [u8],
    /// 기준 시각 대비 상대 타임스탬프
    pub timestamp: Duration,
    pub track: TrackId,
    /// 독립 디코딩 가능 (코덱 판단 또는 강제)
    pub key: bool,
    /// 키프레임 주기에 의해 강제된 키프레임
    pub forced_key: bool,
}

/// 출력 대상 열기
pub trait Muxer: Send + Sync {
    fn name(&self) -> &str;

    /// writer + segment 생성 (실패 시 구현체가 할당분 정리)
    fn open(&self, target: &str) -> Result<Box<dyn MuxSink>, MuxError>;
}

/// 열린 컨테이너 segment
///
/// 동시 append에 안전하지 않다고 가정하며 세션이 `SharedSink`로 직렬화한다.
pub trait MuxSink: Send {
    fn add_audio_track(&mut self, config: &AudioTrackConfig) -> Result<TrackId, MuxError>;

    fn add_video_track(&mut self, config: &VideoTrackConfig) -> Result<TrackId, MuxError>;

    /// 트랙을 인덱스(Cues/seek table)에 포함
    fn mark_for_index(&mut self, track: TrackId) -> Result<(), MuxError>;

    fn append(&mut self, unit: &CompressedUnit<'_>) -> Result<(), MuxError>;

    /// 세션 길이 메타데이터
    fn set_duration(&mut self, duration: Duration);

    /// 먹싱 스트림 마무리 (cues, segment 크기 등)
    fn finalize(&mut self) -> Result<(), MuxError>;

    /// 출력 대상 닫기
    fn close(&mut self) -> Result<(), MuxError>;
}

/// 두 파이프라인이 공유하는 싱크 (단일 상호 배제 경계)
pub struct SharedSink {
    inner: Mutex<Option<Box<dyn MuxSink>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// 잠금 획득 (poison 시 복구)
    pub fn lock(&self) -> MutexGuard<'_, Option<Box<dyn MuxSink>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// 열린 싱크 설치
    pub fn install(&self, sink: Box<dyn MuxSink>) {
        *self.lock() = Some(sink);
    }

    /// 싱크 소유권 회수 (teardown용)
    pub fn take(&self) -> Option<Box<dyn MuxSink>> {
        self.lock().take()
    }
}

impl Default for SharedSink {
    fn default() -> Self {
        Self::new()
    }
}
