// WebM 녹화 엔진
// Opus 오디오 + VP8 비디오 → 단일 WebM 파일 (실시간 캡처용)

pub mod codec;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ffi;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod mux;
pub mod timeline;

#[cfg(test)]
mod test_support;

pub use config::{BoundedString, SessionConfig, MAX_OUTPUT_TARGET_LEN};
pub use encoding::{AudioBatch, Backends, Session, SessionState, SessionStats, VideoFrame};
pub use error::{CodecError, EncoderError, MuxError};

// FFI 함수들을 최상위에서 재export
pub use ffi::*;
