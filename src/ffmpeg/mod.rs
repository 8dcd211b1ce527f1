// FFmpeg 백엔드 모듈
// VP8 인코딩(libvpx) + WebM 먹싱(libavformat)

pub mod vp8;
pub mod webm;

pub use vp8::Vp8Codec;
pub use webm::WebmMuxer;
