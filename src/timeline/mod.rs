// 타이밍 모듈
// 유리수 프레임레이트 + 오디오/비디오 공유 타임라인

pub mod frame_rate;
pub mod shared;

pub use frame_rate::{KeyframeInterval, RationalFrameRate};
pub use shared::{Clock, MonotonicClock, SharedTimeline};
