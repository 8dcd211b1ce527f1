// 공유 타임라인 - 오디오/비디오 파이프라인이 공유하는 단조 기준 시각
// 기준 시각은 첫 비디오 프레임에서 한 번만 설정됨

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// 단조 시계 (테스트에서 교체 가능)
pub trait Clock: Send + Sync {
    /// 임의 원점 기준 경과 시간 (단조 증가)
    fn now(&self) -> Duration;
}

/// `Instant` 기반 단조 시계
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Default)]
struct TimelineState {
    /// 기준 시각 (한 번 설정되면 세션 동안 불변)
    baseline: Option<Duration>,
    /// 마지막 비디오 상대 타임스탬프
    last_relative: Duration,
}

/// 공유 타임라인
///
/// 비디오 타임스탬프는 기준 시각이 없으면 현재 시각으로 기준을 잡고,
/// 오디오 타임스탬프는 기준 시각이 있을 때만 계산된다.
pub struct SharedTimeline {
    clock: Arc<dyn Clock>,
    state: Mutex<TimelineState>,
}

impl SharedTimeline {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(TimelineState::default()),
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .baseline
            .is_some()
    }

    /// 비디오 타임스탬프 - 기준 시각 check-and-set 후 `now - baseline`
    ///
    /// 반환값은 비감소이며 `last_timestamp()`에 반영된다.
    pub fn video_timestamp(&self) -> Duration {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let baseline = *state.baseline.get_or_insert(now);
        let relative = now.saturating_sub(baseline).max(state.last_relative);
        state.last_relative = relative;
        relative
    }

    /// 오디오 타임스탬프 - 기준 시각이 없으면 None
    pub fn audio_timestamp(&self) -> Option<Duration> {
        let now = self.clock.now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.baseline.map(|baseline| now.saturating_sub(baseline))
    }

    /// 마지막 비디오 상대 타임스탬프 (세션 길이 메타데이터용)
    pub fn last_timestamp(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_relative
    }
}
