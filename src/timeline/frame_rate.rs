// 유리수 프레임레이트 - 소수 fps를 분자/분모로 변환 + 키프레임 간격 계산
// 부동소수 타임스탬프 누적 오차 방지용

use crate::error::EncoderError;

/// 키프레임 간격 목표 (초)
const KEYFRAME_SPACING_SECS: f64 = 2.0;

/// 정확한 분자/분모 프레임레이트
///
/// 인코더 timebase로 그대로 사용된다 (`numerator / denominator` 초 = 1 프레임).
/// 정수 fps는 `1000 / (fps × 1000)`, 소수 fps는 `1001 / (floor × 1000 + 1000)`
/// 로 표현된다 (29.97 → 1001/30000).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RationalFrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl RationalFrameRate {
    /// 소수 fps → 유리수
    ///
    /// 소수부가 0보다 크면(허용 오차 없이 `> 0`) 항상 소수 분기로 분류된다.
    pub fn from_fps(rate: f64) -> Result<Self, EncoderError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EncoderError::InvalidConfig(format!(
                "frame rate must be a positive number, got {}",
                rate
            )));
        }

        let whole = rate.floor();
        let decimal = rate - whole;

        let mut numerator = 1000.0;
        let mut denominator = whole * 1000.0;
        if decimal > 0.0 {
            numerator += 1.0;
            denominator += 1000.0;
        }

        if denominator > f64::from(u32::MAX) {
            return Err(EncoderError::InvalidConfig(format!(
                "frame rate {} is out of range",
                rate
            )));
        }

        Ok(Self {
            numerator: numerator as u32,
            denominator: denominator as u32,
        })
    }

    /// 약 2초마다 강제 키프레임이 오도록 간격 계산
    pub fn keyframe_interval(&self) -> KeyframeInterval {
        let frames = (f64::from(self.denominator) / f64::from(self.numerator)
            * KEYFRAME_SPACING_SECS)
            .round();
        KeyframeInterval(frames.max(1.0) as u32)
    }

    /// 유리수가 나타내는 fps
    pub fn fps(&self) -> f64 {
        f64::from(self.denominator) / f64::from(self.numerator)
    }
}

/// 강제 키프레임 간격 (프레임 수, 항상 1 이상)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyframeInterval(u32);

impl KeyframeInterval {
    pub fn frames(&self) -> u32 {
        self.0
    }

    /// frame_index가 강제 키프레임 경계인지
    pub fn is_boundary(&self, frame_index: i64) -> bool {
        frame_index.rem_euclid(i64::from(self.0)) == 0
    }
}
