// 세션 설정 - 출력 대상, 비트레이트, 프레임레이트, 오디오 포맷
// 출력 경로는 용량 제한 문자열로 보관 (초과 시 즉시 실패)

use crate::error::EncoderError;

/// 출력 대상 식별자(경로/URL) 최대 길이 (bytes)
pub const MAX_OUTPUT_TARGET_LEN: usize = 1024;

/// 기본값
const DEFAULT_BIT_RATE_KBPS: u32 = 1000;
const DEFAULT_FRAME_RATE: f64 = 30.0;
const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_CHANNELS: u16 = 2;

/// 용량이 명시된 문자열
///
/// 고정 크기 버퍼와 달리 범위 검사를 하며, 용량을 넘는 쓰기는
/// 내용을 바꾸지 않고 `CapacityExceeded`로 실패한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedString {
    value: String,
    capacity: usize,
}

impl BoundedString {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            value: String::new(),
            capacity,
        }
    }

    /// 문자열로부터 생성 (용량 초과 시 에러)
    pub fn from_str_bounded(s: &str, capacity: usize) -> Result<Self, EncoderError> {
        let mut bounded = Self::with_capacity(capacity);
        bounded.push_str(s)?;
        Ok(bounded)
    }

    /// 문자열 추가 - 용량 초과 시 아무것도 쓰지 않고 실패
    pub fn push_str(&mut self, s: &str) -> Result<(), EncoderError> {
        let requested = self.value.len() + s.len();
        if requested > self.capacity {
            return Err(EncoderError::CapacityExceeded {
                capacity: self.capacity,
                requested,
            });
        }
        self.value.push_str(s);
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Display for BoundedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// 세션 설정
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 출력 대상 (파일 경로 등)
    pub output: BoundedString,
    /// 비디오 목표 비트레이트 (kbit/s)
    pub bit_rate_kbps: u32,
    /// 비디오 프레임레이트 (29.97 같은 소수 허용)
    pub frame_rate: f64,
    /// 오디오 샘플레이트 (Hz)
    pub sample_rate: u32,
    /// 오디오 채널 수 (1=mono, 2=stereo)
    pub channels: u16,
}

impl SessionConfig {
    /// 기본값으로 설정 생성 (1000kbps, 30fps, 48kHz stereo)
    pub fn new(output: &str) -> Result<Self, EncoderError> {
        Ok(Self {
            output: BoundedString::from_str_bounded(output, MAX_OUTPUT_TARGET_LEN)?,
            bit_rate_kbps: DEFAULT_BIT_RATE_KBPS,
            frame_rate: DEFAULT_FRAME_RATE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        })
    }

    pub fn with_bit_rate_kbps(mut self, bit_rate_kbps: u32) -> Self {
        self.bit_rate_kbps = bit_rate_kbps;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.output.is_empty() {
            return Err(EncoderError::InvalidConfig("output target is empty".to_string()));
        }
        if self.bit_rate_kbps == 0 {
            return Err(EncoderError::InvalidConfig("bit rate must be positive".to_string()));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(EncoderError::InvalidConfig(format!(
                "frame rate must be a positive number, got {}",
                self.frame_rate
            )));
        }
        if self.sample_rate == 0 {
            return Err(EncoderError::InvalidConfig("sample rate must be positive".to_string()));
        }
        // OpusHead 매핑 패밀리 0 → mono/stereo만 가능
        if !(1..=2).contains(&self.channels) {
            return Err(EncoderError::InvalidConfig(format!(
                "channel count must be 1 or 2, got {}",
                self.channels
            )));
        }
        Ok(())
    }
}
