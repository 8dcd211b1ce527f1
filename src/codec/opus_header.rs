// OpusHead 식별 헤더 - Matroska CodecPrivate용 19바이트 고정 포맷

use std::time::Duration;

/// 헤더 크기 (bytes)
pub const OPUS_HEADER_SIZE: usize = 19;

const SIGNATURE: &[u8; 8] = b"OpusHead";
const VERSION: u8 = 1;

/// Opus 식별 헤더
///
/// 레이아웃: 시그니처(8) | 버전(1) | 채널(1) | pre-skip LE16 | 샘플레이트 LE32 |
/// 출력 게인 LE16 (0) | 채널 매핑 패밀리 (0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHeader {
    pub channels: u8,
    pub pre_skip: u16,
    pub sample_rate: u32,
}

impl OpusHeader {
    pub fn new(channels: u8, pre_skip: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            pre_skip,
            sample_rate,
        }
    }

    pub fn to_bytes(&self) -> [u8; OPUS_HEADER_SIZE] {
        let mut header = [0u8; OPUS_HEADER_SIZE];
        header[..8].copy_from_slice(SIGNATURE);
        header[8] = VERSION;
        header[9] = self.channels;
        header[10..12].copy_from_slice(&self.pre_skip.to_le_bytes());
        header[12..16].copy_from_slice(&self.sample_rate.to_le_bytes());
        // 16..19: 출력 게인 + 매핑 패밀리 = 0
        header
    }

    /// 트랙 CodecDelay (pre_skip × 1e9 / sample_rate ns)
    pub fn codec_delay(&self) -> Duration {
        codec_delay(self.pre_skip, self.sample_rate)
    }
}

pub fn codec_delay(pre_skip: u16, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(u64::from(pre_skip) * 1_000_000_000 / u64::from(sample_rate))
}
