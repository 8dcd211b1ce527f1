// libopus 오디오 코덱 - opus 크레이트 기반 AudioCodec 구현

use crate::codec::{AudioCodec, AudioEncoder};
use crate::error::CodecError;

/// libopus 코덱 팩토리 (OPUS_APPLICATION_AUDIO)
pub struct LibOpusCodec;

impl AudioCodec for LibOpusCodec {
    fn name(&self) -> &str {
        "libopus"
    }

    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn AudioEncoder>, CodecError> {
        let channels = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            n => {
                return Err(CodecError::new(format!(
                    "Opus supports 1 or 2 channels, got {}",
                    n
                )))
            }
        };

        let encoder = opus::Encoder::new(sample_rate, channels, opus::Application::Audio)
            .map_err(|e| CodecError::new(format!("Failed to create Opus encoder: {}", e)))?;

        Ok(Box::new(LibOpusEncoder { encoder }))
    }
}

struct LibOpusEncoder {
    encoder: opus::Encoder,
}

// SAFETY: 인코더 인스턴스는 독립적이며 세션이 Mutex로 단일 스레드 접근만 허용
unsafe impl Send for LibOpusEncoder {}

impl AudioEncoder for LibOpusEncoder {
    fn set_bitrate(&mut self, bits_per_second: u32) -> Result<(), CodecError> {
        let bits = i32::try_from(bits_per_second)
            .map_err(|_| CodecError::new(format!("bitrate {} out of range", bits_per_second)))?;
        self.encoder
            .set_bitrate(opus::Bitrate::Bits(bits))
            .map_err(|e| CodecError::new(format!("Failed to set bitrate: {}", e)))
    }

    fn lookahead(&mut self) -> Result<u32, CodecError> {
        let samples = self
            .encoder
            .get_lookahead()
            .map_err(|e| CodecError::new(format!("Failed to query lookahead: {}", e)))?;
        u32::try_from(samples)
            .map_err(|_| CodecError::new(format!("invalid lookahead {}", samples)))
    }

    fn encode(
        &mut self,
        pcm: &[i16],
        _frames_per_channel: usize,
        output: &mut [u8],
    ) -> Result<usize, CodecError> {
        // opus 크레이트는 pcm.len() / channels로 프레임 크기를 계산
        self.encoder
            .encode(pcm, output)
            .map_err(|e| CodecError::new(format!("Opus encoding failed: {}", e)))
    }
}
