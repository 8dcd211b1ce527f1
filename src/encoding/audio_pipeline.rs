// 오디오 파이프라인 - s16le PCM → Opus 인코딩 → 먹싱 싱크
// 타임라인 기준 시각은 비디오가 잡음 (첫 비디오 프레임 전 오디오는 거부)

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::codec::{AudioCodec, AudioEncoder, OpusHeader, OPUS_HEADER_SIZE};
use crate::encoding::SessionCounters;
use crate::error::EncoderError;
use crate::mux::{
    AudioTrackConfig, CompressedUnit, SharedSink, TrackId, OPUS_CODEC_ID, OPUS_SEEK_PRE_ROLL,
};
use crate::timeline::SharedTimeline;

/// Opus 고정 비트레이트 (bits/sec)
pub const AUDIO_BITRATE: u32 = 64000;

/// PCM 변환 버퍼 크기 (interleaved 샘플 수, 120ms @ 48kHz)
pub const MAX_FRAME_SIZE: usize = 6 * 960;

/// 압축 패킷 최대 크기 (bytes)
pub const MAX_PACKET_SIZE: usize = 3828;

const BYTES_PER_SAMPLE: usize = 2;

/// 캡처 소스가 전달하는 원시 오디오 배치
#[derive(Debug, Clone, Copy)]
pub struct AudioBatch<'a> {
    /// little-endian 16bit interleaved PCM
    pub data: &'a [u8],
    pub bits_per_sample: u16,
    pub sample_rate: u32,
    pub channels: u16,
    /// 채널당 샘플 수
    pub frames: usize,
}

/// 오디오 파이프라인
pub struct AudioPipeline {
    /// None이면 이미 해제됨
    encoder: Option<Box<dyn AudioEncoder>>,
    header: OpusHeader,
    sample_rate: u32,
    channels: u16,
    track: Option<TrackId>,
    pcm: Vec<i16>,
    packet: Box<[u8; MAX_PACKET_SIZE]>,
    counters: Arc<SessionCounters>,
}

impl AudioPipeline {
    /// 인코더 생성 → 비트레이트 설정 → lookahead 조회 → OpusHead 작성
    ///
    /// 중간 단계가 실패하면 인코더는 drop되어 파괴된다 (부분 인스턴스 없음).
    pub fn create(
        codec: &dyn AudioCodec,
        sample_rate: u32,
        channels: u16,
        counters: Arc<SessionCounters>,
    ) -> Result<Self, EncoderError> {
        let channel_byte = u8::try_from(channels)
            .map_err(|_| EncoderError::setup("audio encoder", "channel count out of range"))?;

        let mut encoder = codec
            .create_encoder(sample_rate, channels)
            .map_err(|e| EncoderError::setup("audio encoder", e))?;

        encoder
            .set_bitrate(AUDIO_BITRATE)
            .map_err(|e| EncoderError::setup("audio bitrate", e))?;

        let lookahead = encoder
            .lookahead()
            .map_err(|e| EncoderError::setup("audio lookahead", e))?;
        let pre_skip = u16::try_from(lookahead).map_err(|_| {
            EncoderError::setup("audio lookahead", format!("lookahead {} exceeds 16 bits", lookahead))
        })?;

        log::debug!(
            "[AUDIO] {} encoder: {}Hz x{} @ {}bps, pre-skip {}",
            codec.name(),
            sample_rate,
            channels,
            AUDIO_BITRATE,
            pre_skip
        );

        Ok(Self {
            encoder: Some(encoder),
            header: OpusHeader::new(channel_byte, pre_skip, sample_rate),
            sample_rate,
            channels,
            track: None,
            pcm: Vec::with_capacity(MAX_FRAME_SIZE),
            packet: Box::new([0u8; MAX_PACKET_SIZE]),
            counters,
        })
    }

    /// 19바이트 식별 헤더 (트랙 CodecPrivate)
    pub fn codec_private(&self) -> [u8; OPUS_HEADER_SIZE] {
        self.header.to_bytes()
    }

    /// 인코더 지연 (샘플)
    pub fn pre_skip(&self) -> u16 {
        self.header.pre_skip
    }

    /// 싱크에 등록할 트랙 설정
    pub fn track_config(&self) -> AudioTrackConfig {
        AudioTrackConfig {
            codec_id: OPUS_CODEC_ID,
            sample_rate: self.sample_rate,
            channels: self.channels,
            codec_private: self.codec_private().to_vec(),
            seek_pre_roll: OPUS_SEEK_PRE_ROLL,
            codec_delay: self.header.codec_delay(),
        }
    }

    pub fn bind_track(&mut self, track: TrackId) {
        self.track = Some(track);
    }

    /// 샘플 배치 인코딩 → 싱크 전달
    ///
    /// 기준 시각이 없으면 `NotReady`, 출력이 1바이트 미만이면 `EncodeFailure`.
    pub fn on_samples(
        &mut self,
        batch: &AudioBatch<'_>,
        timeline: &SharedTimeline,
        sink: &SharedSink,
    ) -> Result<(), EncoderError> {
        let track = self.track.ok_or(EncoderError::NotReady)?;
        let sample_count = self.validate(batch)?;

        self.pcm.clear();
        self.pcm.extend(
            batch.data[..sample_count * BYTES_PER_SAMPLE]
                .chunks_exact(BYTES_PER_SAMPLE)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        let encoder = self.encoder.as_mut().ok_or(EncoderError::NotReady)?;
        let size = encoder
            .encode(&self.pcm, batch.frames, &mut self.packet[..])
            .map_err(|e| EncoderError::EncodeFailure(e.to_string()))?;
        if size < 1 {
            return Err(EncoderError::EncodeFailure(
                "audio encoder produced no output".to_string(),
            ));
        }

        let mut guard = sink.lock();
        let sink = guard.as_mut().ok_or(EncoderError::NotReady)?;
        let timestamp = timeline.audio_timestamp().ok_or(EncoderError::NotReady)?;

        sink.append(&CompressedUnit {
            payload: &self.packet[..size],
            timestamp,
            track,
            key: true,
            forced_key: false,
        })?;
        self.counters.audio_packets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// 입력 포맷 검증 - interleaved 샘플 수 반환
    fn validate(&self, batch: &AudioBatch<'_>) -> Result<usize, EncoderError> {
        if batch.bits_per_sample != 16 {
            return Err(EncoderError::InvalidInput(format!(
                "expected 16 bits per sample, got {}",
                batch.bits_per_sample
            )));
        }
        if batch.sample_rate != self.sample_rate || batch.channels != self.channels {
            return Err(EncoderError::InvalidInput(format!(
                "audio format {}Hz x{} does not match session {}Hz x{}",
                batch.sample_rate, batch.channels, self.sample_rate, self.channels
            )));
        }

        let sample_count = batch
            .frames
            .checked_mul(usize::from(batch.channels))
            .filter(|n| *n > 0 && *n <= MAX_FRAME_SIZE)
            .ok_or_else(|| {
                EncoderError::InvalidInput(format!(
                    "{} frames x{} channels does not fit the {}-sample buffer",
                    batch.frames, batch.channels, MAX_FRAME_SIZE
                ))
            })?;

        if batch.data.len() < sample_count * BYTES_PER_SAMPLE {
            return Err(EncoderError::InvalidInput(format!(
                "audio buffer has {} bytes, need {}",
                batch.data.len(),
                sample_count * BYTES_PER_SAMPLE
            )));
        }
        Ok(sample_count)
    }

    /// 인코더 해제 (이미 해제됐으면 no-op)
    pub fn release(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            drop(encoder);
            log::debug!("[AUDIO] encoder destroyed");
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.release();
    }
}
