// 비디오 파이프라인 - I420 프레임 → VP8 인코딩 → 먹싱 싱크
// 해상도는 create 시 고정, 키프레임은 약 2초 주기로 강제

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::codec::{
    EncodeFlags, ImageDescriptor, PixelFormat, VideoCodec, VideoEncoder, VideoPacket,
};
use crate::encoding::SessionCounters;
use crate::error::EncoderError;
use crate::mux::{Colour, CompressedUnit, SharedSink, TrackId, VideoTrackConfig, VP8_CODEC_ID};
use crate::timeline::{KeyframeInterval, RationalFrameRate, SharedTimeline};

/// 이미지 버퍼 정렬
const IMAGE_ALIGN: u32 = 1;

/// 캡처 소스가 전달하는 I420 프레임 (호출자 버퍼를 빌림)
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    /// Y, U, V 평면
    pub planes: [&'a [u8]; 3],
    pub strides: [usize; 3],
    pub width: u32,
    pub height: u32,
}

/// 비디오 파이프라인 생성 파라미터
#[derive(Debug, Clone, Copy)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub timebase: RationalFrameRate,
    pub keyframe_interval: KeyframeInterval,
    pub bit_rate_kbps: u32,
}

/// 비디오 파이프라인
pub struct VideoPipeline {
    /// 해제 순서: encoder → image (None이면 이미 해제됨)
    encoder: Option<Box<dyn VideoEncoder>>,
    image: Option<ImageDescriptor>,
    settings: VideoSettings,
    track: Option<TrackId>,
    /// 다음 입력 프레임 pts (수락된 프레임마다 1 증가)
    next_pts: i64,
    counters: Arc<SessionCounters>,
}

impl VideoPipeline {
    /// 이미지 할당 → 기본 설정 → timebase/비트레이트 적용 → 인코더 초기화
    ///
    /// 실패 시 이 호출에서 할당한 자원은 역순으로 drop된다.
    pub fn create(
        codec: &dyn VideoCodec,
        settings: VideoSettings,
        counters: Arc<SessionCounters>,
    ) -> Result<Self, EncoderError> {
        let image = codec
            .allocate_image(PixelFormat::I420, settings.width, settings.height, IMAGE_ALIGN)
            .map_err(|e| EncoderError::setup("video image", e))?;

        let mut config = codec
            .default_config(settings.width, settings.height)
            .map_err(|e| EncoderError::setup("video config", e))?;
        config.width = settings.width;
        config.height = settings.height;
        config.timebase = settings.timebase;
        config.target_bitrate_kbps = settings.bit_rate_kbps;

        let encoder = codec
            .init_encoder(&config)
            .map_err(|e| EncoderError::setup("video encoder", e))?;

        log::debug!(
            "[VIDEO] {} encoder: {}x{}, timebase {}/{}, {}kbps, keyframe every {} frames",
            codec.name(),
            settings.width,
            settings.height,
            settings.timebase.numerator,
            settings.timebase.denominator,
            settings.bit_rate_kbps,
            settings.keyframe_interval.frames()
        );

        Ok(Self {
            encoder: Some(encoder),
            image: Some(image),
            settings,
            track: None,
            next_pts: 0,
            counters,
        })
    }

    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn height(&self) -> u32 {
        self.settings.height
    }

    /// 싱크에 등록할 트랙 설정
    pub fn track_config(&self) -> VideoTrackConfig {
        VideoTrackConfig {
            codec_id: VP8_CODEC_ID,
            width: self.settings.width,
            height: self.settings.height,
            frame_rate: self.settings.frame_rate,
            colour: Colour::eight_bit(),
        }
    }

    pub fn bind_track(&mut self, track: TrackId) {
        self.track = Some(track);
    }

    /// 프레임 인코딩 → 대기 패킷 전부 싱크 전달
    ///
    /// - 해상도 불일치: `GeometryMismatch` (부작용 없음)
    /// - 프레임 패킷이 하나도 없으면: `EncodeFailure`
    /// - 싱크 거부: 남은 패킷을 모두 꺼낸 뒤 `SinkWriteFailure`
    pub fn on_frame(
        &mut self,
        frame: &VideoFrame<'_>,
        timeline: &SharedTimeline,
        sink: &SharedSink,
    ) -> Result<(), EncoderError> {
        if frame.width != self.settings.width || frame.height != self.settings.height {
            return Err(EncoderError::GeometryMismatch {
                expected_width: self.settings.width,
                expected_height: self.settings.height,
                actual_width: frame.width,
                actual_height: frame.height,
            });
        }

        let track = self.track.ok_or(EncoderError::NotReady)?;
        let image = self
            .image
            .as_ref()
            .ok_or(EncoderError::NotReady)?
            .bind(frame.planes, frame.strides)?;
        let encoder = self.encoder.as_mut().ok_or(EncoderError::NotReady)?;

        let pts = self.next_pts;
        self.next_pts += 1;
        let flags = EncodeFlags {
            force_keyframe: self.settings.keyframe_interval.is_boundary(pts),
        };

        encoder
            .encode(&image, pts, 1, flags)
            .map_err(|e| EncoderError::EncodeFailure(e.to_string()))?;

        // 인코더 내부 큐에 남은 패킷까지 모두 꺼냄 (프레임 유실 방지)
        let mut frames = 0usize;
        let mut first_error = None;
        while let Some(packet) = encoder.next_packet() {
            let (data, packet_pts, key) = match packet {
                VideoPacket::Frame { data, pts, key } => (data, pts, key),
                VideoPacket::Other => {
                    log::debug!("[VIDEO] skipping non-frame packet");
                    continue;
                }
            };
            frames += 1;

            let forced_key = self.settings.keyframe_interval.is_boundary(packet_pts);
            let result = Self::deliver(
                &data,
                track,
                key || forced_key,
                forced_key,
                timeline,
                sink,
            );
            match result {
                Ok(timestamp) => {
                    self.counters.video_frames.fetch_add(1, Ordering::Relaxed);
                    log::trace!("[VIDEO] {:.3} sec", timestamp.as_secs_f64());
                }
                Err(e) => {
                    log::warn!("[VIDEO] packet pts {} not muxed: {}", packet_pts, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if frames == 0 {
            return Err(EncoderError::EncodeFailure(
                "video encoder produced no frame packet".to_string(),
            ));
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 싱크 잠금 상태에서 타임스탬프 계산 + append (전체 스트림 타임스탬프 순서 유지)
    fn deliver(
        payload: &[u8],
        track: TrackId,
        key: bool,
        forced_key: bool,
        timeline: &SharedTimeline,
        sink: &SharedSink,
    ) -> Result<std::time::Duration, EncoderError> {
        let mut guard = sink.lock();
        let sink = guard.as_mut().ok_or(EncoderError::NotReady)?;
        let timestamp = timeline.video_timestamp();
        sink.append(&CompressedUnit {
            payload,
            timestamp,
            track,
            key,
            forced_key,
        })?;
        Ok(timestamp)
    }

    /// 인코더 → 이미지 순서로 해제 (이미 해제된 자원은 건너뜀)
    pub fn release(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            drop(encoder);
            log::debug!("[VIDEO] encoder destroyed");
        }
        if self.image.take().is_some() {
            log::debug!("[VIDEO] image buffer freed");
        }
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.release();
    }
}
