// VP8 비디오 코덱 - FFmpeg(libvpx) 기반 VideoCodec 구현
// I420 평면 → YUV420P 프레임 복사 → libvpx 인코딩

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;

use crate::codec::{
    Deadline, EncodeFlags, I420Image, VideoCodec, VideoEncoder, VideoEncoderConfig, VideoPacket,
};
use crate::error::CodecError;
use crate::timeline::RationalFrameRate;

/// libvpx 인코더 이름
const LIBVPX_ENCODER: &str = "libvpx";

/// libvpx VP8 코덱 팩토리
pub struct Vp8Codec;

impl Vp8Codec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Vp8Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCodec for Vp8Codec {
    fn name(&self) -> &str {
        "libvpx-vp8"
    }

    /// libvpx 기본값 (256kbps, 1/30 timebase)
    fn default_config(&self, width: u32, height: u32) -> Result<VideoEncoderConfig, CodecError> {
        Ok(VideoEncoderConfig {
            width,
            height,
            timebase: RationalFrameRate {
                numerator: 1,
                denominator: 30,
            },
            target_bitrate_kbps: 256,
            deadline: Deadline::GoodQuality,
        })
    }

    fn init_encoder(
        &self,
        config: &VideoEncoderConfig,
    ) -> Result<Box<dyn VideoEncoder>, CodecError> {
        ffmpeg::init().map_err(|e| CodecError::new(format!("FFmpeg init failed: {}", e)))?;

        let codec = ffmpeg::encoder::find_by_name(LIBVPX_ENCODER)
            .ok_or_else(|| CodecError::new("libvpx encoder not found"))?;

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| CodecError::new(format!("Failed to get video encoder: {}", e)))?;

        let time_base = to_rational(config.timebase)?;
        encoder.set_width(config.width);
        encoder.set_height(config.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_bit_rate(config.target_bitrate_kbps as usize * 1000);

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("deadline", deadline_name(config.deadline));
        // 입력 1프레임 → 출력 1패킷
        opts.set("lag-in-frames", "0");

        let encoder = encoder
            .open_with(opts)
            .map_err(|e| CodecError::new(format!("Failed to open VP8 encoder: {}", e)))?;

        Ok(Box::new(Vp8Encoder {
            encoder,
            frame: ffmpeg::frame::Video::new(Pixel::YUV420P, config.width, config.height),
            packet: ffmpeg::Packet::empty(),
        }))
    }
}

fn deadline_name(deadline: Deadline) -> &'static str {
    match deadline {
        Deadline::Realtime => "realtime",
        Deadline::GoodQuality => "good",
        Deadline::BestQuality => "best",
    }
}

fn to_rational(timebase: RationalFrameRate) -> Result<ffmpeg::Rational, CodecError> {
    let num = i32::try_from(timebase.numerator);
    let den = i32::try_from(timebase.denominator);
    match (num, den) {
        (Ok(num), Ok(den)) => Ok(ffmpeg::Rational::new(num, den)),
        _ => Err(CodecError::new(format!(
            "timebase {}/{} out of range",
            timebase.numerator, timebase.denominator
        ))),
    }
}

struct Vp8Encoder {
    encoder: ffmpeg::encoder::video::Encoder,
    /// 입력 프레임 버퍼 (매 프레임 재사용)
    frame: ffmpeg::frame::Video,
    packet: ffmpeg::Packet,
}

// SAFETY: 인코더 컨텍스트는 세션이 Mutex로 보호하며 한 번에 한 스레드만 접근
unsafe impl Send for Vp8Encoder {}

impl VideoEncoder for Vp8Encoder {
    fn encode(
        &mut self,
        image: &I420Image<'_>,
        pts: i64,
        _duration: u64,
        flags: EncodeFlags,
    ) -> Result<(), CodecError> {
        // 평면별 행 단위 복사 (입력 stride와 프레임 linesize가 다를 수 있음)
        for index in 0..3 {
            let (plane_width, rows) = image.plane_size(index);
            let linesize = self.frame.stride(index);
            let dst = self.frame.data_mut(index);
            for y in 0..rows {
                let offset = y * linesize;
                dst[offset..offset + plane_width].copy_from_slice(image.row(index, y));
            }
        }

        self.frame.set_pts(Some(pts));
        self.frame.set_kind(if flags.force_keyframe {
            ffmpeg::picture::Type::I
        } else {
            ffmpeg::picture::Type::None
        });

        self.encoder
            .send_frame(&self.frame)
            .map_err(|e| CodecError::new(format!("Failed to send frame: {}", e)))
    }

    fn next_packet(&mut self) -> Option<VideoPacket> {
        if self.encoder.receive_packet(&mut self.packet).is_err() {
            return None;
        }
        let packet = match self.packet.data() {
            Some(data) => VideoPacket::Frame {
                data: data.to_vec(),
                pts: self.packet.pts().unwrap_or(0),
                key: self.packet.is_key(),
            },
            None => VideoPacket::Other,
        };
        Some(packet)
    }
}
