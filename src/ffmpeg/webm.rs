// WebM 먹서 - FFmpeg(libavformat) 기반 Muxer 구현
// 트랙 등록 → 첫 append 시 헤더 기록 → 인터리빙 기록 → trailer

use std::collections::HashSet;
use std::ptr;
use std::time::Duration;

use ffmpeg_next as ffmpeg;
use ffmpeg::ffi;

use crate::error::MuxError;
use crate::mux::{
    AudioTrackConfig, Colour, CompressedUnit, MuxSink, Muxer, TrackId, VideoTrackConfig,
};

/// 싱크 타임스탬프 단위 (나노초)
const NANOS_TIME_BASE: ffmpeg::Rational = ffmpeg::Rational(1, 1_000_000_000);

/// Matroska 트랙 타임스케일 (밀리초)
const MATROSKA_TIME_BASE: ffmpeg::Rational = ffmpeg::Rational(1, 1000);

/// libavformat WebM 먹서
///
/// 기본은 파일 모드 (trailer에서 Cues/Duration을 되돌아가 기록).
/// live 모드는 헤더를 한 번에 쓰고 되돌아가지 않으므로 스트리밍 대상용이며,
/// 이 경우 libavformat은 Cues와 Duration을 기록하지 않는다.
pub struct WebmMuxer {
    live: bool,
}

impl WebmMuxer {
    pub fn new() -> Self {
        Self { live: false }
    }

    /// live 모드 (matroska `live` 옵션)
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }
}

impl Default for WebmMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for WebmMuxer {
    fn name(&self) -> &str {
        "libavformat-webm"
    }

    fn open(&self, target: &str) -> Result<Box<dyn MuxSink>, MuxError> {
        let open_error = |reason: String| MuxError::Open {
            target: target.to_string(),
            reason,
        };

        ffmpeg::init().map_err(|e| open_error(format!("FFmpeg init failed: {}", e)))?;
        let output = ffmpeg::format::output_as(target, "webm")
            .map_err(|e| open_error(e.to_string()))?;

        log::debug!("[WEBM] opened {} (live: {})", target, self.live);
        Ok(Box::new(WebmSink {
            output: Some(output),
            live: self.live,
            header_written: false,
            indexed: HashSet::new(),
            duration: None,
        }))
    }
}

struct WebmSink {
    /// None이면 이미 닫힘
    output: Option<ffmpeg::format::context::Output>,
    live: bool,
    header_written: bool,
    indexed: HashSet<TrackId>,
    duration: Option<Duration>,
}

// SAFETY: 출력 컨텍스트는 SharedSink Mutex 안에서만 접근
unsafe impl Send for WebmSink {}

impl WebmSink {
    fn output(&mut self) -> Result<&mut ffmpeg::format::context::Output, MuxError> {
        self.output
            .as_mut()
            .ok_or_else(|| MuxError::Write("output already closed".to_string()))
    }

    fn ensure_header(&mut self) -> Result<(), MuxError> {
        if self.header_written {
            return Ok(());
        }
        let opts = header_options(self.live);
        self.output()?
            .write_header_with(opts)
            .map_err(|e| MuxError::Write(format!("Failed to write header: {}", e)))?;
        self.header_written = true;
        Ok(())
    }

    fn stream_index(&mut self, track: TrackId) -> Result<usize, MuxError> {
        let index = usize::try_from(track.0)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| MuxError::Write(format!("unknown track {}", track.0)))?;
        if self.output()?.stream(index).is_none() {
            return Err(MuxError::Write(format!("unknown track {}", track.0)));
        }
        Ok(index)
    }
}

/// matroska 먹서 옵션
fn header_options(live: bool) -> ffmpeg::Dictionary<'static> {
    let mut opts = ffmpeg::Dictionary::new();
    if live {
        opts.set("live", "1");
    }
    opts
}

/// YUV420P가 표현하는 크로마 서브샘플링 (가로/세로 1/2)
fn is_yuv420_subsampling(colour: &Colour) -> bool {
    colour.chroma_subsampling_horz == 1 && colour.chroma_subsampling_vert == 1
}

/// 트랙 번호는 스트림 index + 1 (Matroska TrackNumber는 1부터)
fn track_for(index: usize) -> TrackId {
    TrackId(index as u64 + 1)
}

/// 나노초 Duration → 샘플 수
fn duration_to_samples(duration: Duration, sample_rate: u32) -> i64 {
    (duration.as_nanos() * u128::from(sample_rate) / 1_000_000_000) as i64
}

impl MuxSink for WebmSink {
    fn add_audio_track(&mut self, config: &AudioTrackConfig) -> Result<TrackId, MuxError> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| MuxError::Track("output already closed".to_string()))?;
        let mut stream = output
            .add_stream(ffmpeg::codec::Id::OPUS)
            .map_err(|e| MuxError::Track(format!("Failed to add audio stream: {}", e)))?;
        stream.set_time_base(MATROSKA_TIME_BASE);

        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
            (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_OPUS;
            (*par).sample_rate = config.sample_rate as i32;
            ffi::av_channel_layout_default(&mut (*par).ch_layout, i32::from(config.channels));
            (*par).initial_padding =
                duration_to_samples(config.codec_delay, config.sample_rate) as i32;
            (*par).seek_preroll =
                duration_to_samples(config.seek_pre_roll, config.sample_rate) as i32;

            // CodecPrivate (OpusHead) - libavformat 소유 버퍼로 복사
            let size = config.codec_private.len();
            let buf = ffi::av_mallocz(size + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize) as *mut u8;
            if buf.is_null() {
                return Err(MuxError::Track("Failed to allocate codec private".to_string()));
            }
            ptr::copy_nonoverlapping(config.codec_private.as_ptr(), buf, size);
            (*par).extradata = buf;
            (*par).extradata_size = size as i32;
        }

        let track = track_for(stream.index());
        log::debug!(
            "[WEBM] audio track {}: {} {}Hz x{}",
            track.0,
            config.codec_id,
            config.sample_rate,
            config.channels
        );
        Ok(track)
    }

    /// 색 정보: 서브샘플링은 픽셀 포맷(YUV420P)으로, 비트 깊이는
    /// bits_per_raw_sample로 전달된다. libavformat은 Colour 요소의
    /// BitsPerChannel/ChromaSubsampling*을 기록하지 않으므로 파일에는
    /// 픽셀 포맷으로만 남는다.
    fn add_video_track(&mut self, config: &VideoTrackConfig) -> Result<TrackId, MuxError> {
        if !is_yuv420_subsampling(&config.colour) {
            return Err(MuxError::Track(format!(
                "chroma subsampling {}/{} is not representable as YUV420P",
                config.colour.chroma_subsampling_horz, config.colour.chroma_subsampling_vert
            )));
        }
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| MuxError::Track("output already closed".to_string()))?;
        let mut stream = output
            .add_stream(ffmpeg::codec::Id::VP8)
            .map_err(|e| MuxError::Track(format!("Failed to add video stream: {}", e)))?;
        stream.set_time_base(MATROSKA_TIME_BASE);
        stream.set_avg_frame_rate(ffmpeg::Rational::from(config.frame_rate));

        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*par).codec_id = ffi::AVCodecID::AV_CODEC_ID_VP8;
            (*par).width = config.width as i32;
            (*par).height = config.height as i32;
            (*par).format = ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32;
            (*par).bits_per_raw_sample = i32::from(config.colour.bits_per_channel);
        }

        let track = track_for(stream.index());
        log::debug!(
            "[WEBM] video track {}: {} {}x{} @ {}fps",
            track.0,
            config.codec_id,
            config.width,
            config.height,
            config.frame_rate
        );
        Ok(track)
    }

    /// libavformat은 키프레임마다 Cues를 기록하므로 트랙 확인만 수행
    fn mark_for_index(&mut self, track: TrackId) -> Result<(), MuxError> {
        self.stream_index(track)
            .map_err(|e| MuxError::Track(e.to_string()))?;
        self.indexed.insert(track);
        Ok(())
    }

    fn append(&mut self, unit: &CompressedUnit<'_>) -> Result<(), MuxError> {
        let index = self.stream_index(unit.track)?;
        self.ensure_header()?;

        let output = self.output()?;
        let stream_time_base = output
            .stream(index)
            .map(|s| s.time_base())
            .ok_or_else(|| MuxError::Write(format!("unknown track {}", unit.track.0)))?;

        let nanos = i64::try_from(unit.timestamp.as_nanos())
            .map_err(|_| MuxError::Write("timestamp out of range".to_string()))?;

        let mut packet = ffmpeg::Packet::copy(unit.payload);
        packet.set_stream(index);
        packet.set_pts(Some(nanos));
        packet.set_dts(Some(nanos));
        if unit.key {
            packet.set_flags(ffmpeg::packet::Flags::KEY);
        }
        packet.rescale_ts(NANOS_TIME_BASE, stream_time_base);

        packet
            .write_interleaved(output)
            .map_err(|e| MuxError::Write(format!("Failed to write packet: {}", e)))
    }

    /// libavformat은 Segment Duration을 기록된 패킷 타임스탬프로 직접 계산하므로
    /// 여기서는 값만 보관해 finalize 로그에 남긴다.
    fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    fn finalize(&mut self) -> Result<(), MuxError> {
        self.ensure_header()
            .map_err(|e| MuxError::Finalize(e.to_string()))?;

        let output = self
            .output
            .as_mut()
            .ok_or_else(|| MuxError::Finalize("output already closed".to_string()))?;
        output
            .write_trailer()
            .map_err(|e| MuxError::Finalize(format!("Failed to write trailer: {}", e)))?;

        log::debug!(
            "[WEBM] finalized ({} indexed tracks, session duration {:.3} sec)",
            self.indexed.len(),
            self.duration.unwrap_or_default().as_secs_f64()
        );
        if self.live {
            log::debug!("[WEBM] live mode: cues and duration not written");
        }
        Ok(())
    }

    /// Output drop 시 avio 핸들이 닫힘
    fn close(&mut self) -> Result<(), MuxError> {
        if self.output.take().is_some() {
            log::debug!("[WEBM] closed");
        }
        Ok(())
    }
}
