// 테스트 지원 - 이벤트를 기록하는 mock 코덱/먹서 + 수동 시계
// 실패 주입 플래그로 롤백/에러 경로 검증

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};
use std::time::Duration;

use crate::codec::{
    AudioCodec, AudioEncoder, Deadline, EncodeFlags, I420Image, VideoCodec, VideoEncoder,
    VideoEncoderConfig, VideoPacket,
};
use crate::encoding::{AudioBatch, Backends, VideoFrame};
use crate::error::{CodecError, MuxError};
use crate::mux::{AudioTrackConfig, CompressedUnit, MuxSink, Muxer, TrackId, VideoTrackConfig};
use crate::timeline::{Clock, RationalFrameRate};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 기록된 append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRecord {
    pub track: TrackId,
    pub timestamp: Duration,
    pub key: bool,
    pub forced_key: bool,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AudioEncoderCreated { sample_rate: u32, channels: u16 },
    AudioBitrateSet(u32),
    AudioEncoded { frames_per_channel: usize },
    AudioEncoderDestroyed,
    ImageAllocated { width: u32, height: u32 },
    VideoEncoderCreated(VideoEncoderConfig),
    VideoEncoded { pts: i64, force_keyframe: bool },
    VideoEncoderDestroyed,
    SinkOpened(String),
    AudioTrackAdded(AudioTrackConfig),
    VideoTrackAdded(VideoTrackConfig),
    MarkedForIndex(TrackId),
    Appended(AppendRecord),
    DurationSet(Duration),
    Finalized,
    Closed,
    SinkDropped,
}

/// 실패 주입 플래그
#[derive(Debug, Default)]
pub struct Faults {
    pub audio_create: AtomicBool,
    pub audio_bitrate: AtomicBool,
    pub audio_lookahead: AtomicBool,
    pub audio_encode_empty: AtomicBool,
    pub image_alloc: AtomicBool,
    pub video_config: AtomicBool,
    pub video_init: AtomicBool,
    pub video_encode_error: AtomicBool,
    pub video_no_packet: AtomicBool,
    pub video_other_packet_only: AtomicBool,
    pub video_extra_packet: AtomicBool,
    pub sink_open: AtomicBool,
    pub sink_video_track: AtomicBool,
    pub sink_append: AtomicBool,
    pub sink_finalize: AtomicBool,
    pub lookahead: AtomicU32,
    /// 다음 비디오 인코드 한 번을 세우는 게이트
    pub video_encode_gate: Mutex<Option<Arc<EncodeGate>>>,
}

/// 인코드 호출 도중 정지시키는 두 단계 barrier
#[derive(Debug)]
pub struct EncodeGate {
    /// 인코더가 호출 안으로 들어옴
    pub entered: Barrier,
    /// 테스트가 인코더를 풀어줌
    pub release: Barrier,
}

/// mock 간 공유 이벤트 기록기
#[derive(Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    pub faults: Arc<Faults>,
}

impl Recorder {
    pub fn new() -> Self {
        let faults = Faults::default();
        faults.lookahead.store(312, Ordering::SeqCst);
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            faults: Arc::new(faults),
        }
    }

    pub fn fail(&self, flag: impl Fn(&Faults) -> &AtomicBool, value: bool) {
        flag(&self.faults).store(value, Ordering::SeqCst);
    }

    pub fn gate_next_video_encode(&self) -> Arc<EncodeGate> {
        let gate = Arc::new(EncodeGate {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        *self
            .faults
            .video_encode_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&gate));
        gate
    }

    fn is_set(&self, flag: impl Fn(&Faults) -> &AtomicBool) -> bool {
        flag(&self.faults).load(Ordering::SeqCst)
    }

    pub fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }

    pub fn appended(&self) -> Vec<AppendRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Appended(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            audio: Box::new(MockAudioCodec::new(self.clone())),
            video: Box::new(MockVideoCodec::new(self.clone())),
            muxer: Box::new(MockMuxer::new(self.clone())),
        }
    }
}

/// 수동으로 진행하는 시계
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ---- 오디오 ----

pub struct MockAudioCodec {
    recorder: Recorder,
}

impl MockAudioCodec {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

impl AudioCodec for MockAudioCodec {
    fn name(&self) -> &str {
        "mock-opus"
    }

    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn AudioEncoder>, CodecError> {
        if self.recorder.is_set(|f| &f.audio_create) {
            return Err(CodecError::new("audio create fault"));
        }
        self.recorder.push(Event::AudioEncoderCreated {
            sample_rate,
            channels,
        });
        Ok(Box::new(MockAudioEncoder {
            recorder: self.recorder.clone(),
        }))
    }
}

struct MockAudioEncoder {
    recorder: Recorder,
}

impl AudioEncoder for MockAudioEncoder {
    fn set_bitrate(&mut self, bits_per_second: u32) -> Result<(), CodecError> {
        if self.recorder.is_set(|f| &f.audio_bitrate) {
            return Err(CodecError::new("bitrate fault"));
        }
        self.recorder.push(Event::AudioBitrateSet(bits_per_second));
        Ok(())
    }

    fn lookahead(&mut self) -> Result<u32, CodecError> {
        if self.recorder.is_set(|f| &f.audio_lookahead) {
            return Err(CodecError::new("lookahead fault"));
        }
        Ok(self.recorder.faults.lookahead.load(Ordering::SeqCst))
    }

    /// 출력: 채널당 샘플 수(LE16) + 첫 샘플(LE16)
    fn encode(
        &mut self,
        pcm: &[i16],
        frames_per_channel: usize,
        output: &mut [u8],
    ) -> Result<usize, CodecError> {
        self.recorder
            .push(Event::AudioEncoded { frames_per_channel });
        if self.recorder.is_set(|f| &f.audio_encode_empty) {
            return Ok(0);
        }
        let first = pcm.first().copied().unwrap_or(0);
        output[..2].copy_from_slice(&(frames_per_channel as u16).to_le_bytes());
        output[2..4].copy_from_slice(&first.to_le_bytes());
        Ok(4)
    }
}

impl Drop for MockAudioEncoder {
    fn drop(&mut self) {
        self.recorder.push(Event::AudioEncoderDestroyed);
    }
}

// ---- 비디오 ----

pub struct MockVideoCodec {
    recorder: Recorder,
}

impl MockVideoCodec {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

impl VideoCodec for MockVideoCodec {
    fn name(&self) -> &str {
        "mock-vp8"
    }

    fn allocate_image(
        &self,
        format: crate::codec::PixelFormat,
        width: u32,
        height: u32,
        align: u32,
    ) -> Result<crate::codec::ImageDescriptor, CodecError> {
        if self.recorder.is_set(|f| &f.image_alloc) {
            return Err(CodecError::new("image alloc fault"));
        }
        self.recorder.push(Event::ImageAllocated { width, height });
        crate::codec::ImageDescriptor::new(format, width, height, align)
    }

    fn default_config(&self, width: u32, height: u32) -> Result<VideoEncoderConfig, CodecError> {
        if self.recorder.is_set(|f| &f.video_config) {
            return Err(CodecError::new("config fault"));
        }
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
        if self.recorder.is_set(|f| &f.video_init) {
            return Err(CodecError::new("init fault"));
        }
        self.recorder.push(Event::VideoEncoderCreated(config.clone()));
        Ok(Box::new(MockVideoEncoder {
            recorder: self.recorder.clone(),
            queue: VecDeque::new(),
        }))
    }
}

struct MockVideoEncoder {
    recorder: Recorder,
    queue: VecDeque<VideoPacket>,
}

impl VideoEncoder for MockVideoEncoder {
    fn encode(
        &mut self,
        image: &I420Image<'_>,
        pts: i64,
        _duration: u64,
        flags: EncodeFlags,
    ) -> Result<(), CodecError> {
        let gate = self
            .recorder
            .faults
            .video_encode_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            gate.entered.wait();
            gate.release.wait();
        }

        if self.recorder.is_set(|f| &f.video_encode_error) {
            return Err(CodecError::new("encode fault"));
        }
        self.recorder.push(Event::VideoEncoded {
            pts,
            force_keyframe: flags.force_keyframe,
        });

        if self.recorder.is_set(|f| &f.video_no_packet) {
            return Ok(());
        }
        if self.recorder.is_set(|f| &f.video_other_packet_only) {
            self.queue.push_back(VideoPacket::Other);
            return Ok(());
        }

        let first_luma = image.plane(0).first().copied().unwrap_or(0);
        if self.recorder.is_set(|f| &f.video_extra_packet) {
            self.queue.push_back(VideoPacket::Other);
            self.queue.push_back(VideoPacket::Frame {
                data: vec![0xAA, first_luma],
                pts,
                key: flags.force_keyframe,
            });
            self.queue.push_back(VideoPacket::Frame {
                data: vec![0xBB, first_luma],
                pts: pts + 1,
                key: false,
            });
            return Ok(());
        }

        self.queue.push_back(VideoPacket::Frame {
            data: vec![pts as u8, first_luma],
            pts,
            key: flags.force_keyframe,
        });
        Ok(())
    }

    fn next_packet(&mut self) -> Option<VideoPacket> {
        self.queue.pop_front()
    }
}

impl Drop for MockVideoEncoder {
    fn drop(&mut self) {
        self.recorder.push(Event::VideoEncoderDestroyed);
    }
}

// ---- 먹서 ----

pub struct MockMuxer {
    recorder: Recorder,
}

impl MockMuxer {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

impl Muxer for MockMuxer {
    fn name(&self) -> &str {
        "mock-webm"
    }

    fn open(&self, target: &str) -> Result<Box<dyn MuxSink>, MuxError> {
        if self.recorder.is_set(|f| &f.sink_open) {
            return Err(MuxError::Open {
                target: target.to_string(),
                reason: "open fault".to_string(),
            });
        }
        self.recorder.push(Event::SinkOpened(target.to_string()));
        Ok(Box::new(MockSink {
            recorder: self.recorder.clone(),
            next_track: 1,
        }))
    }
}

struct MockSink {
    recorder: Recorder,
    next_track: u64,
}

impl MockSink {
    fn next_track(&mut self) -> TrackId {
        let id = TrackId(self.next_track);
        self.next_track += 1;
        id
    }
}

impl MuxSink for MockSink {
    fn add_audio_track(&mut self, config: &AudioTrackConfig) -> Result<TrackId, MuxError> {
        self.recorder.push(Event::AudioTrackAdded(config.clone()));
        Ok(self.next_track())
    }

    fn add_video_track(&mut self, config: &VideoTrackConfig) -> Result<TrackId, MuxError> {
        if self.recorder.is_set(|f| &f.sink_video_track) {
            return Err(MuxError::Track("video track fault".to_string()));
        }
        self.recorder.push(Event::VideoTrackAdded(config.clone()));
        Ok(self.next_track())
    }

    fn mark_for_index(&mut self, track: TrackId) -> Result<(), MuxError> {
        self.recorder.push(Event::MarkedForIndex(track));
        Ok(())
    }

    fn append(&mut self, unit: &CompressedUnit<'_>) -> Result<(), MuxError> {
        if self.recorder.is_set(|f| &f.sink_append) {
            return Err(MuxError::Write("append fault".to_string()));
        }
        self.recorder.push(Event::Appended(AppendRecord {
            track: unit.track,
            timestamp: unit.timestamp,
            key: unit.key,
            forced_key: unit.forced_key,
            payload: unit.payload.to_vec(),
        }));
        Ok(())
    }

    fn set_duration(&mut self, duration: Duration) {
        self.recorder.push(Event::DurationSet(duration));
    }

    fn finalize(&mut self) -> Result<(), MuxError> {
        if self.recorder.is_set(|f| &f.sink_finalize) {
            return Err(MuxError::Finalize("finalize fault".to_string()));
        }
        self.recorder.push(Event::Finalized);
        Ok(())
    }

    fn close(&mut self) -> Result<(), MuxError> {
        self.recorder.push(Event::Closed);
        Ok(())
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.recorder.push(Event::SinkDropped);
    }
}

// ---- 입력 ----

/// 테스트용 I420 프레임 (tightly packed)
pub struct TestFrame {
    pub width: u32,
    pub height: u32,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl TestFrame {
    pub fn new(width: u32, height: u32, luma: u8) -> Self {
        let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        Self {
            width,
            height,
            y: vec![luma; (width * height) as usize],
            u: vec![128; chroma],
            v: vec![128; chroma],
        }
    }

    pub fn as_frame(&self) -> VideoFrame<'_> {
        let chroma_stride = self.width.div_ceil(2) as usize;
        VideoFrame {
            planes: [&self.y, &self.u, &self.v],
            strides: [self.width as usize, chroma_stride, chroma_stride],
            width: self.width,
            height: self.height,
        }
    }
}

/// 테스트용 s16le interleaved PCM
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn audio_batch(data: &[u8], sample_rate: u32, channels: u16) -> AudioBatch<'_> {
    AudioBatch {
        data,
        bits_per_sample: 16,
        sample_rate,
        channels,
        frames: data.len() / 2 / channels as usize,
    }
}
