// 녹화 세션 - 인코더 수명 관리 + 먹싱 싱크 소유
// Uninitialized → initialize() → Initialized → create() → Ready → destroy() → Destroyed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use crate::codec::{AudioCodec, VideoCodec};
use crate::config::SessionConfig;
use crate::encoding::audio_pipeline::{AudioBatch, AudioPipeline};
use crate::encoding::video_pipeline::{VideoFrame, VideoPipeline, VideoSettings};
use crate::encoding::SessionCounters;
use crate::error::EncoderError;
use crate::mux::{Muxer, SharedSink, TrackId};
use crate::timeline::{Clock, KeyframeInterval, MonotonicClock, RationalFrameRate, SharedTimeline};

/// 세션 상태 머신
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// 싱크 열림, 설정 계산 완료
    Initialized,
    /// 두 파이프라인 + 두 트랙 생성 완료 (프레임 수락)
    Ready,
    Destroyed,
}

/// 세션이 사용하는 외부 capability 묶음
pub struct Backends {
    pub audio: Box<dyn AudioCodec>,
    pub video: Box<dyn VideoCodec>,
    pub muxer: Box<dyn Muxer>,
}

#[cfg(all(feature = "ffmpeg", feature = "opus"))]
impl Backends {
    /// libopus + libvpx(VP8) + FFmpeg WebM 먹서
    pub fn native() -> Self {
        Self {
            audio: Box::new(crate::codec::libopus::LibOpusCodec),
            video: Box::new(crate::ffmpeg::Vp8Codec::new()),
            muxer: Box::new(crate::ffmpeg::WebmMuxer::new()),
        }
    }
}

/// 세션 통계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub state: SessionState,
    /// 싱크가 수락한 비디오 프레임 수
    pub video_frames: u64,
    /// 싱크가 수락한 오디오 패킷 수
    pub audio_packets: u64,
    /// 마지막 비디오 상대 타임스탬프
    pub last_timestamp: Duration,
}

/// initialize()에서 계산된 설정
struct Prepared {
    config: SessionConfig,
    frame_rate: RationalFrameRate,
    keyframe_interval: KeyframeInterval,
}

/// 녹화 세션
///
/// 모든 메서드는 `&self`로 동작하므로 `Arc<Session>`을 오디오 스레드와
/// 비디오 스레드가 공유할 수 있다 (파이프라인당 동시 호출자 1개 가정).
/// 싱크 append와 기준 시각 check-and-set은 세션 내부에서 직렬화된다.
pub struct Session {
    backends: Backends,
    state: Mutex<SessionState>,
    /// 두 수집 경로가 확인하는 수락 플래그 (destroy 시 가장 먼저 내림)
    ready: AtomicBool,
    prepared: Mutex<Option<Prepared>>,
    /// create() 성공 시 고정되는 해상도
    geometry: OnceLock<(u32, u32)>,
    audio: Mutex<Option<AudioPipeline>>,
    video: Mutex<Option<VideoPipeline>>,
    sink: SharedSink,
    timeline: SharedTimeline,
    counters: Arc<SessionCounters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(backends: Backends) -> Self {
        Self::with_clock(backends, Arc::new(MonotonicClock::new()))
    }

    /// 타임스탬프 시계 지정
    pub fn with_clock(backends: Backends, clock: Arc<dyn Clock>) -> Self {
        Self {
            backends,
            state: Mutex::new(SessionState::Uninitialized),
            ready: AtomicBool::new(false),
            prepared: Mutex::new(None),
            geometry: OnceLock::new(),
            audio: Mutex::new(None),
            video: Mutex::new(None),
            sink: SharedSink::new(),
            timeline: SharedTimeline::new(clock),
            counters: Arc::new(SessionCounters::default()),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// initialize() 이후의 유리수 프레임레이트
    pub fn frame_rate(&self) -> Option<RationalFrameRate> {
        lock(&self.prepared).as_ref().map(|p| p.frame_rate)
    }

    pub fn keyframe_interval(&self) -> Option<KeyframeInterval> {
        lock(&self.prepared).as_ref().map(|p| p.keyframe_interval)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state(),
            video_frames: self.counters.video_frames.load(Ordering::Relaxed),
            audio_packets: self.counters.audio_packets.load(Ordering::Relaxed),
            last_timestamp: self.timeline.last_timestamp(),
        }
    }

    /// 설정 검증 + 프레임 클럭 계산 + 먹싱 싱크 열기
    ///
    /// 실패 시 세션은 `Uninitialized`로 남으며 재시도할 수 있다.
    pub fn initialize(&self, config: SessionConfig) -> Result<(), EncoderError> {
        let mut state = lock(&self.state);
        if *state != SessionState::Uninitialized {
            return Err(EncoderError::InvalidState {
                operation: "initialize",
                state: *state,
            });
        }

        config.validate()?;
        let frame_rate = RationalFrameRate::from_fps(config.frame_rate)?;
        let keyframe_interval = frame_rate.keyframe_interval();

        let sink = self.backends.muxer.open(config.output.as_str())?;
        self.sink.install(sink);

        log::info!(
            "[SESSION] initialized: {} via {} ({}/{} timebase, keyframe every {} frames)",
            config.output,
            self.backends.muxer.name(),
            frame_rate.numerator,
            frame_rate.denominator,
            keyframe_interval.frames()
        );

        *lock(&self.prepared) = Some(Prepared {
            config,
            frame_rate,
            keyframe_interval,
        });
        *state = SessionState::Initialized;
        Ok(())
    }

    /// 오디오 파이프라인 → 비디오 파이프라인 → 트랙 등록
    ///
    /// 인코더 생성 실패 시 이 호출에서 만든 인코더는 역순(비디오 → 오디오)으로
    /// 해제되고 세션은 `Initialized`로 남는다 (싱크에는 아직 트랙이 없음).
    /// 트랙 등록 실패 시에는 싱크에 이미 추가된 트랙을 되돌릴 수 없으므로
    /// 싱크까지 닫고 `Uninitialized`로 돌아간다 (재시도는 initialize부터).
    pub fn create(&self, width: u32, height: u32) -> Result<(), EncoderError> {
        let mut state = lock(&self.state);
        if *state != SessionState::Initialized {
            return Err(EncoderError::InvalidState {
                operation: "create",
                state: *state,
            });
        }

        let prepared_guard = lock(&self.prepared);
        let prepared = prepared_guard.as_ref().ok_or(EncoderError::NotReady)?;
        let config = prepared.config.clone();
        let settings = VideoSettings {
            width,
            height,
            frame_rate: config.frame_rate,
            timebase: prepared.frame_rate,
            keyframe_interval: prepared.keyframe_interval,
            bit_rate_kbps: config.bit_rate_kbps,
        };
        drop(prepared_guard);

        let mut audio = AudioPipeline::create(
            self.backends.audio.as_ref(),
            config.sample_rate,
            config.channels,
            self.counters.clone(),
        )?;

        let mut video =
            VideoPipeline::create(self.backends.video.as_ref(), settings, self.counters.clone())?;

        let (audio_track, video_track) = match self.register_tracks(&audio, &video) {
            Ok(tracks) => tracks,
            Err(e) => {
                drop(video);
                drop(audio);
                self.abandon_sink();
                *state = SessionState::Uninitialized;
                return Err(e);
            }
        };
        audio.bind_track(audio_track);
        video.bind_track(video_track);

        *lock(&self.audio) = Some(audio);
        *lock(&self.video) = Some(video);
        // 실패한 create는 해상도를 고정하지 않음
        let _ = self.geometry.set((width, height));

        log::info!(
            "[SESSION] codecs: {} / {}",
            self.backends.audio.name(),
            self.backends.video.name()
        );
        log::info!("[SESSION]   file      {}", config.output);
        log::info!("[SESSION]   size      {}x{}", width, height);
        log::info!("[SESSION]   bitrate   {}", config.bit_rate_kbps);
        log::info!("[SESSION]   fps       {}", config.frame_rate);
        log::info!("[SESSION] Recording...");

        *state = SessionState::Ready;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// 트랙 등록이 중간에 실패한 싱크 폐기 (finalize 없이 close)
    fn abandon_sink(&self) {
        lock(&self.prepared).take();
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                log::warn!("[SESSION] failed to close abandoned output: {}", e);
            }
        }
        log::warn!("[SESSION] track registration failed, output discarded");
    }

    /// 오디오/비디오 트랙 등록 + 인덱스(Cues) 포함
    fn register_tracks(
        &self,
        audio: &AudioPipeline,
        video: &VideoPipeline,
    ) -> Result<(TrackId, TrackId), EncoderError> {
        let mut guard = self.sink.lock();
        let sink = guard.as_mut().ok_or(EncoderError::NotReady)?;

        let audio_track = sink.add_audio_track(&audio.track_config())?;
        let video_track = sink.add_video_track(&video.track_config())?;
        sink.mark_for_index(audio_track)?;
        sink.mark_for_index(video_track)?;
        Ok((audio_track, video_track))
    }

    /// 오디오 샘플 수집
    ///
    /// Ready가 아니거나 아직 비디오 프레임이 기준 시각을 잡지 않았으면 `NotReady`.
    pub fn audio_on_data(&self, batch: &AudioBatch<'_>) -> Result<(), EncoderError> {
        if !self.is_ready() {
            return Err(EncoderError::NotReady);
        }

        let mut guard = lock(&self.audio);
        let pipeline = guard.as_mut().ok_or(EncoderError::NotReady)?;
        // 잠금 대기 중 destroy가 시작됐을 수 있음
        if !self.is_ready() || !self.timeline.has_baseline() {
            return Err(EncoderError::NotReady);
        }

        pipeline.on_samples(batch, &self.timeline, &self.sink)
    }

    /// 비디오 프레임 수집
    ///
    /// 해상도 불일치는 `GeometryMismatch`, Ready가 아니면 `NotReady`.
    pub fn video_on_frame(&self, frame: &VideoFrame<'_>) -> Result<(), EncoderError> {
        if let Some(&(width, height)) = self.geometry.get() {
            if frame.width != width || frame.height != height {
                log::warn!(
                    "[VIDEO] frame {}x{} rejected (session {}x{})",
                    frame.width,
                    frame.height,
                    width,
                    height
                );
                return Err(EncoderError::GeometryMismatch {
                    expected_width: width,
                    expected_height: height,
                    actual_width: frame.width,
                    actual_height: frame.height,
                });
            }
        }
        if !self.is_ready() {
            return Err(EncoderError::NotReady);
        }

        let mut guard = lock(&self.video);
        let pipeline = guard.as_mut().ok_or(EncoderError::NotReady)?;
        if !self.is_ready() {
            return Err(EncoderError::NotReady);
        }

        pipeline.on_frame(frame, &self.timeline, &self.sink)
    }

    /// 세션 종료 (어느 상태에서든 호출 가능, 두 번째 호출부터 no-op)
    ///
    /// 수락 플래그를 먼저 내린 뒤 비디오 인코더 → 오디오 인코더 순으로 해제하고,
    /// 싱크가 열려 있었다면 길이 메타데이터 기록 → finalize → close 한다.
    /// finalize/close 에러는 모든 자원을 해제한 뒤 반환된다.
    pub fn destroy(&self) -> Result<(), EncoderError> {
        self.ready.store(false, Ordering::SeqCst);

        let mut state = lock(&self.state);
        if *state == SessionState::Destroyed {
            return Ok(());
        }
        *state = SessionState::Destroyed;

        // 진행 중인 프레임이 끝날 때까지 파이프라인 잠금 대기
        if let Some(mut video) = lock(&self.video).take() {
            video.release();
        }
        if let Some(mut audio) = lock(&self.audio).take() {
            audio.release();
        }
        lock(&self.prepared).take();

        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };

        let duration = self.timeline.last_timestamp();
        sink.set_duration(duration);
        let finalized = sink.finalize();
        let closed = sink.close();
        drop(sink);

        log::info!(
            "[SESSION] webm encoder destroyed ({:.3} sec, {} video frames, {} audio packets)",
            duration.as_secs_f64(),
            self.counters.video_frames.load(Ordering::Relaxed),
            self.counters.audio_packets.load(Ordering::Relaxed)
        );

        finalized.and(closed).map_err(EncoderError::from)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!("[SESSION] teardown error: {}", e);
        }
    }
}
