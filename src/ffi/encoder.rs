// WebM 인코더 FFI - C 호출자 연동
// 세션 생성/초기화/프레임 전달/파괴 (핸들은 Box<Session>의 raw pointer)

use crate::config::SessionConfig;
use crate::encoding::{AudioBatch, Session, VideoFrame};
use crate::ffi::types::{to_code, ErrorCode};
use std::ffi::{c_char, c_void, CStr};
use std::slice;

/// C 측 I420 프레임 (평면 포인터 + 바이트 길이 + stride)
#[repr(C)]
pub struct WebmVideoFrame {
    pub planes: [*const u8; 3],
    pub plane_lengths: [usize; 3],
    pub strides: [usize; 3],
    pub width: u32,
    pub height: u32,
}

/// 핸들 → &Session
///
/// # Safety
/// handle은 webm_encoder_new가 반환하고 아직 free되지 않은 포인터여야 한다.
unsafe fn session_ref<'a>(handle: *mut c_void) -> Option<&'a Session> {
    (handle as *const Session).as_ref()
}

/// 세션 생성 (libopus + libvpx + libavformat)
/// out_handle: 세션 핸들 반환 (webm_encoder_free로 해제)
#[cfg(all(feature = "ffmpeg", feature = "opus"))]
#[no_mangle]
pub extern "C" fn webm_encoder_new(out_handle: *mut *mut c_void) -> i32 {
    if out_handle.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    let session = Box::new(Session::new(crate::encoding::Backends::native()));
    unsafe {
        *out_handle = Box::into_raw(session) as *mut c_void;
    }
    ErrorCode::Success as i32
}

/// 세션 초기화 - 출력 대상 열기
/// output: UTF-8 경로 (최대 1024 bytes)
/// bit_rate_kbps: 비디오 목표 비트레이트
#[no_mangle]
pub extern "C" fn webm_encoder_initialize(
    handle: *mut c_void,
    output: *const c_char,
    bit_rate_kbps: u32,
    frame_rate: f64,
    sample_rate: u32,
    channels: u16,
) -> i32 {
    if output.is_null() {
        return ErrorCode::NullPointer as i32;
    }
    let Some(session) = (unsafe { session_ref(handle) }) else {
        return ErrorCode::NullPointer as i32;
    };

    let output = match unsafe { CStr::from_ptr(output) }.to_str() {
        Ok(s) => s,
        Err(_) => return ErrorCode::InvalidParam as i32,
    };

    let config = SessionConfig::new(output).map(|config| {
        config
            .with_bit_rate_kbps(bit_rate_kbps)
            .with_frame_rate(frame_rate)
            .with_audio(sample_rate, channels)
    });
    to_code(config.and_then(|config| session.initialize(config)))
}

/// 인코더 생성 - 해상도 고정
#[no_mangle]
pub extern "C" fn webm_encoder_create(handle: *mut c_void, width: u32, height: u32) -> i32 {
    let Some(session) = (unsafe { session_ref(handle) }) else {
        return ErrorCode::NullPointer as i32;
    };
    to_code(session.create(width, height))
}

/// 오디오 샘플 전달 (s16le interleaved)
/// len: data 바이트 수, frames: 채널당 샘플 수
#[no_mangle]
pub extern "C" fn webm_encoder_audio_on_data(
    handle: *mut c_void,
    data: *const u8,
    len: usize,
    bits_per_sample: u16,
    sample_rate: u32,
    channels: u16,
    frames: usize,
) -> i32 {
    if data.is_null() {
        return ErrorCode::NullPointer as i32;
    }
    let Some(session) = (unsafe { session_ref(handle) }) else {
        return ErrorCode::NullPointer as i32;
    };

    let batch = AudioBatch {
        data: unsafe { slice::from_raw_parts(data, len) },
        bits_per_sample,
        sample_rate,
        channels,
        frames,
    };
    to_code(session.audio_on_data(&batch))
}

/// 비디오 프레임 전달 (I420)
#[no_mangle]
pub extern "C" fn webm_encoder_video_on_frame(
    handle: *mut c_void,
    frame: *const WebmVideoFrame,
) -> i32 {
    let Some(session) = (unsafe { session_ref(handle) }) else {
        return ErrorCode::NullPointer as i32;
    };
    let Some(frame) = (unsafe { frame.as_ref() }) else {
        return ErrorCode::NullPointer as i32;
    };
    if frame.planes.iter().any(|p| p.is_null()) {
        return ErrorCode::NullPointer as i32;
    }

    let planes = unsafe {
        [
            slice::from_raw_parts(frame.planes[0], frame.plane_lengths[0]),
            slice::from_raw_parts(frame.planes[1], frame.plane_lengths[1]),
            slice::from_raw_parts(frame.planes[2], frame.plane_lengths[2]),
        ]
    };
    let video_frame = VideoFrame {
        planes,
        strides: frame.strides,
        width: frame.width,
        height: frame.height,
    };
    to_code(session.video_on_frame(&video_frame))
}

/// 세션 종료 - 인코더 해제 + 파일 마무리 (핸들은 유지)
#[no_mangle]
pub extern "C" fn webm_encoder_destroy(handle: *mut c_void) -> i32 {
    let Some(session) = (unsafe { session_ref(handle) }) else {
        return ErrorCode::NullPointer as i32;
    };
    to_code(session.destroy())
}

/// 핸들 해제 (destroy 전이면 먼저 종료)
#[no_mangle]
pub extern "C" fn webm_encoder_free(handle: *mut c_void) -> i32 {
    if handle.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let _ = Box::from_raw(handle as *mut Session);
    }
    ErrorCode::Success as i32
}
