// FFI 공용 타입 - C 호출자에게 반환하는 에러 코드

use crate::error::EncoderError;

/// FFI 에러 코드 (0 = 성공, 음수 = 실패)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = -1,
    InvalidParam = -2,
    SetupFailure = -3,
    GeometryMismatch = -4,
    NotReady = -5,
    EncodeFailure = -6,
    SinkWriteFailure = -7,
    InvalidState = -8,
    CapacityExceeded = -9,
}

impl From<&EncoderError> for ErrorCode {
    fn from(e: &EncoderError) -> Self {
        match e {
            EncoderError::SetupFailure { .. } => ErrorCode::SetupFailure,
            EncoderError::GeometryMismatch { .. } => ErrorCode::GeometryMismatch,
            EncoderError::NotReady => ErrorCode::NotReady,
            EncoderError::EncodeFailure(_) => ErrorCode::EncodeFailure,
            EncoderError::SinkWriteFailure(_) => ErrorCode::SinkWriteFailure,
            EncoderError::InvalidConfig(_) | EncoderError::InvalidInput(_) => {
                ErrorCode::InvalidParam
            }
            EncoderError::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            EncoderError::InvalidState { .. } => ErrorCode::InvalidState,
        }
    }
}

/// Result → i32 (실패는 로그 후 코드 변환)
pub(crate) fn to_code(result: Result<(), EncoderError>) -> i32 {
    match result {
        Ok(()) => ErrorCode::Success as i32,
        Err(e) => {
            log::debug!("[FFI] {}", e);
            ErrorCode::from(&e) as i32
        }
    }
}
