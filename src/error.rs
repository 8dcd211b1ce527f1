// 에러 타입 - 세션/파이프라인/외부 코덱·먹서 에러
// 모든 실패는 호출자에게 값으로 반환 (프로세스 중단 없음)

use crate::encoding::SessionState;

/// 세션/파이프라인 연산의 에러
///
/// 셋업 단계 실패(`SetupFailure`)는 해당 호출에서 할당된 자원을 역순으로
/// 해제한 뒤 반환된다. 런타임 실패는 해당 프레임만 실패로 처리하며
/// 세션은 계속 사용 가능하다 (치명적인지는 호출자가 판단).
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// 코덱 또는 먹싱 싱크 생성/열기 실패
    #[error("setup failed ({stage}): {reason}")]
    SetupFailure {
        /// 실패한 셋업 단계
        stage: &'static str,
        /// 원인
        reason: String,
    },

    /// 비디오 프레임 해상도가 세션 해상도와 다름
    #[error("frame geometry {actual_width}x{actual_height} does not match session geometry {expected_width}x{expected_height}")]
    GeometryMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// create() 성공 전, destroy() 시작 후, 또는 오디오 기준 시각 미설정
    #[error("session not ready")]
    NotReady,

    /// 코덱이 사용 가능한 출력을 만들지 못함 (재시도 없음)
    #[error("encode failed: {0}")]
    EncodeFailure(String),

    /// 먹싱 싱크가 append/finalize를 거부함
    #[error("sink write failed: {0}")]
    SinkWriteFailure(String),

    /// 잘못된 세션 설정
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 잘못된 입력 버퍼/포맷 (부작용 없이 거부)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 용량 제한 문자열에 용량 초과 쓰기
    #[error("capacity exceeded: {requested} bytes requested, capacity is {capacity}")]
    CapacityExceeded { capacity: usize, requested: usize },

    /// 현재 상태에서 허용되지 않는 연산
    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl EncoderError {
    pub fn setup(stage: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::SetupFailure {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// 오디오/비디오 코덱 capability 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(pub String);

impl CodecError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// 컨테이너 먹싱 capability 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    /// 출력 대상 열기 실패
    #[error("failed to open output '{target}': {reason}")]
    Open { target: String, reason: String },

    /// 트랙 등록 실패
    #[error("failed to add track: {0}")]
    Track(String),

    /// 프레임 append 실패
    #[error("failed to append frame: {0}")]
    Write(String),

    /// finalize/close 실패
    #[error("failed to finalize output: {0}")]
    Finalize(String),
}

impl From<MuxError> for EncoderError {
    fn from(e: MuxError) -> Self {
        match e {
            MuxError::Open { .. } => EncoderError::setup("muxer open", e),
            MuxError::Track(_) => EncoderError::setup("track registration", e),
            MuxError::Write(_) | MuxError::Finalize(_) => {
                EncoderError::SinkWriteFailure(e.to_string())
            }
        }
    }
}
