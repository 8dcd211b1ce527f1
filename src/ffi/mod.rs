// FFI 모듈 - C 호출자용 extern "C" 함수

pub mod encoder;
pub mod types;

pub use encoder::*;
pub use types::ErrorCode;

/// 로그 초기화 (RUST_LOG 환경 변수로 레벨 지정, 기본 info)
/// 두 번째 호출부터는 InvalidParam 반환
#[no_mangle]
pub extern "C" fn webm_logging_init() -> i32 {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
    match result {
        Ok(()) => ErrorCode::Success as i32,
        Err(_) => ErrorCode::InvalidParam as i32,
    }
}
