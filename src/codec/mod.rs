// 코덱 capability 모듈
// 오디오/비디오 인코더 추상화 - 실제 비트스트림 구현은 외부 라이브러리 (libopus, libvpx)

pub mod opus_header;
#[cfg(feature = "opus")]
pub mod libopus;

use crate::error::{CodecError, EncoderError};
use crate::timeline::RationalFrameRate;

pub use opus_header::{OpusHeader, OPUS_HEADER_SIZE};

/// 오디오 코덱 팩토리
pub trait AudioCodec: Send + Sync {
    /// 로그용 코덱 이름
    fn name(&self) -> &str;

    /// 샘플레이트/채널 수에 맞는 인코더 생성
    fn create_encoder(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Box<dyn AudioEncoder>, CodecError>;
}

/// 오디오 인코더 인스턴스 (Drop 시 파괴)
pub trait AudioEncoder: Send {
    fn set_bitrate(&mut self, bits_per_second: u32) -> Result<(), CodecError>;

    /// 인코더 지연(lookahead) - 샘플 단위
    fn lookahead(&mut self) -> Result<u32, CodecError>;

    /// interleaved i16 PCM 인코딩
    /// - frames_per_channel: 채널당 샘플 수 (pcm.len() / channels)
    /// - 반환: output에 쓰인 바이트 수
    fn encode(
        &mut self,
        pcm: &[i16],
        frames_per_channel: usize,
        output: &mut [u8],
    ) -> Result<usize, CodecError>;
}

/// 이미지 픽셀 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUV 4:2:0 planar (Y, U, V)
    I420,
}

/// 인코딩 속도/품질 deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Realtime,
    GoodQuality,
    BestQuality,
}

/// 비디오 인코더 설정
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderConfig {
    pub width: u32,
    pub height: u32,
    /// 1 pts = numerator / denominator 초
    pub timebase: RationalFrameRate,
    /// 목표 비트레이트 (kbit/s)
    pub target_bitrate_kbps: u32,
    pub deadline: Deadline,
}

/// 인코드 플래그
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeFlags {
    pub force_keyframe: bool,
}

/// 인코더 출력 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPacket {
    /// 압축 프레임
    Frame { data: Vec<u8>, pts: i64, key: bool },
    /// 통계/PSNR 등 프레임이 아닌 패킷
    Other,
}

/// 비디오 코덱 팩토리
pub trait VideoCodec: Send + Sync {
    fn name(&self) -> &str;

    /// 입력 이미지 디스크립터 할당 (평면 포인터는 프레임마다 바인딩)
    fn allocate_image(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        align: u32,
    ) -> Result<ImageDescriptor, CodecError> {
        ImageDescriptor::new(format, width, height, align)
    }

    /// 코덱 기본 설정
    fn default_config(&self, width: u32, height: u32) -> Result<VideoEncoderConfig, CodecError>;

    fn init_encoder(&self, config: &VideoEncoderConfig)
        -> Result<Box<dyn VideoEncoder>, CodecError>;
}

/// 비디오 인코더 인스턴스 (Drop 시 파괴)
pub trait VideoEncoder: Send {
    fn encode(
        &mut self,
        image: &I420Image<'_>,
        pts: i64,
        duration: u64,
        flags: EncodeFlags,
    ) -> Result<(), CodecError>;

    /// 대기 중인 출력 패킷 하나 꺼내기 (없으면 None)
    fn next_packet(&mut self) -> Option<VideoPacket>;
}

/// 고정 해상도 I420 이미지 디스크립터
///
/// 픽셀 데이터는 소유하지 않는다. 프레임마다 호출자의 평면 버퍼를
/// `bind`로 묶어 복사 없이 인코더에 넘긴다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    format: PixelFormat,
    width: u32,
    height: u32,
    align: u32,
}

impl ImageDescriptor {
    pub fn new(format: PixelFormat, width: u32, height: u32, align: u32) -> Result<Self, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::new(format!(
                "invalid image size {}x{}",
                width, height
            )));
        }
        if !align.is_power_of_two() {
            return Err(CodecError::new(format!(
                "alignment must be a power of two, got {}",
                align
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            align,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn align(&self) -> u32 {
        self.align
    }

    /// 평면 버퍼 + stride를 디스크립터에 바인딩 (복사 없음)
    ///
    /// 각 평면이 `stride × (rows - 1) + plane_width` 바이트 이상인지,
    /// stride가 평면 너비 이상인지 검사한다.
    pub fn bind<'a>(
        &self,
        planes: [&'a [u8]; 3],
        strides: [usize; 3],
    ) -> Result<I420Image<'a>, EncoderError> {
        for (index, (plane, stride)) in planes.iter().zip(strides.iter()).enumerate() {
            let (plane_width, rows) = plane_size(self.width, self.height, index);
            if *stride < plane_width {
                return Err(EncoderError::InvalidInput(format!(
                    "plane {} stride {} is smaller than plane width {}",
                    index, stride, plane_width
                )));
            }
            let required = stride
                .checked_mul(rows - 1)
                .and_then(|n| n.checked_add(plane_width))
                .ok_or_else(|| {
                    EncoderError::InvalidInput(format!("plane {} size overflows", index))
                })?;
            if plane.len() < required {
                return Err(EncoderError::InvalidInput(format!(
                    "plane {} has {} bytes, need at least {}",
                    index,
                    plane.len(),
                    required
                )));
            }
        }

        Ok(I420Image {
            width: self.width,
            height: self.height,
            planes,
            strides,
        })
    }
}

/// 평면 index의 (너비, 행 수) - 크로마 평면은 가로/세로 1/2 (올림)
fn plane_size(width: u32, height: u32, index: usize) -> (usize, usize) {
    if index == 0 {
        (width as usize, height as usize)
    } else {
        (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
    }
}

/// 호출자 버퍼를 빌린 I420 프레임
#[derive(Debug, Clone, Copy)]
pub struct I420Image<'a> {
    width: u32,
    height: u32,
    planes: [&'a [u8]; 3],
    strides: [usize; 3],
}

impl<'a> I420Image<'a> {
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self, index: usize) -> &'a [u8] {
        self.planes[index]
    }

    pub fn stride(&self, index: usize) -> usize {
        self.strides[index]
    }

    /// 평면 index의 (너비, 행 수)
    pub fn plane_size(&self, index: usize) -> (usize, usize) {
        plane_size(self.width, self.height, index)
    }

    /// 평면 index의 y번째 행 (패딩 제외)
    pub fn row(&self, index: usize, y: usize) -> &'a [u8] {
        let (plane_width, _) = self.plane_size(index);
        let start = y * self.strides[index];
        &self.planes[index][start..start + plane_width]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_rejects_bad_geometry() {
        assert!(ImageDescriptor::new(PixelFormat::I420, 0, 480, 1).is_err());
        assert!(ImageDescriptor::new(PixelFormat::I420, 640, 0, 1).is_err());
        assert!(ImageDescriptor::new(PixelFormat::I420, 640, 480, 3).is_err());
        assert!(ImageDescriptor::new(PixelFormat::I420, 640, 480, 16).is_ok());
    }

    #[test]
    fn test_bind_tightly_packed() {
        let desc = ImageDescriptor::new(PixelFormat::I420, 4, 2, 1).unwrap();
        let y = [1u8; 8];
        let u = [2u8; 2];
        let v = [3u8; 2];

        let image = desc.bind([&y, &u, &v], [4, 2, 2]).unwrap();
        assert_eq!(image.plane_size(0), (4, 2));
        assert_eq!(image.plane_size(1), (2, 1));
        assert_eq!(image.row(0, 1), &[1, 1, 1, 1]);
        assert_eq!(image.row(2, 0), &[3, 3]);
    }

    #[test]
    fn test_bind_odd_geometry_rounds_chroma_up() {
        let desc = ImageDescriptor::new(PixelFormat::I420, 5, 3, 1).unwrap();
        let y = vec![0u8; 15];
        let u = vec![0u8; 6];
        let v = vec![0u8; 6];
        let image = desc.bind([&y, &u, &v], [5, 3, 3]).unwrap();
        assert_eq!(image.plane_size(1), (3, 2));
    }

    #[test]
    fn test_bind_with_padded_stride() {
        let desc = ImageDescriptor::new(PixelFormat::I420, 4, 2, 1).unwrap();
        // 마지막 행은 패딩 없이 끝나도 됨: 8 × 1 + 4 = 12
        let y: Vec<u8> = (0..12).collect();
        let u = [0u8; 2];
        let v = [0u8; 2];
        let image = desc.bind([&y, &u, &v], [8, 2, 2]).unwrap();
        assert_eq!(image.row(0, 1), &[8, 9, 10, 11]);
    }

    #[test]
    fn test_bind_rejects_short_planes() {
        let desc = ImageDescriptor::new(PixelFormat::I420, 4, 2, 1).unwrap();
        let y = [0u8; 7];
        let u = [0u8; 2];
        let v = [0u8; 2];
        let err = desc.bind([&y, &u, &v], [4, 2, 2]).unwrap_err();
        assert!(matches!(err, EncoderError::InvalidInput(_)));
    }

    #[test]
    fn test_bind_rejects_narrow_stride() {
        let desc = ImageDescriptor::new(PixelFormat::I420, 4, 2, 1).unwrap();
        let y = [0u8; 64];
        let u = [0u8; 64];
        let v = [0u8; 64];
        assert!(desc.bind([&y, &u, &v], [3, 2, 2]).is_err());
        assert!(desc.bind([&y, &u, &v], [4, 1, 2]).is_err());
    }
}
