//! 格式描述 (Caps).
//!
//! 同时用于输入端 (压缩格式, 由上游声明) 与输出端 (解码图像格式, 由编解码器声明).

use std::fmt;

use bytes::Bytes;
use vdec_core::VideoInfo;

/// 原始视频的媒体类型
pub const RAW_VIDEO_MEDIA_TYPE: &str = "video/x-raw";

/// 格式描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    /// 媒体类型, 如 "video/x-h264", "video/x-raw"
    pub media_type: String,
    /// 视频参数
    pub info: VideoInfo,
    /// 编解码器私有数据 (如 avcC)
    pub codec_data: Option<Bytes>,
}

impl Caps {
    /// 创建格式描述
    pub fn new(media_type: impl Into<String>, info: VideoInfo) -> Self {
        Self {
            media_type: media_type.into(),
            info,
            codec_data: None,
        }
    }

    /// 创建原始视频格式描述
    pub fn raw(info: VideoInfo) -> Self {
        Self::new(RAW_VIDEO_MEDIA_TYPE, info)
    }

    /// 附加编解码器私有数据
    pub fn with_codec_data(mut self, data: impl Into<Bytes>) -> Self {
        self.codec_data = Some(data.into());
        self
    }

    /// 是否为原始视频
    pub fn is_raw(&self) -> bool {
        self.media_type == RAW_VIDEO_MEDIA_TYPE
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.media_type, self.info)?;
        if let Some(data) = &self.codec_data {
            write!(f, ", codec_data={}B", data.len())?;
        }
        Ok(())
    }
}
