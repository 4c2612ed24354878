//! 像素格式与视频格式描述.

use std::fmt;

use crate::clock::ClockTime;
use crate::rational::Rational;

/// 像素格式
///
/// 命名规则: 颜色空间 + 位深 + 排列方式 (P=Planar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 未指定 (压缩数据或尚未确定)
    #[default]
    None,
    /// YUV 4:2:0 平面格式, 8 位
    Yuv420p,
    /// YUV 4:2:2 平面格式, 8 位
    Yuv422p,
    /// YUV 4:4:4 平面格式, 8 位
    Yuv444p,
    /// NV12: Y 平面 + UV 交错, 4:2:0, 8 位
    Nv12,
    /// RGB 各 8 位, 打包
    Rgb24,
    /// RGBA 各 8 位, 打包
    Rgba,
    /// 灰度 8 位
    Gray8,
}

impl PixelFormat {
    /// 平面数量
    pub const fn plane_count(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
            Self::Nv12 => 2,
            Self::Rgb24 | Self::Rgba | Self::Gray8 => 1,
        }
    }

    /// 计算一帧图像的总字节数
    ///
    /// 宽高为 0 或格式未指定时返回 None.
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        if width == 0 || height == 0 {
            return None;
        }
        let w = width as usize;
        let h = height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        let size = match self {
            Self::None => return None,
            Self::Yuv420p => w * h + 2 * cw * ch,
            Self::Yuv422p => w * h + 2 * cw * h,
            Self::Yuv444p => 3 * w * h,
            Self::Nv12 => w * h + 2 * cw * ch,
            Self::Rgb24 => 3 * w * h,
            Self::Rgba => 4 * w * h,
            Self::Gray8 => w * h,
        };
        Some(size)
    }

    /// 按名称查找像素格式
    pub fn from_name(name: &str) -> Option<Self> {
        let pf = match name {
            "yuv420p" | "i420" => Self::Yuv420p,
            "yuv422p" => Self::Yuv422p,
            "yuv444p" => Self::Yuv444p,
            "nv12" => Self::Nv12,
            "rgb24" => Self::Rgb24,
            "rgba" => Self::Rgba,
            "gray8" | "gray" => Self::Gray8,
            _ => return None,
        };
        Some(pf)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Nv12 => "nv12",
            Self::Rgb24 => "rgb24",
            Self::Rgba => "rgba",
            Self::Gray8 => "gray8",
        };
        write!(f, "{name}")
    }
}

/// 视频格式描述
///
/// 输入端 (压缩数据) 通常只有宽高与帧率, `format` 为 `None`, `size` 为 0;
/// 输出端描述解码后的图像, `size` 为单帧字节数.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoInfo {
    /// 像素格式
    pub format: PixelFormat,
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 帧率, 0/1 表示可变或未知
    pub fps: Rational,
    /// 像素宽高比
    pub par: Rational,
    /// 是否隔行
    pub interlaced: bool,
    /// 单帧字节数
    pub size: usize,
}

impl VideoInfo {
    /// 创建视频格式描述, 自动计算单帧字节数
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            fps: Rational::ZERO,
            par: Rational::ONE,
            interlaced: false,
            size: format.frame_size(width, height).unwrap_or(0),
        }
    }

    /// 设置帧率
    pub fn with_fps(mut self, fps: Rational) -> Self {
        self.fps = fps;
        self
    }

    /// 设置像素宽高比
    pub fn with_par(mut self, par: Rational) -> Self {
        self.par = par;
        self
    }

    /// 由帧率推导的单帧时长
    pub fn frame_duration(&self) -> Option<ClockTime> {
        ClockTime::frame_duration(self.fps)
    }
}

impl fmt::Display for VideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {} fps, par {}",
            self.format, self.width, self.height, self.fps, self.par
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420p_frame_size() {
        // 1920x1080: Y=2073600, U=V=518400
        assert_eq!(PixelFormat::Yuv420p.frame_size(1920, 1080), Some(3_110_400));
        // 奇数宽高向上取整
        assert_eq!(PixelFormat::Yuv420p.frame_size(3, 3), Some(9 + 2 * 4));
    }

    #[test]
    fn test_video_info_帧时长() {
        let info = VideoInfo::new(PixelFormat::Gray8, 4, 2).with_fps(Rational::new(25, 1));
        assert_eq!(info.size, 8);
        assert_eq!(info.frame_duration(), Some(ClockTime::from_mseconds(40)));
        assert_eq!(VideoInfo::new(PixelFormat::None, 4, 2).size, 0);
    }

    #[test]
    fn test_pixel_format_名称() {
        assert_eq!(PixelFormat::from_name("nv12"), Some(PixelFormat::Nv12));
        assert_eq!(PixelFormat::Nv12.to_string(), "nv12");
        assert_eq!(PixelFormat::from_name("xyz"), None);
    }
}
