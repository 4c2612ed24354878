//! # vdec
//!
//! 纯 Rust 实现的视频解码器基类管线, 对标 GStreamer 的 GstVideoDecoder.
//!
//! 具体解码器只负责把压缩数据变成图像, 其余工作由基类完成:
//! - **帧管理**: 在途帧登记, 保证每帧恰好完成或丢弃一次
//! - **时间戳**: 按偏移关联输入时间戳, 输出时补全缺失的 PTS 与时长
//! - **QoS**: 根据下游反馈丢弃迟到帧
//! - **正反向播放**: 反向播放按 GOP 解码后倒序输出
//! - **排空与刷新**: 段结束、seek 时交出或丢弃缓存数据
//!
//! # 快速开始
//!
//! ```rust
//! use std::sync::Arc;
//! use vdec::base::{Caps, CollectSink, DecoderConfig, Event, VideoDecoder};
//! use vdec::core::{Buffer, ClockTime, PixelFormat, Segment, VideoInfo};
//!
//! let registry = vdec::default_codec_registry();
//! let sink = Arc::new(CollectSink::new());
//! let decoder = VideoDecoder::new(
//!     registry.create("rawvideo").unwrap(),
//!     sink.clone(),
//!     DecoderConfig::default(),
//! )
//! .unwrap();
//! decoder.start().unwrap();
//! decoder
//!     .send_event(Event::Caps(Caps::raw(VideoInfo::new(PixelFormat::Gray8, 2, 2))))
//!     .unwrap();
//! decoder.send_event(Event::Segment(Segment::new_time())).unwrap();
//! decoder
//!     .push_buffer(Buffer::from_data(vec![7u8; 4]).with_pts(ClockTime::ZERO))
//!     .unwrap();
//! decoder.send_event(Event::Eos).unwrap();
//! assert_eq!(sink.buffers().len(), 1);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `vdec-core` | 时间、段、缓冲区、缓冲池与错误类型 |
//! | `vdec-base` | 解码器基类与内置 rawvideo 解码器 |

/// 核心类型 (对标 libgstreamer 核心)
pub use vdec_core as core;

/// 解码器基类 (对标 GstVideoDecoder)
pub use vdec_base as base;

/// 获取 vdec 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置编解码器的注册表
pub fn default_codec_registry() -> vdec_base::CodecRegistry {
    let mut registry = vdec_base::CodecRegistry::new();
    vdec_base::register_all(&mut registry);
    registry
}
