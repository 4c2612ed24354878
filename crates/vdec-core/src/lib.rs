//! # vdec-core
//!
//! vdec 视频解码框架核心库, 提供时间、播放段、缓冲区、缓冲池与错误类型.
//!
//! 本 crate 对标 GStreamer 的 libgstreamer 核心类型 (GstClockTime, GstSegment,
//! GstBuffer, GstBufferPool), 为解码器基类提供底层基础设施.

pub mod buffer;
pub mod clock;
pub mod error;
pub mod pool;
pub mod rational;
pub mod segment;
pub mod video_info;

// 重导出常用类型
pub use buffer::{Buffer, BufferFlags};
pub use clock::ClockTime;
pub use error::{VdecError, VdecResult};
pub use pool::{BufferPool, BufferPoolConfig};
pub use rational::Rational;
pub use segment::{Segment, SegmentFlags, SegmentFormat};
pub use video_info::{PixelFormat, VideoInfo};
