//! # vdec-base
//!
//! vdec 视频解码器基类, 提供帧管理、时间戳重建、QoS 与正反向解码管线.
//!
//! 本 crate 对标 GStreamer 的 GstVideoDecoder: 具体解码器只实现 `VideoCodec`
//! (把压缩数据变成图像), 帧登记、时间戳补全、段裁剪、迟到帧丢弃、反向播放、
//! 排空与刷新都由 `VideoDecoder` 完成.
//!
//! ## 使用示例
//!
//! ```rust
//! use std::sync::Arc;
//! use vdec_base::{Caps, CollectSink, DecoderConfig, Event, VideoDecoder};
//! use vdec_core::{Buffer, ClockTime, PixelFormat, Segment, VideoInfo};
//!
//! let mut registry = vdec_base::CodecRegistry::new();
//! vdec_base::register_all(&mut registry);
//!
//! let sink = Arc::new(CollectSink::new());
//! let decoder = VideoDecoder::new(
//!     registry.create("rawvideo").unwrap(),
//!     sink.clone(),
//!     DecoderConfig::default(),
//! )
//! .unwrap();
//! decoder.start().unwrap();
//!
//! let info = VideoInfo::new(PixelFormat::Gray8, 2, 2);
//! decoder.send_event(Event::Caps(Caps::raw(info))).unwrap();
//! decoder.send_event(Event::Segment(Segment::new_time())).unwrap();
//! decoder
//!     .push_buffer(Buffer::from_data(vec![0u8; 4]).with_pts(ClockTime::ZERO))
//!     .unwrap();
//! assert_eq!(sink.buffers().len(), 1);
//! ```

pub mod adapter;
pub mod allocation;
pub mod caps;
pub mod codec;
pub mod codec_registry;
pub mod codecs;
pub mod config;
pub mod context;
pub mod decoder;
pub mod drain;
pub mod event;
pub mod frame;
pub mod message;
pub mod output;
pub mod qos;
pub mod registry;
pub mod sink;
pub mod tags;
pub mod timestamps;

mod forward;
mod parse;
mod reverse;

// 重导出常用类型
pub use allocation::{AllocationQuery, default_decide_allocation};
pub use caps::{Caps, RAW_VIDEO_MEDIA_TYPE};
pub use codec::{ParseOutcome, VideoCodec};
pub use codec_registry::{CodecFactory, CodecRegistry};
pub use config::DecoderConfig;
pub use context::DecoderContext;
pub use decoder::{DecoderStats, VideoDecoder};
pub use drain::DrainState;
pub use event::{Event, EventKind, TagScope};
pub use frame::{CodecFrame, FrameFlags, FrameId};
pub use message::{Message, QosStats};
pub use output::OutputSequencer;
pub use qos::{QosController, QosSnapshot};
pub use registry::FrameRegistry;
pub use sink::{CollectSink, Sink, SinkItem};
pub use tags::{TagList, TagMergeMode};
pub use timestamps::{TimestampInfo, TimestampTracker};

/// 注册所有内置编解码器
pub fn register_all(registry: &mut CodecRegistry) {
    codecs::register_all(registry);
}
