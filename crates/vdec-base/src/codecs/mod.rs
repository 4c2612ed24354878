//! 内置编解码器.

pub mod rawvideo;

pub use rawvideo::RawVideoDecoder;

use crate::caps::RAW_VIDEO_MEDIA_TYPE;
use crate::codec_registry::CodecRegistry;

/// 注册所有内置编解码器
pub fn register_all(registry: &mut CodecRegistry) {
    registry.register(RAW_VIDEO_MEDIA_TYPE, "rawvideo", RawVideoDecoder::create);
}
