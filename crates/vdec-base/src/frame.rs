//! 编解码帧 (CodecFrame).
//!
//! 一个 `CodecFrame` 对应一份压缩输入, 解码后 (最终) 对应一幅输出图像.
//! 帧从创建起由基类持有, 直到编解码器对其调用一次 `finish_frame` 或 `drop_frame`.

use bitflags::bitflags;
use vdec_core::{Buffer, ClockTime};

use crate::event::Event;

/// 帧标识, 即 `system_frame_number`
pub type FrameId = u32;

bitflags! {
    /// 帧标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u32 {
        /// 只解码不显示 (如 VP8 alt-ref 帧)
        const DECODE_ONLY = 1 << 0;
        /// 同步点 (关键帧), 不依赖前面的帧
        const SYNC_POINT = 1 << 1;
        /// 强制作为关键帧输出
        const FORCE_KEYFRAME = 1 << 2;
        /// 解码结果已损坏
        const CORRUPTED = 1 << 4;
    }
}

/// 编解码帧
#[derive(Debug)]
pub struct CodecFrame {
    /// 全局唯一、单调递增的帧序号
    pub system_frame_number: FrameId,
    /// 按解码顺序分配的序号
    pub decode_frame_number: u32,
    /// 与上一个同步点的距离
    pub distance_from_sync: u32,
    /// 帧标志
    pub flags: FrameFlags,
    /// 显示时间戳
    pub pts: Option<ClockTime>,
    /// 解码时间戳
    pub dts: Option<ClockTime>,
    /// 时长
    pub duration: Option<ClockTime>,
    /// 期望完成解码的运行时间
    pub deadline: Option<ClockTime>,
    /// 压缩输入
    pub input_buffer: Option<Buffer>,
    /// 解码输出
    pub output_buffer: Option<Buffer>,
    /// 需在本帧输出之前送出的事件 (按到达顺序)
    pub(crate) events: Vec<Event>,
    /// 时间戳重建用的 DTS 提示
    pub(crate) dts_hint: Option<ClockTime>,
    /// 时间戳重建用的 PTS 提示
    pub(crate) pts_hint: Option<ClockTime>,
}

impl CodecFrame {
    pub(crate) fn new(system_frame_number: FrameId, decode_frame_number: u32) -> Self {
        Self {
            system_frame_number,
            decode_frame_number,
            distance_from_sync: 0,
            flags: FrameFlags::empty(),
            pts: None,
            dts: None,
            duration: None,
            deadline: None,
            input_buffer: None,
            output_buffer: None,
            events: Vec::new(),
            dts_hint: None,
            pts_hint: None,
        }
    }

    /// 帧标识
    pub fn id(&self) -> FrameId {
        self.system_frame_number
    }

    /// 是否为同步点
    pub fn is_sync_point(&self) -> bool {
        self.flags.contains(FrameFlags::SYNC_POINT)
    }

    /// 标记为同步点
    pub fn set_sync_point(&mut self) {
        self.flags.insert(FrameFlags::SYNC_POINT);
    }

    /// 是否只解码不显示
    pub fn is_decode_only(&self) -> bool {
        self.flags.contains(FrameFlags::DECODE_ONLY)
    }

    /// 标记为只解码不显示
    pub fn set_decode_only(&mut self) {
        self.flags.insert(FrameFlags::DECODE_ONLY);
    }

    /// 压缩输入数据, 没有输入时为空切片
    pub fn input_data(&self) -> &[u8] {
        self.input_buffer.as_ref().map_or(&[], |b| &b.data[..])
    }

    /// 挂在本帧上的待发送事件
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_标志() {
        let mut frame = CodecFrame::new(3, 1);
        assert_eq!(frame.id(), 3);
        assert!(!frame.is_sync_point());
        frame.set_sync_point();
        frame.set_decode_only();
        assert!(frame.is_sync_point());
        assert!(frame.is_decode_only());
        assert!(frame.input_data().is_empty());
    }
}
