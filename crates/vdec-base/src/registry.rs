//! 在途帧登记表 (FrameRegistry).
//!
//! 按派发顺序保存已交给编解码器、尚未完成的帧, 以 `system_frame_number` 查找.
//! 帧的所有权在登记表中, 编解码器只持有 `FrameId`.

use std::collections::VecDeque;

use crate::event::Event;
use crate::frame::{CodecFrame, FrameId};

/// 在途帧登记表
#[derive(Debug, Default)]
pub struct FrameRegistry {
    frames: VecDeque<CodecFrame>,
}

impl FrameRegistry {
    /// 创建空登记表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一帧 (追加到末尾)
    pub fn insert(&mut self, frame: CodecFrame) {
        self.frames.push_back(frame);
    }

    /// 按标识查找帧
    pub fn get(&self, id: FrameId) -> Option<&CodecFrame> {
        self.frames.iter().find(|f| f.system_frame_number == id)
    }

    /// 按标识查找帧 (可变)
    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut CodecFrame> {
        self.frames.iter_mut().find(|f| f.system_frame_number == id)
    }

    /// 帧在登记表中的位置
    pub fn position(&self, id: FrameId) -> Option<usize> {
        self.frames.iter().position(|f| f.system_frame_number == id)
    }

    /// 移除并返回帧
    pub fn remove(&mut self, id: FrameId) -> Option<CodecFrame> {
        let index = self.position(id)?;
        self.frames.remove(index)
    }

    /// 最早登记的帧
    pub fn oldest(&self) -> Option<&CodecFrame> {
        self.frames.front()
    }

    /// 最早登记的帧 (可变)
    pub fn oldest_mut(&mut self) -> Option<&mut CodecFrame> {
        self.frames.front_mut()
    }

    /// 按登记顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &CodecFrame> {
        self.frames.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CodecFrame> {
        self.frames.iter_mut()
    }

    pub(crate) fn get_at_mut(&mut self, index: usize) -> Option<&mut CodecFrame> {
        self.frames.get_mut(index)
    }

    /// 所有在途帧的标识
    pub fn ids(&self) -> Vec<FrameId> {
        self.frames.iter().map(CodecFrame::id).collect()
    }

    /// 在途帧数量
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// 是否没有在途帧
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 取出从最早一帧到 `id` (含) 之间所有帧挂着的事件, 保持到达顺序
    pub fn take_events_through(&mut self, id: FrameId) -> Vec<Event> {
        let mut events = Vec::new();
        for frame in self.frames.iter_mut() {
            events.append(&mut frame.events);
            if frame.system_frame_number == id {
                break;
            }
        }
        events
    }

    /// 清空登记表, 返回被移除的帧
    pub fn drain(&mut self) -> Vec<CodecFrame> {
        self.frames.drain(..).collect()
    }
}
