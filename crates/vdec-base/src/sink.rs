//! 下游接收端.
//!
//! 解码器把输出缓冲区、事件与消息交给 `Sink`. 调用 `Sink` 时从不持有流锁,
//! 因此下游可以阻塞 (背压) 或回调解码器而不会死锁.

use std::sync::{Mutex, MutexGuard, PoisonError};

use vdec_core::{Buffer, VdecResult};

use crate::event::Event;
use crate::message::Message;

/// 下游接收端
pub trait Sink: Send + Sync {
    /// 接收一个输出缓冲区
    ///
    /// # 返回
    /// - `Ok(())`: 继续
    /// - `Err(VdecError::Eos)`: 下游不再需要数据
    /// - `Err(VdecError::Flushing)`: 下游正在刷新
    fn push_buffer(&self, buffer: Buffer) -> VdecResult<()>;

    /// 接收一个事件, 返回是否被处理
    fn push_event(&self, event: Event) -> bool;

    /// 接收一条总线消息
    fn post_message(&self, _message: Message) {}
}

/// 发往下游的条目
#[derive(Debug, Clone)]
pub enum SinkItem {
    /// 输出缓冲区
    Buffer(Buffer),
    /// 事件
    Event(Event),
    /// 消息
    Message(Message),
}

/// 记录全部输出的接收端
///
/// 按到达顺序保存条目, 供测试与命令行工具检查输出.
#[derive(Debug, Default)]
pub struct CollectSink {
    items: Mutex<Vec<SinkItem>>,
}

impl CollectSink {
    /// 创建空接收端
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 全部条目的副本
    pub fn items(&self) -> Vec<SinkItem> {
        self.lock().clone()
    }

    /// 取出并清空全部条目
    pub fn take(&self) -> Vec<SinkItem> {
        std::mem::take(&mut *self.lock())
    }

    /// 收到的缓冲区
    pub fn buffers(&self) -> Vec<Buffer> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                SinkItem::Buffer(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    /// 收到的事件
    pub fn events(&self) -> Vec<Event> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                SinkItem::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// 收到的消息
    pub fn messages(&self) -> Vec<Message> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                SinkItem::Message(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Sink for CollectSink {
    fn push_buffer(&self, buffer: Buffer) -> VdecResult<()> {
        self.lock().push(SinkItem::Buffer(buffer));
        Ok(())
    }

    fn push_event(&self, event: Event) -> bool {
        self.lock().push(SinkItem::Event(event));
        true
    }

    fn post_message(&self, message: Message) {
        self.lock().push(SinkItem::Message(message));
    }
}
