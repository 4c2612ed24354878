//! 媒体缓冲区.
//!
//! 管线中流动的数据单元: 上游送入的压缩数据与下游收到的解码图像都是 `Buffer`.

use std::sync::Arc;

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};

use crate::clock::ClockTime;
use crate::pool::PoolSlot;

bitflags! {
    /// 缓冲区标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// 与前一个缓冲区不连续 (seek 后或丢帧后)
        const DISCONT = 1 << 6;
        /// 数据已损坏
        const CORRUPTED = 1 << 8;
        /// 码流头部数据
        const HEADER = 1 << 10;
        /// 空隙, 不含有效数据
        const GAP = 1 << 11;
        /// 非关键帧, 依赖前面的帧才能解码
        const DELTA_UNIT = 1 << 13;
    }
}

/// 媒体缓冲区
///
/// 数据部分使用 `Bytes` 共享, 克隆是廉价的. 从缓冲池取得的缓冲区持有池槽位,
/// 最后一个克隆被释放时槽位归还缓冲池.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    /// 数据
    pub data: Bytes,
    /// 显示时间戳
    pub pts: Option<ClockTime>,
    /// 解码时间戳
    pub dts: Option<ClockTime>,
    /// 时长
    pub duration: Option<ClockTime>,
    /// 在流中的字节偏移
    pub offset: Option<u64>,
    /// 标志
    pub flags: BufferFlags,
    /// 缓冲池槽位
    pool_slot: Option<Arc<PoolSlot>>,
}

impl Buffer {
    /// 创建空缓冲区
    pub fn new() -> Self {
        Self::default()
    }

    /// 从数据创建缓冲区
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// 创建指定大小的零填充缓冲区
    pub fn zeroed(size: usize) -> Self {
        Self::from_data(vec![0u8; size])
    }

    pub(crate) fn pooled(size: usize, slot: PoolSlot) -> Self {
        Self {
            pool_slot: Some(Arc::new(slot)),
            ..Self::zeroed(size)
        }
    }

    /// 设置显示时间戳
    pub fn with_pts(mut self, pts: impl Into<Option<ClockTime>>) -> Self {
        self.pts = pts.into();
        self
    }

    /// 设置解码时间戳
    pub fn with_dts(mut self, dts: impl Into<Option<ClockTime>>) -> Self {
        self.dts = dts.into();
        self
    }

    /// 设置时长
    pub fn with_duration(mut self, duration: impl Into<Option<ClockTime>>) -> Self {
        self.duration = duration.into();
        self
    }

    /// 追加标志
    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否不含数据
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 是否携带任何时间信息或标志
    pub fn has_metadata(&self) -> bool {
        self.pts.is_some() || self.dts.is_some() || self.duration.is_some() || !self.flags.is_empty()
    }

    /// 是否标记为不连续
    pub fn is_discont(&self) -> bool {
        self.flags.contains(BufferFlags::DISCONT)
    }

    /// 是否为非关键帧
    pub fn is_delta_unit(&self) -> bool {
        self.flags.contains(BufferFlags::DELTA_UNIT)
    }

    /// 是否来自缓冲池
    pub fn is_pooled(&self) -> bool {
        self.pool_slot.is_some()
    }

    /// 以可写方式访问数据
    ///
    /// 数据被其他克隆共享时会先复制一份.
    pub fn map_writable<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = BytesMut::from(&self.data[..]);
        let result = f(&mut data);
        self.data = data.freeze();
        result
    }
}
