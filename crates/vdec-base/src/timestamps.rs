//! 字节偏移 → 时间戳关联 (TimestampTracker).
//!
//! 非打包模式下, 上游缓冲区的边界与帧边界无关. 每个带时间信息的输入缓冲区
//! 在其起始字节偏移处留下一条记录; 解析出一帧后, 用帧起始偏移取回覆盖它的最新记录.

use std::collections::VecDeque;

use log::trace;
use vdec_core::{Buffer, BufferFlags, ClockTime};

/// 一条时间戳记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRecord {
    /// 缓冲区在输入字节流中的起始偏移
    pub offset: u64,
    /// 显示时间戳
    pub pts: Option<ClockTime>,
    /// 解码时间戳
    pub dts: Option<ClockTime>,
    /// 时长
    pub duration: Option<ClockTime>,
    /// 缓冲区标志
    pub flags: BufferFlags,
}

/// 取回的时间信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampInfo {
    /// 显示时间戳
    pub pts: Option<ClockTime>,
    /// 解码时间戳
    pub dts: Option<ClockTime>,
    /// 时长
    pub duration: Option<ClockTime>,
    /// 缓冲区标志
    pub flags: BufferFlags,
}

/// 时间戳跟踪器
#[derive(Debug, Default)]
pub struct TimestampTracker {
    records: VecDeque<TimestampRecord>,
}

impl TimestampTracker {
    /// 创建空跟踪器
    pub fn new() -> Self {
        Self::default()
    }

    /// 为位于 `offset` 的输入缓冲区建立记录
    ///
    /// 缓冲区不带任何时间信息或标志时不记录, 返回 false.
    pub fn record(&mut self, offset: u64, buffer: &Buffer) -> bool {
        if !buffer.has_metadata() {
            return false;
        }
        debug_assert!(
            self.records.back().is_none_or(|r| r.offset <= offset),
            "时间戳记录的偏移必须单调不减"
        );
        trace!(
            "记录时间戳: offset={}, pts={}, dts={}",
            offset,
            ClockTime::display(buffer.pts),
            ClockTime::display(buffer.dts)
        );
        self.records.push_back(TimestampRecord {
            offset,
            pts: buffer.pts,
            dts: buffer.dts,
            duration: buffer.duration,
            flags: buffer.flags,
        });
        true
    }

    /// 取回覆盖 `offset` 的时间信息
    ///
    /// 移除所有偏移 ≤ `offset` 的记录 (从最早开始), 返回其中最后一条的值;
    /// 没有匹配记录时返回全空信息.
    pub fn take_at_offset(&mut self, offset: u64) -> TimestampInfo {
        let mut info = TimestampInfo::default();
        while let Some(record) = self.records.front() {
            if record.offset > offset {
                break;
            }
            info = TimestampInfo {
                pts: record.pts,
                dts: record.dts,
                duration: record.duration,
                flags: record.flags,
            };
            self.records.pop_front();
        }
        info
    }

    /// 清空所有记录
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// 记录数量
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否没有记录
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> ClockTime {
        ClockTime::from_mseconds(v)
    }

    #[test]
    fn test_tracker_无时间信息不记录() {
        let mut tracker = TimestampTracker::new();
        assert!(!tracker.record(0, &Buffer::from_data(vec![0; 4])));
        assert!(tracker.is_empty());
        assert_eq!(tracker.take_at_offset(100), TimestampInfo::default());
    }

    #[test]
    fn test_tracker_取回覆盖偏移的最新记录() {
        let mut tracker = TimestampTracker::new();
        tracker.record(0, &Buffer::new().with_pts(ms(0)));
        tracker.record(10, &Buffer::new().with_pts(ms(40)));
        tracker.record(25, &Buffer::new().with_pts(ms(80)).with_flags(BufferFlags::DELTA_UNIT));

        // 帧从偏移 12 开始: 记录 0 与 10 被消费, 取最后一条
        let info = tracker.take_at_offset(12);
        assert_eq!(info.pts, Some(ms(40)));
        assert_eq!(tracker.len(), 1);

        // 下一帧仍在偏移 25 之前, 没有新记录
        assert_eq!(tracker.take_at_offset(20).pts, None);

        let info = tracker.take_at_offset(25);
        assert_eq!(info.pts, Some(ms(80)));
        assert!(info.flags.contains(BufferFlags::DELTA_UNIT));
        assert!(tracker.is_empty());
    }
}
