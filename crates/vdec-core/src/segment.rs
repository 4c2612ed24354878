//! 播放段 (Segment).
//!
//! 描述一段连续播放区间 `[start, stop)` 及其播放速率, 用于把缓冲区时间戳
//! 换算为运行时间 (running time) 与流时间 (stream time), 以及输出裁剪.

use bitflags::bitflags;

use crate::clock::ClockTime;

/// 段的计量格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SegmentFormat {
    /// 未定义 (尚未收到段)
    #[default]
    Undefined,
    /// 时间 (纳秒)
    Time,
    /// 字节偏移
    Bytes,
}

bitflags! {
    /// 段标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SegmentFlags: u32 {
        /// 段切换时重置运行时间
        const RESET = 1 << 0;
        /// 段播放结束时发送 SEGMENT_DONE 而非 EOS
        const SEGMENT = 1 << 3;
        /// 快进/快退等特技播放
        const TRICKMODE = 1 << 4;
        /// 特技播放只解码关键帧
        const TRICKMODE_KEY_UNITS = 1 << 7;
    }
}

/// 播放段
///
/// 非 TIME 格式的段只作为占位记录, 时间换算均返回 None.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// 计量格式
    pub format: SegmentFormat,
    /// 段标志
    pub flags: SegmentFlags,
    /// 播放速率, 负数表示反向播放
    pub rate: f64,
    /// 上游已应用的速率
    pub applied_rate: f64,
    /// 运行时间基准
    pub base: ClockTime,
    /// 段起点
    pub start: ClockTime,
    /// 段终点, None 表示无界
    pub stop: Option<ClockTime>,
    /// 段起点对应的流时间
    pub time: ClockTime,
    /// 当前位置
    pub position: ClockTime,
    /// 段时长 (可选)
    pub duration: Option<ClockTime>,
}

impl Segment {
    /// 创建未定义的段
    pub fn undefined() -> Self {
        Self {
            format: SegmentFormat::Undefined,
            flags: SegmentFlags::empty(),
            rate: 1.0,
            applied_rate: 1.0,
            base: ClockTime::ZERO,
            start: ClockTime::ZERO,
            stop: None,
            time: ClockTime::ZERO,
            position: ClockTime::ZERO,
            duration: None,
        }
    }

    /// 创建从 0 开始、无界、正常速率的 TIME 段
    pub fn new_time() -> Self {
        Self {
            format: SegmentFormat::Time,
            ..Self::undefined()
        }
    }

    /// 设置播放速率
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// 设置段区间, 流时间与起点对齐
    pub fn with_range(mut self, start: ClockTime, stop: Option<ClockTime>) -> Self {
        self.start = start;
        self.stop = stop;
        self.time = start;
        self.position = start;
        self
    }

    /// 设置段标志
    pub fn with_flags(mut self, flags: SegmentFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 是否已定义
    pub fn is_defined(&self) -> bool {
        self.format != SegmentFormat::Undefined
    }

    /// 是否为 TIME 格式
    pub fn is_time(&self) -> bool {
        self.format == SegmentFormat::Time
    }

    /// 是否只解码关键帧
    pub fn is_key_units(&self) -> bool {
        self.flags.contains(SegmentFlags::TRICKMODE_KEY_UNITS)
    }

    /// 将 `[start, stop)` 裁剪到段内
    ///
    /// 完全落在段外时返回 None; 否则返回裁剪后的区间.
    /// 段起点与终点相同时, 恰好落在该点的区间仍视为在段内.
    pub fn clip(
        &self,
        start: Option<ClockTime>,
        stop: Option<ClockTime>,
    ) -> Option<(Option<ClockTime>, Option<ClockTime>)> {
        if !self.is_time() {
            return Some((start, stop));
        }

        if let (Some(seg_stop), Some(start)) = (self.stop, start) {
            if start > seg_stop || (self.start != seg_stop && start == seg_stop) {
                return None;
            }
        }
        if let Some(stop) = stop {
            if stop < self.start || (start != Some(stop) && stop == self.start) {
                return None;
            }
        }

        let clip_start = start.map(|s| s.max(self.start));
        let clip_stop = match (stop, self.stop) {
            (None, seg_stop) => seg_stop,
            (Some(stop), None) => Some(stop),
            (Some(stop), Some(seg_stop)) => Some(stop.min(seg_stop)),
        };
        Some((clip_start, clip_stop))
    }

    /// 换算为运行时间
    ///
    /// 位置落在段外或段不是 TIME 格式时返回 None.
    /// 反向播放时以段终点为基准倒数.
    pub fn to_running_time(&self, position: ClockTime) -> Option<ClockTime> {
        if !self.is_time() {
            return None;
        }
        if position < self.start {
            return None;
        }
        if let Some(stop) = self.stop {
            if position > stop {
                return None;
            }
        }

        let abs_rate = self.rate.abs();
        let elapsed = if self.rate > 0.0 {
            position.saturating_sub(self.start)
        } else {
            let stop = self
                .stop
                .or_else(|| self.duration.map(|d| self.start + d))?;
            stop.saturating_sub(position)
        };
        Some(scale_by_rate(elapsed, abs_rate) + self.base)
    }

    /// 换算为流时间
    pub fn to_stream_time(&self, position: ClockTime) -> Option<ClockTime> {
        if !self.is_time() {
            return None;
        }
        if position < self.start {
            return None;
        }
        if let Some(stop) = self.stop {
            if position > stop {
                return None;
            }
        }

        let elapsed = position.saturating_sub(self.start);
        let abs_applied = self.applied_rate.abs();
        let scaled = if abs_applied == 1.0 {
            elapsed
        } else {
            ClockTime::from_nseconds((elapsed.nseconds() as f64 * abs_applied) as u64)
        };
        if self.applied_rate > 0.0 {
            Some(self.time + scaled)
        } else {
            self.time.checked_sub(scaled)
        }
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::undefined()
    }
}

/// 按速率缩放经过的时间
fn scale_by_rate(elapsed: ClockTime, abs_rate: f64) -> ClockTime {
    if abs_rate == 1.0 || abs_rate == 0.0 {
        elapsed
    } else {
        ClockTime::from_nseconds((elapsed.nseconds() as f64 / abs_rate) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> ClockTime {
        ClockTime::from_mseconds(v)
    }

    #[test]
    fn test_segment_裁剪() {
        let seg = Segment::new_time().with_range(ms(100), Some(ms(200)));

        // 完全在段内
        assert_eq!(
            seg.clip(Some(ms(120)), Some(ms(160))),
            Some((Some(ms(120)), Some(ms(160))))
        );
        // 跨越起点
        assert_eq!(
            seg.clip(Some(ms(80)), Some(ms(120))),
            Some((Some(ms(100)), Some(ms(120))))
        );
        // 完全在终点之后
        assert_eq!(seg.clip(Some(ms(200)), Some(ms(240))), None);
        // 完全在起点之前
        assert_eq!(seg.clip(Some(ms(40)), Some(ms(100))), None);
    }

    #[test]
    fn test_segment_运行时间() {
        let seg = Segment::new_time().with_range(ms(100), Some(ms(500)));
        assert_eq!(seg.to_running_time(ms(150)), Some(ms(50)));
        assert_eq!(seg.to_running_time(ms(50)), None);

        let reverse = seg.clone().with_rate(-1.0);
        assert_eq!(reverse.to_running_time(ms(400)), Some(ms(100)));

        let fast = seg.with_rate(2.0);
        assert_eq!(fast.to_running_time(ms(300)), Some(ms(100)));
    }

    #[test]
    fn test_segment_流时间() {
        let mut seg = Segment::new_time().with_range(ms(100), None);
        seg.time = ms(1000);
        assert_eq!(seg.to_stream_time(ms(150)), Some(ms(1050)));
    }

    #[test]
    fn test_segment_未定义段不裁剪() {
        let seg = Segment::undefined();
        assert_eq!(seg.clip(Some(ms(5)), None), Some((Some(ms(5)), None)));
        assert_eq!(seg.to_running_time(ms(5)), None);
    }
}
