//! 控制事件.
//!
//! 事件与数据在同一条流上传递. 串行化事件必须与缓冲区保持相对顺序,
//! 非串行化事件 (如 FLUSH_START) 立即传递.

use vdec_core::{ClockTime, Segment, SegmentFlags};

use crate::caps::Caps;
use crate::tags::TagList;

/// 标签作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagScope {
    /// 只对当前流有效
    Stream,
    /// 对整个节目有效
    Global,
}

/// 事件类型, 按流中的先后约束排序
///
/// 基类依赖该顺序: 设置输出格式前先送出排在 `Caps` 之前的事件,
/// 反向播放时提前处理不晚于 `Segment` 的事件.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// 开始刷新
    FlushStart,
    /// 结束刷新
    FlushStop,
    /// 新流开始
    StreamStart,
    /// 格式
    Caps,
    /// 播放段
    Segment,
    /// 元数据标签
    Tag,
    /// 数据空隙
    Gap,
    /// 静止帧
    StillFrame,
    /// 即时速率切换
    InstantRateChange,
    /// 段播放完毕
    SegmentDone,
    /// 流结束
    Eos,
    /// 自定义
    Custom,
}

/// 控制事件
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// 开始刷新, 丢弃所有在途数据
    FlushStart,
    /// 结束刷新
    FlushStop {
        /// 是否重置运行时间
        reset_time: bool,
    },
    /// 新流开始
    StreamStart {
        /// 流标识
        stream_id: String,
    },
    /// 格式变化
    Caps(Caps),
    /// 新播放段
    Segment(Segment),
    /// 元数据标签
    Tag {
        /// 标签列表
        tags: TagList,
        /// 作用域
        scope: TagScope,
    },
    /// 数据空隙
    Gap {
        /// 空隙起点
        timestamp: ClockTime,
        /// 空隙时长
        duration: Option<ClockTime>,
    },
    /// 静止帧开始/结束
    StillFrame {
        /// 是否进入静止状态
        active: bool,
    },
    /// 即时速率切换
    InstantRateChange {
        /// 速率倍数
        rate_multiplier: f64,
        /// 新的段标志
        flags: SegmentFlags,
    },
    /// 段播放完毕
    SegmentDone {
        /// 结束位置
        position: Option<ClockTime>,
    },
    /// 流结束
    Eos,
    /// 自定义事件
    Custom {
        /// 名称
        name: String,
        /// 是否与数据串行
        serialized: bool,
    },
}

impl Event {
    /// 事件类型
    pub fn kind(&self) -> EventKind {
        match self {
            Self::FlushStart => EventKind::FlushStart,
            Self::FlushStop { .. } => EventKind::FlushStop,
            Self::StreamStart { .. } => EventKind::StreamStart,
            Self::Caps(_) => EventKind::Caps,
            Self::Segment(_) => EventKind::Segment,
            Self::Tag { .. } => EventKind::Tag,
            Self::Gap { .. } => EventKind::Gap,
            Self::StillFrame { .. } => EventKind::StillFrame,
            Self::InstantRateChange { .. } => EventKind::InstantRateChange,
            Self::SegmentDone { .. } => EventKind::SegmentDone,
            Self::Eos => EventKind::Eos,
            Self::Custom { .. } => EventKind::Custom,
        }
    }

    /// 是否必须与数据保持顺序
    pub fn is_serialized(&self) -> bool {
        match self {
            Self::FlushStart | Self::InstantRateChange { .. } => false,
            Self::Custom { serialized, .. } => *serialized,
            _ => true,
        }
    }

    /// 刷新后是否需要重新送出 (粘性事件)
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            Self::StreamStart { .. } | Self::Caps(_) | Self::Segment(_) | Self::Tag { .. } | Self::Eos
        )
    }

    /// 事件名称, 用于日志
    pub fn name(&self) -> &str {
        match self {
            Self::FlushStart => "flush-start",
            Self::FlushStop { .. } => "flush-stop",
            Self::StreamStart { .. } => "stream-start",
            Self::Caps(_) => "caps",
            Self::Segment(_) => "segment",
            Self::Tag { .. } => "tag",
            Self::Gap { .. } => "gap",
            Self::StillFrame { .. } => "still-frame",
            Self::InstantRateChange { .. } => "instant-rate-change",
            Self::SegmentDone { .. } => "segment-done",
            Self::Eos => "eos",
            Self::Custom { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_类型顺序() {
        assert!(EventKind::StreamStart < EventKind::Caps);
        assert!(EventKind::Caps < EventKind::Segment);
        assert!(EventKind::Segment < EventKind::Tag);
    }

    #[test]
    fn test_event_串行与粘性() {
        assert!(!Event::FlushStart.is_serialized());
        assert!(Event::Eos.is_serialized());
        assert!(Event::Segment(Segment::new_time()).is_sticky());
        assert!(!Event::Gap { timestamp: ClockTime::ZERO, duration: None }.is_sticky());
        let custom = Event::Custom { name: "mark".into(), serialized: false };
        assert!(!custom.is_serialized());
        assert_eq!(custom.name(), "mark");
    }
}
