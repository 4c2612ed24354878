//! 总线消息.
//!
//! 与事件不同, 消息不在数据流上传递, 而是直接交给应用 (经 `Sink::post_message`).

use vdec_core::ClockTime;

/// QoS 丢帧诊断
#[derive(Debug, Clone, PartialEq)]
pub struct QosStats {
    /// 被丢弃帧的运行时间
    pub running_time: Option<ClockTime>,
    /// 被丢弃帧的流时间
    pub stream_time: Option<ClockTime>,
    /// 被丢弃帧的时间戳
    pub timestamp: Option<ClockTime>,
    /// 抖动 (纳秒) = 最早期限 - 运行时间
    pub jitter: i64,
    /// 下游报告的比例
    pub proportion: f64,
    /// 质量 (百万分之一)
    pub quality: i32,
    /// 已处理帧数
    pub processed: u64,
    /// 已丢弃帧数
    pub dropped: u64,
}

/// 总线消息
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// 因迟到而丢帧
    Qos(QosStats),
    /// 解码延迟发生变化
    Latency {
        /// 最小延迟
        min: ClockTime,
        /// 最大延迟, None 表示无上限
        max: Option<ClockTime>,
    },
    /// 可恢复的问题
    Warning {
        /// 描述
        text: String,
    },
    /// 致命错误
    Error {
        /// 描述
        text: String,
    },
}
