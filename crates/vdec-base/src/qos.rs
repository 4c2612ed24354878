//! QoS 控制器.
//!
//! 保存下游反馈的 `(proportion, earliest_time)` 以及处理/丢弃计数.
//! 反馈来自与解码线程无关的路径, 因此这组数据单独加锁, 持锁时间只覆盖读写本身.
//! 控制器只回答"是否过晚", 从不自行丢帧.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;
use vdec_core::ClockTime;

/// 默认比例 (尚未收到反馈)
pub const DEFAULT_PROPORTION: f64 = 0.5;

#[derive(Debug)]
struct QosState {
    proportion: f64,
    earliest_time: Option<ClockTime>,
    frame_duration: Option<ClockTime>,
    processed: u64,
    dropped: u64,
}

impl Default for QosState {
    fn default() -> Self {
        Self {
            proportion: DEFAULT_PROPORTION,
            earliest_time: None,
            frame_duration: None,
            processed: 0,
            dropped: 0,
        }
    }
}

/// QoS 状态快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QosSnapshot {
    /// 下游比例
    pub proportion: f64,
    /// 最早期限
    pub earliest_time: Option<ClockTime>,
    /// 已处理帧数
    pub processed: u64,
    /// 已丢弃帧数
    pub dropped: u64,
}

/// QoS 控制器
#[derive(Debug, Default)]
pub struct QosController {
    state: Mutex<QosState>,
}

impl QosController {
    /// 创建控制器
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QosState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 处理下游 QoS 反馈
    ///
    /// # 参数
    /// - `proportion`: 下游处理速度比例
    /// - `diff`: 下游观测到的迟到量 (纳秒), 正数表示已迟到
    /// - `timestamp`: 反馈对应的运行时间
    pub fn update(&self, proportion: f64, diff: i64, timestamp: Option<ClockTime>) {
        let mut state = self.lock();
        let frame = state.frame_duration.unwrap_or(ClockTime::ZERO);
        state.proportion = proportion;
        state.earliest_time = timestamp.map(|ts| {
            if diff > 0 {
                let lateness = diff.saturating_mul(2);
                ts.offset_by(lateness).map_or(ClockTime::MAX, |t| t + frame)
            } else {
                ts.offset_by(diff).unwrap_or(ClockTime::ZERO)
            }
        });
        trace!(
            "QoS 更新: proportion={:.3}, diff={}, earliest={}",
            proportion,
            diff,
            ClockTime::display(state.earliest_time)
        );
    }

    /// 直接设置最早期限
    pub fn set_earliest_time(&self, earliest: Option<ClockTime>) {
        self.lock().earliest_time = earliest;
    }

    /// 最早期限
    pub fn earliest_time(&self) -> Option<ClockTime> {
        self.lock().earliest_time
    }

    /// 下游比例
    pub fn proportion(&self) -> f64 {
        self.lock().proportion
    }

    /// 设置输出帧时长, 用于迟到时额外推后期限
    pub fn set_frame_duration(&self, duration: Option<ClockTime>) {
        self.lock().frame_duration = duration;
    }

    /// 运行时间为 `running_time` 的输出是否已过晚
    ///
    /// 期限或运行时间未知时不算过晚.
    pub fn is_late(&self, running_time: Option<ClockTime>) -> bool {
        match (running_time, self.lock().earliest_time) {
            (Some(rt), Some(earliest)) => rt < earliest,
            _ => false,
        }
    }

    /// 距离最早期限还剩的解码时间 (纳秒)
    ///
    /// 期限未知时返回 `i64::MAX`.
    pub fn max_decode_time(&self, deadline: Option<ClockTime>) -> i64 {
        match (deadline, self.lock().earliest_time) {
            (Some(deadline), Some(earliest)) => deadline.diff(earliest),
            _ => i64::MAX,
        }
    }

    /// 计入一帧已处理
    pub fn record_processed(&self) {
        self.lock().processed += 1;
    }

    /// 计入一帧已丢弃, 返回计入后的快照
    pub fn record_dropped(&self) -> QosSnapshot {
        let mut state = self.lock();
        state.dropped += 1;
        snapshot_of(&state)
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> QosSnapshot {
        snapshot_of(&self.lock())
    }

    /// 清除最早期限并恢复默认比例
    ///
    /// `full` 为真时同时清零计数与帧时长.
    pub fn reset(&self, full: bool) {
        let mut state = self.lock();
        state.earliest_time = None;
        state.proportion = DEFAULT_PROPORTION;
        if full {
            state.processed = 0;
            state.dropped = 0;
            state.frame_duration = None;
        }
    }
}

fn snapshot_of(state: &QosState) -> QosSnapshot {
    QosSnapshot {
        proportion: state.proportion,
        earliest_time: state.earliest_time,
        processed: state.processed,
        dropped: state.dropped,
    }
}
