//! 输出排序与时间戳重建 (OutputSequencer).
//!
//! 编解码器完成一帧时, 基类按以下顺序补全时间戳:
//! 1. 帧没有时长时按帧率推算
//! 2. 没有 PTS 且输出未乱序时, 用在途帧中最小的 DTS 加上关键帧测得的 PTS-DTS 差
//! 3. 仍没有 PTS 时, 取在途帧中最小的 PTS
//! 4. 最后的猜测: 上一个输出 PTS 加时长 (首帧取段起点); 没有时长的关键帧用 DTS
//! 5. PTS 小于上一个输出时视为乱序, 钳到上一个输出值
//!
//! 之后按输出段裁剪, 做 QoS 判断, 交给下游.

use log::{debug, error, trace, warn};
use vdec_core::{Buffer, BufferFlags, ClockTime, VdecError, VdecResult};

use crate::context::DecoderContext;
use crate::frame::{CodecFrame, FrameId};
use crate::message::{Message, QosStats};
use crate::registry::FrameRegistry;
use crate::sink::SinkItem;

/// 没有时长的输出按此长度参与裁剪
const DEFAULT_CLIP_DURATION: ClockTime = ClockTime::from_mseconds(40);

/// QoS 消息中的质量值 (百万分之一)
const QOS_QUALITY: i32 = 1_000_000;

/// 输出时间戳状态
#[derive(Debug, Default)]
pub struct OutputSequencer {
    pub(crate) last_timestamp_out: Option<ClockTime>,
    pub(crate) pts_delta: Option<i64>,
    pub(crate) reordered_output: bool,
    pub(crate) base_timestamp: Option<ClockTime>,
    pub(crate) base_picture_number: u32,
}

impl OutputSequencer {
    /// 创建初始状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 上一个输出的 PTS
    pub fn last_timestamp_out(&self) -> Option<ClockTime> {
        self.last_timestamp_out
    }

    /// 是否检测到过乱序输出
    pub fn is_reordered(&self) -> bool {
        self.reordered_output
    }

    /// 关键帧上测得的 PTS-DTS 差
    pub fn pts_delta(&self) -> Option<i64> {
        self.pts_delta
    }

    /// 派发关键帧时记录 PTS-DTS 差
    pub(crate) fn record_pts_delta(&mut self, frame: &CodecFrame) {
        if !frame.is_sync_point() {
            return;
        }
        if let (Some(pts), Some(dts)) = (frame.pts, frame.dts) {
            let delta = pts.diff(dts);
            debug!("PTS-DTS 差 {} ms", delta / 1_000_000);
            self.pts_delta = Some(delta);
        }
    }

    /// 补全登记表中第 `index` 帧的时间戳
    ///
    /// # 参数
    /// - `frame_duration`: 按帧率推算的时长
    /// - `forward_start`: 正向播放时的输出段起点, 用作首帧的最后猜测
    pub(crate) fn reconstruct(
        &mut self,
        frames: &mut FrameRegistry,
        index: usize,
        frame_duration: Option<ClockTime>,
        forward_start: Option<ClockTime>,
    ) {
        let Some(frame) = frames.get_at_mut(index) else {
            return;
        };
        if let Some(pts) = frame.pts {
            if Some(pts) != self.base_timestamp {
                trace!("同步时间戳 {pts}");
                self.base_timestamp = Some(pts);
                self.base_picture_number = frame.decode_frame_number;
            }
        }
        if frame.duration.is_none() {
            frame.duration = frame_duration;
            trace!("推算时长 {}", ClockTime::display(frame.duration));
        }
        let sync = frame.is_sync_point();
        let dts = frame.dts;
        let duration = frame.duration;
        let own_dts_hint = frame.dts_hint;
        let own_pts_hint = frame.pts_hint;
        let mut pts = frame.pts;

        // DTS 单调递增, 最小的未输出 DTS 是 PTS 的好估计
        let (min_dts, oldest, seen_none) = min_hint(frames, |f| f.dts_hint);
        if let Some(oldest) = oldest.filter(|&i| i != index) {
            if let Some(f) = frames.get_at_mut(oldest) {
                f.dts_hint = own_dts_hint;
            }
        }
        if !self.reordered_output && pts.is_none() && !seen_none {
            if let (Some(min_dts), Some(delta)) = (min_dts, self.pts_delta) {
                pts = min_dts.offset_by(delta);
                trace!("没有 PTS, 使用最早的 DTS: {}", ClockTime::display(pts));
            }
        }

        let (min_pts, oldest, seen_none) = min_hint(frames, |f| f.pts_hint);
        if let Some(oldest) = oldest.filter(|&i| i != index) {
            if let Some(f) = frames.get_at_mut(oldest) {
                f.pts_hint = own_pts_hint;
            }
        }
        if self.reordered_output && !seen_none {
            pts = None;
        }
        if pts.is_none() && !seen_none {
            pts = min_pts;
            trace!("没有 PTS, 使用最早的 PTS: {}", ClockTime::display(pts));
        }

        if pts.is_none() {
            if let Some(duration) = duration {
                pts = match self.last_timestamp_out {
                    Some(last) => Some(last + duration),
                    None => forward_start,
                };
                trace!("猜测时间戳 {}", ClockTime::display(pts));
            } else if sync && dts.is_some() {
                pts = dts;
                trace!("以 DTS 作为 PTS: {}", ClockTime::display(pts));
            }
        }

        if let (Some(last), Some(value)) = (self.last_timestamp_out, pts) {
            if value < last {
                warn!("时间戳倒退 ({value} < {last})");
                self.reordered_output = true;
                pts = Some(last);
            }
        }
        if pts.is_some() {
            self.last_timestamp_out = pts;
        }

        if let Some(frame) = frames.get_at_mut(index) {
            frame.pts = pts;
        }
    }

    /// 清除时间戳状态
    ///
    /// `full` 为真时同时清除乱序标记.
    pub(crate) fn reset(&mut self, full: bool) {
        self.base_timestamp = None;
        self.last_timestamp_out = None;
        self.pts_delta = None;
        if full {
            self.reordered_output = false;
            self.base_picture_number = 0;
        }
    }
}

/// 在途帧中最小的提示值, 及其位置与是否有帧缺少该值
fn min_hint(
    frames: &FrameRegistry,
    hint: impl Fn(&CodecFrame) -> Option<ClockTime>,
) -> (Option<ClockTime>, Option<usize>, bool) {
    let mut min: Option<ClockTime> = None;
    let mut at = None;
    let mut seen_none = false;
    for (i, frame) in frames.iter().enumerate() {
        match hint(frame) {
            None => seen_none = true,
            Some(ts) if min.is_none_or(|m| ts < m) => {
                min = Some(ts);
                at = Some(i);
            }
            Some(_) => {}
        }
    }
    (min, at, seen_none)
}

impl DecoderContext {
    /// 完成一帧, 输出其解码图像
    ///
    /// 帧没有输出缓冲区或只解码不显示时, 只释放帧. 反向播放时图像先进入输出队列,
    /// 待整个 GOP 解码完毕后倒序送出.
    pub fn finish_frame(&mut self, id: FrameId) -> VdecResult<()> {
        if self.frames.position(id).is_none() {
            return self.unknown_frame(id);
        }
        trace!("完成帧 #{id}");

        if self.needs_negotiation() {
            if let Err(e) = self.negotiate() {
                self.take_frame(id);
                return Err(if self.is_flushing() { VdecError::Flushing } else { e });
            }
        }

        self.prepare_finish_frame(id, false);
        self.qos.record_processed();

        if self.tags_changed {
            if let Some(event) = self.merged_tags_event() {
                self.push_event(event);
            }
            self.tags_changed = false;
        }

        let Some(mut frame) = self.take_frame(id) else {
            return Err(VdecError::Internal(format!("帧 #{id} 在完成过程中消失")));
        };
        let output = frame.output_buffer.take();
        let Some(mut buffer) = output.filter(|_| !frame.is_decode_only()) else {
            trace!("帧 #{id} 不输出 (PTS {})", ClockTime::display(frame.pts));
            return Ok(());
        };

        buffer.flags.remove(BufferFlags::DELTA_UNIT);
        buffer.pts = frame.pts;
        buffer.dts = None;
        buffer.duration = frame.duration;
        buffer.offset = None;
        if self.discont {
            buffer.flags.insert(BufferFlags::DISCONT);
        }

        if self.is_flushing() {
            debug!("正在刷新, 丢弃帧 #{id} 的输出");
            return Err(VdecError::Flushing);
        }

        if self.output_segment.rate < 0.0 && !self.output_segment.is_key_units() {
            self.output_queued.push_front(buffer);
            Ok(())
        } else {
            self.clip_and_push(buffer)
        }
    }

    /// 丢弃一帧, 并通知应用 (QoS 消息)
    pub fn drop_frame(&mut self, id: FrameId) -> VdecResult<()> {
        if self.frames.position(id).is_none() {
            return self.unknown_frame(id);
        }
        self.prepare_finish_frame(id, true);
        let pts = self.frames.get(id).and_then(|f| f.pts);
        debug!("丢弃帧 #{id} (PTS {})", ClockTime::display(pts));
        self.post_qos_drop(pts);
        self.take_frame(id);
        Ok(())
    }

    /// 释放一帧, 不输出也不计入 QoS
    pub fn release_frame(&mut self, id: FrameId) -> VdecResult<()> {
        match self.take_frame(id) {
            Some(_) => Ok(()),
            None => self.unknown_frame(id),
        }
    }

    /// 移出登记表, 帧上剩余的事件留给下一个输出
    fn take_frame(&mut self, id: FrameId) -> Option<CodecFrame> {
        let mut frame = self.frames.remove(id)?;
        self.pending_events.append(&mut frame.events);
        Some(frame)
    }

    fn unknown_frame(&mut self, id: FrameId) -> VdecResult<()> {
        if self.stale_frames.remove(&id) {
            debug!("帧 #{id} 已在刷新时清除, 忽略");
            Ok(())
        } else {
            Err(VdecError::UnknownFrame(id))
        }
    }

    /// 送出本帧之前的事件并补全时间戳
    fn prepare_finish_frame(&mut self, id: FrameId, dropping: bool) {
        let events = self.frames.take_events_through(id);
        if dropping || self.output_state.is_none() {
            self.pending_events.extend(events);
        } else {
            self.push_pending_events();
            self.push_event_list(events);
        }

        let Some(index) = self.frames.position(id) else {
            return;
        };
        let Some(frame) = self.frames.get(id) else {
            return;
        };
        if frame.is_decode_only() {
            return;
        }
        if frame.output_buffer.is_none() && !dropping {
            error!("帧 #{id} 没有输出缓冲区");
            return;
        }

        let frame_duration = self
            .output_state
            .as_ref()
            .and_then(|c| c.info.frame_duration())
            .or_else(|| self.input_state.as_ref().and_then(|c| c.info.frame_duration()));
        let forward_start = (self.output_segment.rate > 0.0).then_some(self.output_segment.start);
        self.sequencer
            .reconstruct(&mut self.frames, index, frame_duration, forward_start);
    }

    /// 按输出段裁剪并交给下游
    ///
    /// 完全落在段外的图像被丢弃; 若上下游仍处于同一段且图像已越过段的尽头,
    /// 返回 `Err(VdecError::Eos)`.
    pub(crate) fn clip_and_push(&mut self, mut buffer: Buffer) -> VdecResult<()> {
        self.had_output_data = true;

        let start = buffer.pts;
        let duration = buffer.duration;
        let stop = start.and_then(|s| s.checked_add(duration.unwrap_or(DEFAULT_CLIP_DURATION)));

        let Some((cstart, cstop)) = self.output_segment.clip(start, stop) else {
            debug!(
                "丢弃段外图像: {} - {}, 段 {} - {}",
                ClockTime::display(start),
                ClockTime::display(stop),
                self.output_segment.start,
                ClockTime::display(self.output_segment.stop)
            );
            if self.in_out_segment_sync {
                let segment = &self.output_segment;
                let past_end = if segment.rate >= 0.0 {
                    matches!((start, segment.stop), (Some(pts), Some(end)) if pts >= end)
                } else {
                    start.is_some_and(|pts| pts < segment.start)
                };
                if past_end {
                    return Err(VdecError::Eos);
                }
            }
            return Ok(());
        };

        buffer.pts = cstart;
        if stop.is_some() && duration.is_some() {
            if let (Some(cstart), Some(cstop)) = (cstart, cstop) {
                buffer.duration = Some(cstop.saturating_sub(cstart));
            }
        }

        if self.config.qos {
            if let Some(cstart) = cstart {
                let running_time = self.output_segment.to_running_time(cstart);
                if self.qos.is_late(running_time) {
                    warn!(
                        "QoS 丢帧: start={cstart}, 运行时间 {}, 最早期限 {}",
                        ClockTime::display(running_time),
                        ClockTime::display(self.qos.earliest_time())
                    );
                    self.post_qos_drop(Some(cstart));
                    self.discont = true;
                    return Ok(());
                }
            }
        }

        if self.discont {
            buffer.flags.insert(BufferFlags::DISCONT);
            self.discont = false;
        }

        self.bytes_out += buffer.size() as u64;
        self.time = match (self.time, duration) {
            (Some(time), Some(duration)) => Some(time + duration),
            _ => None,
        };
        self.error_count = 0;

        trace!(
            "输出图像: {} 字节, PTS {}, 时长 {}",
            buffer.size(),
            ClockTime::display(buffer.pts),
            ClockTime::display(buffer.duration)
        );
        self.outgoing.push(SinkItem::Buffer(buffer));
        Ok(())
    }

    /// 计入一次丢帧并发出 QoS 消息
    pub(crate) fn post_qos_drop(&mut self, timestamp: Option<ClockTime>) {
        let snapshot = self.qos.record_dropped();
        let segment = if self.output_segment.is_defined() {
            &self.output_segment
        } else {
            &self.input_segment
        };
        let stream_time = timestamp.and_then(|t| segment.to_stream_time(t));
        let running_time = timestamp.and_then(|t| segment.to_running_time(t));
        let jitter = match (snapshot.earliest_time, running_time) {
            (Some(earliest), Some(rt)) => earliest.diff(rt),
            _ => 0,
        };
        self.post_message(Message::Qos(QosStats {
            running_time,
            stream_time,
            timestamp,
            jitter,
            proportion: snapshot.proportion,
            quality: QOS_QUALITY,
            processed: snapshot.processed,
            dropped: snapshot.dropped,
        }));
    }
}
