//! 视频解码器基类 (VideoDecoder).
//!
//! 把一个 `VideoCodec` 与一个下游 `Sink` 连接起来. 所有流状态由流锁保护,
//! 编解码器回调在锁内执行; 产生的输出在释放锁之后才交给下游.
//! QoS 反馈经 `qos()` 直接更新, 不需要流锁.
//!
//! # 使用示例
//! ```
//! use std::sync::Arc;
//! use vdec_base::{CollectSink, DecoderConfig, VideoDecoder, codecs::RawVideoDecoder};
//!
//! let sink = Arc::new(CollectSink::new());
//! let decoder = VideoDecoder::new(
//!     Box::new(RawVideoDecoder::new()),
//!     sink.clone(),
//!     DecoderConfig::default(),
//! )
//! .unwrap();
//! decoder.start().unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, trace, warn};
use vdec_core::{Buffer, ClockTime, Segment, SegmentFlags, VdecError, VdecResult};

use crate::codec::VideoCodec;
use crate::config::DecoderConfig;
use crate::context::DecoderContext;
use crate::drain::{self, DrainState};
use crate::event::{Event, EventKind, TagScope};
use crate::forward;
use crate::frame::FrameId;
use crate::message::Message;
use crate::qos::{QosController, QosSnapshot};
use crate::reverse;
use crate::sink::{Sink, SinkItem};

/// 即时速率切换可以覆盖的段标志
const INSTANT_FLAGS: SegmentFlags = SegmentFlags::TRICKMODE.union(SegmentFlags::TRICKMODE_KEY_UNITS);

/// 解码器运行统计
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderStats {
    /// 已派发、尚未完成的帧数
    pub frames_in_flight: usize,
    /// 已输出字节数
    pub bytes_out: u64,
    /// 已输出时长, 有输出缺少时长时为 None
    pub time: Option<ClockTime>,
    /// 当前累计的错误权重
    pub error_count: i32,
    /// 排空/刷新状态
    pub drain_state: DrainState,
    /// QoS 状态
    pub qos: QosSnapshot,
}

struct StreamInner {
    codec: Box<dyn VideoCodec>,
    ctx: DecoderContext,
}

/// 视频解码器基类
pub struct VideoDecoder {
    stream: Mutex<StreamInner>,
    qos: Arc<QosController>,
    flushing: Arc<AtomicBool>,
    sink: Arc<dyn Sink>,
}

impl VideoDecoder {
    /// 创建解码器
    pub fn new(
        codec: Box<dyn VideoCodec>,
        sink: Arc<dyn Sink>,
        config: DecoderConfig,
    ) -> VdecResult<Self> {
        config.validate()?;
        let qos = Arc::new(QosController::new());
        let flushing = Arc::new(AtomicBool::new(false));
        let ctx = DecoderContext::new(config, Arc::clone(&qos), Arc::clone(&flushing));
        debug!("创建解码器: codec={}", codec.name());
        Ok(Self {
            stream: Mutex::new(StreamInner { codec, ctx }),
            qos,
            flushing,
            sink,
        })
    }

    fn lock(&self) -> VdecResult<MutexGuard<'_, StreamInner>> {
        self.stream
            .lock()
            .map_err(|_| VdecError::Internal("流锁已失效 (持锁线程 panic)".into()))
    }

    /// 在流锁内执行 `f`, 释放锁后把产生的输出交给下游
    ///
    /// `f` 出错时返回其错误, 否则返回下游报告的第一个错误.
    fn with_stream<R>(
        &self,
        f: impl FnOnce(&mut dyn VideoCodec, &mut DecoderContext) -> VdecResult<R>,
    ) -> VdecResult<R> {
        let (result, items) = {
            let mut guard = self.lock()?;
            let StreamInner { codec, ctx } = &mut *guard;
            let result = f(codec.as_mut(), ctx);
            (result, ctx.take_outgoing())
        };
        let delivered = self.deliver(items);
        let value = result?;
        delivered.map(|()| value)
    }

    fn deliver(&self, items: Vec<SinkItem>) -> VdecResult<()> {
        let mut result = Ok(());
        for item in items {
            match item {
                SinkItem::Buffer(buffer) => {
                    if self.flushing.load(Ordering::Acquire) {
                        trace!("正在刷新, 丢弃输出");
                        if result.is_ok() {
                            result = Err(VdecError::Flushing);
                        }
                        continue;
                    }
                    if result.is_err() {
                        trace!("下游已返回错误, 丢弃输出");
                        continue;
                    }
                    if let Err(e) = self.sink.push_buffer(buffer) {
                        debug!("下游拒绝输出: {e}");
                        result = Err(e);
                    }
                }
                SinkItem::Event(event) => {
                    let name = event.name().to_string();
                    if !self.sink.push_event(event) {
                        debug!("下游未处理事件 {name}");
                    }
                }
                SinkItem::Message(message) => self.sink.post_message(message),
            }
        }
        result
    }

    // ============================================================
    // 生命周期
    // ============================================================

    /// 打开编解码器
    pub fn open(&self) -> VdecResult<()> {
        self.with_stream(|codec, _| codec.open())
    }

    /// 开始处理数据 (完全重置流状态)
    pub fn start(&self) -> VdecResult<()> {
        self.flushing.store(false, Ordering::Release);
        self.with_stream(|codec, ctx| {
            ctx.reset(true, true);
            ctx.drain_state = DrainState::default();
            codec.start()?;
            info!("解码器 {} 已启动", codec.name());
            Ok(())
        })
    }

    /// 停止处理数据 (完全重置流状态)
    pub fn stop(&self) -> VdecResult<()> {
        self.with_stream(|codec, ctx| {
            let result = codec.stop();
            ctx.reset(true, true);
            ctx.drain_state = DrainState::default();
            info!("解码器 {} 已停止", codec.name());
            result
        })
    }

    /// 关闭编解码器
    pub fn close(&self) -> VdecResult<()> {
        self.with_stream(|codec, _| codec.close())
    }

    // ============================================================
    // 数据与事件
    // ============================================================

    /// 送入一个压缩数据缓冲区
    ///
    /// # 返回
    /// - `Err(VdecError::NotNegotiated)`: 需要输入格式但尚未收到, 或格式被拒绝
    /// - `Err(VdecError::Flushing)`: 正在刷新
    /// - `Err(VdecError::Eos)`: 输出已越过段的尽头
    pub fn push_buffer(&self, buffer: Buffer) -> VdecResult<()> {
        if self.flushing.load(Ordering::Acquire) {
            debug!("正在刷新, 拒绝输入");
            return Err(VdecError::Flushing);
        }
        self.with_stream(|codec, ctx| chain(codec, ctx, buffer))
    }

    /// 送入一个控制事件
    pub fn send_event(&self, event: Event) -> VdecResult<()> {
        trace!("收到事件 {}", event.name());
        match event {
            Event::FlushStart => {
                // 不取流锁, 正在进行的解码在下一次输出时发现刷新
                self.flushing.store(true, Ordering::Release);
                if !self.sink.push_event(Event::FlushStart) {
                    debug!("下游未处理事件 flush-start");
                }
                Ok(())
            }
            Event::FlushStop { reset_time } => {
                let result = self.with_stream(|codec, ctx| {
                    flush_stop(codec, ctx);
                    ctx.push_event(Event::FlushStop { reset_time });
                    Ok(())
                });
                self.flushing.store(false, Ordering::Release);
                result
            }
            other => self.with_stream(|codec, ctx| sink_event(codec, ctx, other)),
        }
    }

    /// 完成一帧 (供在回调之外完成帧的异步编解码器使用)
    pub fn finish_frame(&self, id: FrameId) -> VdecResult<()> {
        self.with_stream(|_, ctx| ctx.finish_frame(id))
    }

    /// 丢弃一帧 (供异步编解码器使用)
    pub fn drop_frame(&self, id: FrameId) -> VdecResult<()> {
        self.with_stream(|_, ctx| ctx.drop_frame(id))
    }

    /// 以编解码器的分配策略协商输出格式
    pub fn negotiate(&self) -> VdecResult<()> {
        self.with_stream(|codec, ctx| ctx.negotiate_with(&mut |query| codec.decide_allocation(query)))
    }

    /// 在流锁内访问编解码器与流状态
    pub fn with_context<R>(
        &self,
        f: impl FnOnce(&mut dyn VideoCodec, &mut DecoderContext) -> VdecResult<R>,
    ) -> VdecResult<R> {
        self.with_stream(f)
    }

    // ============================================================
    // QoS 与统计
    // ============================================================

    /// QoS 控制器, 下游反馈可在任意线程更新
    pub fn qos(&self) -> &Arc<QosController> {
        &self.qos
    }

    /// 处理下游 QoS 反馈
    pub fn handle_qos(&self, proportion: f64, diff: i64, timestamp: Option<ClockTime>) {
        self.qos.update(proportion, diff, timestamp);
    }

    /// 当前排空/刷新状态
    pub fn drain_state(&self) -> VdecResult<DrainState> {
        Ok(self.lock()?.ctx.drain_state)
    }

    /// 运行统计
    pub fn stats(&self) -> VdecResult<DecoderStats> {
        let guard = self.lock()?;
        let ctx = &guard.ctx;
        Ok(DecoderStats {
            frames_in_flight: ctx.frames.len(),
            bytes_out: ctx.bytes_out,
            time: ctx.time,
            error_count: ctx.error_count,
            drain_state: ctx.drain_state,
            qos: self.qos.snapshot(),
        })
    }
}

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("flushing", &self.flushing.load(Ordering::Relaxed))
            .field("qos", &self.qos.snapshot())
            .finish_non_exhaustive()
    }
}

// ============================================================
// 流锁内的处理
// ============================================================

fn chain(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext, buffer: Buffer) -> VdecResult<()> {
    if ctx.config.needs_format && ctx.input_state.is_none() {
        return Err(VdecError::NotNegotiated("尚未收到输入格式".into()));
    }
    if ctx.format_rejected {
        return Err(VdecError::NotNegotiated("输入格式已被拒绝".into()));
    }

    trace!(
        "收到缓冲区: {} 字节, PTS {}, DTS {}, 标志 {:?}",
        buffer.size(),
        ClockTime::display(buffer.pts),
        ClockTime::display(buffer.dts),
        buffer.flags
    );

    if !ctx.input_segment.is_defined() {
        warn!("收到数据前没有段事件, 假设时间戳从 0 开始");
        let segment = Segment::new_time();
        ctx.input_segment = segment.clone();
        ctx.queue_event(Event::Segment(segment));
    }

    ctx.had_input_data = true;
    ctx.drain_state = DrainState::Running;

    if ctx.input_segment.rate > 0.0 {
        forward::chain_forward(codec, ctx, buffer, false)
    } else {
        reverse::chain_reverse(codec, ctx, Some(buffer))
    }
}

fn flush_stop(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext) {
    // 粘性事件 (段与 EOS 除外) 在刷新后仍需送出
    let keep = |event: &Event| {
        event.is_sticky() && !matches!(event.kind(), EventKind::Segment | EventKind::Eos)
    };
    let mut sticky: Vec<Event> = Vec::new();
    for frame in ctx.frames.iter_mut() {
        sticky.extend(frame.take_events().into_iter().filter(keep));
    }
    sticky.extend(
        std::mem::take(&mut ctx.current_frame_events)
            .into_iter()
            .filter(keep),
    );

    drain::flush(codec, ctx, true);
    ctx.pending_events.extend(sticky);
}

fn sink_event(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext, event: Event) -> VdecResult<()> {
    if matches!(ctx.drain_state, DrainState::Flushed { .. }) {
        ctx.drain_state = DrainState::Running;
    }

    match event {
        Event::StreamStart { .. } => {
            let result = drain::drain_out(codec, ctx, false);
            if ctx.upstream_tags.take().is_some() {
                ctx.tags_changed = true;
            }
            ctx.push_event(event);
            result
        }
        Event::Caps(caps) => set_format(codec, ctx, caps),
        Event::Segment(mut segment) => {
            if !segment.is_time() {
                debug!("忽略非 TIME 格式的段");
                return Ok(());
            }
            if let Some(flags) = ctx.decode_flags_override {
                segment.flags.remove(INSTANT_FLAGS);
                segment.flags.insert(flags & INSTANT_FLAGS);
            }
            debug!(
                "输入段: start={}, stop={}, rate={}",
                segment.start,
                ClockTime::display(segment.stop),
                segment.rate
            );
            ctx.sequencer.base_timestamp = None;
            ctx.sequencer.base_picture_number = 0;
            ctx.input_segment = segment.clone();
            ctx.in_out_segment_sync = false;
            ctx.queue_event(Event::Segment(segment));
            Ok(())
        }
        Event::InstantRateChange { flags, .. } => {
            ctx.decode_flags_override = Some(flags);
            ctx.input_segment.flags.remove(INSTANT_FLAGS);
            ctx.input_segment.flags.insert(flags & INSTANT_FLAGS);
            ctx.push_event(event);
            Ok(())
        }
        Event::Gap { .. } => {
            let mut result = Ok(());
            if ctx.key_units_only() {
                result = drain::drain_out(codec, ctx, false);
            }
            if ctx.output_state.is_none() {
                return Err(VdecError::Format("GAP 事件之前没有协商输出格式".into()));
            }
            if ctx.needs_negotiation() {
                if let Err(e) = ctx.negotiate_with(&mut |query| codec.decide_allocation(query)) {
                    warn!("与下游协商失败: {e}");
                }
            }
            ctx.push_pending_events();
            let queued = std::mem::take(&mut ctx.current_frame_events);
            ctx.push_event_list(queued);
            ctx.push_event(event);
            result
        }
        Event::StillFrame { active } => {
            let result = if active {
                drain::drain_out(codec, ctx, false)
            } else {
                Ok(())
            };
            ctx.push_event(event);
            result
        }
        Event::SegmentDone { .. } => {
            let result = drain::drain_out(codec, ctx, true);
            push_queued_events(ctx);
            ctx.push_event(event);
            result
        }
        Event::Eos => {
            let result = drain::drain_out(codec, ctx, true);
            push_queued_events(ctx);
            ctx.push_event(Event::Eos);
            result?;
            if ctx.had_input_data && !ctx.had_output_data {
                let err = VdecError::SegmentUnderrun;
                warn!("{err}");
                ctx.post_message(Message::Error {
                    text: err.to_string(),
                });
                return Err(err);
            }
            Ok(())
        }
        Event::Tag {
            tags,
            scope: TagScope::Stream,
        } => {
            debug!("上游标签: {} 项", tags.len());
            ctx.upstream_tags = Some(tags);
            if let Some(merged) = ctx.merged_tags_event() {
                ctx.queue_event(merged);
            }
            Ok(())
        }
        other if other.is_serialized() => {
            ctx.queue_event(other);
            Ok(())
        }
        other => {
            ctx.push_event(other);
            Ok(())
        }
    }
}

/// 流结束前送出仍在排队的事件, 保持事件顺序
fn push_queued_events(ctx: &mut DecoderContext) {
    ctx.push_pending_events();
    let queued = std::mem::take(&mut ctx.current_frame_events);
    ctx.push_event_list(queued);
}

fn set_format(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext, caps: crate::caps::Caps) -> VdecResult<()> {
    if !ctx.format_rejected && ctx.input_state.as_ref() == Some(&caps) {
        trace!("输入格式未变化");
        return Ok(());
    }
    debug!("新的输入格式: {caps}");
    match codec.set_format(ctx, &caps) {
        Ok(true) => {
            ctx.input_state = Some(caps);
            ctx.format_rejected = false;
            Ok(())
        }
        Ok(false) => {
            warn!("编解码器 {} 拒绝输入格式 {caps}", codec.name());
            ctx.format_rejected = true;
            Err(VdecError::Format(format!("编解码器拒绝输入格式 {caps}")))
        }
        Err(e) => {
            warn!("设置输入格式失败: {e}");
            ctx.format_rejected = true;
            Err(e)
        }
    }
}
