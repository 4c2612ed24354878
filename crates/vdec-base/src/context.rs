//! 解码器流状态 (DecoderContext).
//!
//! `DecoderContext` 保存流锁保护的全部状态: 输入/输出格式、段、在途帧、
//! 反向播放队列、时间戳与错误计数. 编解码器回调收到的 `&mut DecoderContext`
//! 就是加锁后的状态, 编解码器通过它完成、丢弃帧, 申请输出缓冲区, 设置输出格式.
//!
//! 发往下游的条目先记入 `outgoing`, 由 `VideoDecoder` 在释放流锁后统一送出.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, trace, warn};
use vdec_core::{
    Buffer, BufferPool, ClockTime, PixelFormat, Segment, SegmentFlags, VdecError, VdecResult,
    VideoInfo,
};

use crate::adapter::Adapter;
use crate::allocation::{AllocationQuery, default_decide_allocation};
use crate::caps::Caps;
use crate::config::DecoderConfig;
use crate::drain::DrainState;
use crate::event::{Event, EventKind, TagScope};
use crate::frame::{CodecFrame, FrameId};
use crate::message::Message;
use crate::output::OutputSequencer;
use crate::qos::QosController;
use crate::registry::FrameRegistry;
use crate::sink::SinkItem;
use crate::tags::{TagList, TagMergeMode};
use crate::timestamps::TimestampTracker;

/// 解码器流状态
#[derive(Debug)]
pub struct DecoderContext {
    pub(crate) config: DecoderConfig,
    pub(crate) qos: Arc<QosController>,
    pub(crate) flushing: Arc<AtomicBool>,

    // ============================================================
    // 格式
    // ============================================================
    pub(crate) input_state: Option<Caps>,
    pub(crate) format_rejected: bool,
    pub(crate) output_state: Option<Caps>,
    pub(crate) output_state_changed: bool,
    pub(crate) last_pushed_caps: Option<Caps>,
    pub(crate) pool: Option<BufferPool>,

    // ============================================================
    // 段
    // ============================================================
    pub(crate) input_segment: Segment,
    pub(crate) output_segment: Segment,
    pub(crate) in_out_segment_sync: bool,
    pub(crate) decode_flags_override: Option<SegmentFlags>,

    // ============================================================
    // 帧
    // ============================================================
    pub(crate) frames: FrameRegistry,
    /// 最近一次硬刷新时被清出登记表的帧, 编解码器之后仍可能完成它们
    pub(crate) stale_frames: HashSet<FrameId>,
    pub(crate) current_frame: Option<CodecFrame>,
    pub(crate) system_frame_number: FrameId,
    pub(crate) decode_frame_number: u32,
    pub(crate) distance_from_sync: u32,

    // ============================================================
    // 非打包输入
    // ============================================================
    pub(crate) input_adapter: Adapter,
    pub(crate) output_adapter: Adapter,
    pub(crate) timestamps: TimestampTracker,
    pub(crate) input_offset: u64,
    pub(crate) frame_offset: u64,

    // ============================================================
    // 反向播放队列
    // ============================================================
    /// 自上次不连续点以来收到的缓冲区 (到达顺序)
    pub(crate) gather: VecDeque<Buffer>,
    /// 尚未解析出帧的缓冲区
    pub(crate) parse: VecDeque<Buffer>,
    /// 已解析、待解码的帧 (解析顺序)
    pub(crate) parse_gather: VecDeque<CodecFrame>,
    /// 当前 GOP 待解码的帧 (解码顺序)
    pub(crate) decode: VecDeque<CodecFrame>,
    /// 已解码、待反向送出的图像 (最近解码的在前)
    pub(crate) output_queued: VecDeque<Buffer>,

    // ============================================================
    // 事件与标签
    // ============================================================
    /// 排在下一个新建帧之前的事件
    pub(crate) current_frame_events: Vec<Event>,
    /// 已脱离帧、等待下一个输出的事件
    pub(crate) pending_events: Vec<Event>,
    pub(crate) upstream_tags: Option<TagList>,
    pub(crate) tags: Option<TagList>,
    pub(crate) tags_merge_mode: TagMergeMode,
    pub(crate) tags_changed: bool,

    // ============================================================
    // 输出
    // ============================================================
    pub(crate) sequencer: OutputSequencer,
    pub(crate) discont: bool,
    pub(crate) error_count: i32,
    pub(crate) had_input_data: bool,
    pub(crate) had_output_data: bool,
    pub(crate) bytes_out: u64,
    pub(crate) time: Option<ClockTime>,
    pub(crate) drain_state: DrainState,
    pub(crate) outgoing: Vec<SinkItem>,
}

impl DecoderContext {
    pub(crate) fn new(
        config: DecoderConfig,
        qos: Arc<QosController>,
        flushing: Arc<AtomicBool>,
    ) -> Self {
        let tags_merge_mode = config.tags_merge_mode;
        let mut ctx = Self {
            config,
            qos,
            flushing,
            input_state: None,
            format_rejected: false,
            output_state: None,
            output_state_changed: false,
            last_pushed_caps: None,
            pool: None,
            input_segment: Segment::undefined(),
            output_segment: Segment::undefined(),
            in_out_segment_sync: true,
            decode_flags_override: None,
            frames: FrameRegistry::new(),
            stale_frames: HashSet::new(),
            current_frame: None,
            system_frame_number: 0,
            decode_frame_number: 0,
            distance_from_sync: 0,
            input_adapter: Adapter::new(),
            output_adapter: Adapter::new(),
            timestamps: TimestampTracker::new(),
            input_offset: 0,
            frame_offset: 0,
            gather: VecDeque::new(),
            parse: VecDeque::new(),
            parse_gather: VecDeque::new(),
            decode: VecDeque::new(),
            output_queued: VecDeque::new(),
            current_frame_events: Vec::new(),
            pending_events: Vec::new(),
            upstream_tags: None,
            tags: None,
            tags_merge_mode,
            tags_changed: false,
            sequencer: OutputSequencer::new(),
            discont: true,
            error_count: 0,
            had_input_data: false,
            had_output_data: false,
            bytes_out: 0,
            time: Some(ClockTime::ZERO),
            drain_state: DrainState::default(),
            outgoing: Vec::new(),
        };
        ctx.reset(true, true);
        ctx
    }

    // ============================================================
    // 状态查询
    // ============================================================

    /// 当前输入格式
    pub fn input_state(&self) -> Option<&Caps> {
        self.input_state.as_ref()
    }

    /// 当前输出格式
    pub fn output_state(&self) -> Option<&Caps> {
        self.output_state.as_ref()
    }

    /// 输入段
    pub fn input_segment(&self) -> &Segment {
        &self.input_segment
    }

    /// 输出段
    pub fn output_segment(&self) -> &Segment {
        &self.output_segment
    }

    /// 输入是否已按帧切分
    pub fn is_packetized(&self) -> bool {
        self.config.packetized
    }

    /// 设置输入是否已按帧切分
    pub fn set_packetized(&mut self, packetized: bool) {
        self.config.packetized = packetized;
    }

    /// 是否必须先收到输入格式
    pub fn needs_format(&self) -> bool {
        self.config.needs_format
    }

    /// 设置是否必须先收到输入格式
    pub fn set_needs_format(&mut self, needs_format: bool) {
        self.config.needs_format = needs_format;
    }

    /// 连续解码错误上限, -1 表示不限
    pub fn max_errors(&self) -> i32 {
        self.config.max_errors
    }

    /// 设置连续解码错误上限
    pub fn set_max_errors(&mut self, max_errors: i32) {
        self.config.max_errors = max_errors;
    }

    /// 当前累计的错误权重
    pub fn error_count(&self) -> i32 {
        self.error_count
    }

    /// 是否正在刷新
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// 下游报告的 QoS 比例
    pub fn qos_proportion(&self) -> f64 {
        self.qos.proportion()
    }

    /// 距离该帧期限还剩的解码时间 (纳秒), 未知时为 `i64::MAX`
    pub fn max_decode_time(&self, id: FrameId) -> i64 {
        let deadline = self.frames.get(id).and_then(|f| f.deadline);
        self.qos.max_decode_time(deadline)
    }

    /// 已收集到当前帧的字节数
    pub fn pending_frame_size(&self) -> usize {
        self.output_adapter.available()
    }

    /// 当前解码延迟
    pub fn latency(&self) -> (ClockTime, Option<ClockTime>) {
        (self.config.min_latency(), self.config.max_latency())
    }

    /// 设置解码延迟, 并通知应用
    pub fn set_latency(&mut self, min: ClockTime, max: Option<ClockTime>) -> VdecResult<()> {
        if max.is_some_and(|max| max < min) {
            return Err(VdecError::InvalidArgument(format!(
                "最大延迟 {} 小于最小延迟 {min}",
                ClockTime::display(max)
            )));
        }
        self.config.min_latency_ms = min.mseconds();
        self.config.max_latency_ms = max.map(ClockTime::mseconds);
        debug!("解码延迟: min={min}, max={}", ClockTime::display(max));
        self.post_message(Message::Latency { min, max });
        Ok(())
    }

    // ============================================================
    // 帧访问
    // ============================================================

    /// 按标识查找在途帧
    pub fn frame(&self, id: FrameId) -> Option<&CodecFrame> {
        self.frames.get(id)
    }

    /// 按标识查找在途帧 (可变)
    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut CodecFrame> {
        self.frames.get_mut(id)
    }

    /// 最早派发、尚未完成的帧
    pub fn oldest_frame(&self) -> Option<&CodecFrame> {
        self.frames.oldest()
    }

    /// 所有在途帧 (派发顺序)
    pub fn frames(&self) -> impl Iterator<Item = &CodecFrame> {
        self.frames.iter()
    }

    /// 在途帧数量
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    // ============================================================
    // 输出格式与分配
    // ============================================================

    /// 设置输出格式
    ///
    /// 帧率、像素宽高比与隔行属性取自 `reference` (通常为输入格式).
    /// 新格式在下一次完成帧、申请缓冲区或显式协商时才会送往下游.
    pub fn set_output_state(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
        reference: Option<&Caps>,
    ) -> VdecResult<&Caps> {
        if width == 0 || height == 0 {
            return Err(VdecError::InvalidArgument(format!(
                "输出尺寸无效: {width}x{height}"
            )));
        }
        let mut info = VideoInfo::new(format, width, height);
        if let Some(reference) = reference {
            info.fps = reference.info.fps;
            info.par = reference.info.par;
            info.interlaced = reference.info.interlaced;
        }
        debug!("设置输出格式: {info}");
        self.qos.set_frame_duration(info.frame_duration());
        self.output_state_changed = true;
        Ok(&*self.output_state.insert(Caps::raw(info)))
    }

    /// 以默认分配策略协商输出格式
    pub fn negotiate(&mut self) -> VdecResult<()> {
        self.negotiate_with(&mut default_decide_allocation)
    }

    /// 协商输出格式, 由 `decide` 确定缓冲池
    ///
    /// 先送出排在 Caps 之前的事件 (如 stream-start), 格式变化时送出 Caps 事件,
    /// 再按分配结果重建缓冲池.
    pub(crate) fn negotiate_with(
        &mut self,
        decide: &mut dyn FnMut(&mut AllocationQuery) -> VdecResult<()>,
    ) -> VdecResult<()> {
        let Some(caps) = self.output_state.clone() else {
            return Err(VdecError::NotNegotiated("尚未设置输出格式".into()));
        };

        let early = match self.frames.oldest_mut() {
            Some(frame) => take_events_before(&mut frame.events, EventKind::Caps),
            None => take_events_before(&mut self.current_frame_events, EventKind::Caps),
        };
        for event in early {
            self.push_event(event);
        }

        if self.last_pushed_caps.as_ref() != Some(&caps) {
            debug!("输出格式变为 {caps}");
            self.last_pushed_caps = Some(caps.clone());
            self.push_event(Event::Caps(caps.clone()));
        }
        self.output_state_changed = false;

        let mut query = AllocationQuery::new(Some(caps), true);
        query.pool = self.pool.as_ref().map(BufferPool::config);
        decide(&mut query)?;
        let Some(config) = query.pool else {
            return Err(VdecError::Allocation("分配协商没有得到缓冲池".into()));
        };

        if let Some(pool) = self.pool.as_mut() {
            if pool.config() == config && pool.is_active() {
                return Ok(());
            }
            pool.set_active(false);
        }
        let mut pool = BufferPool::new(config);
        pool.set_active(true);
        debug!(
            "缓冲池: size={}, min={}, max={}",
            config.size, config.min_buffers, config.max_buffers
        );
        self.pool = Some(pool);
        Ok(())
    }

    pub(crate) fn needs_negotiation(&self) -> bool {
        self.output_state_changed || (self.output_state.is_some() && self.pool.is_none())
    }

    fn negotiate_if_needed(&mut self) -> VdecResult<()> {
        if self.needs_negotiation() {
            self.negotiate()?;
        }
        Ok(())
    }

    /// 申请一个输出缓冲区
    ///
    /// 缓冲池不可用而输出格式已知时, 退回为一次普通分配.
    pub fn allocate_output_buffer(&mut self) -> VdecResult<Buffer> {
        let size = self.output_state.as_ref().map_or(0, |c| c.info.size);
        let result = self.negotiate_if_needed().and_then(|()| match self.pool.as_ref() {
            Some(pool) => pool.acquire(),
            None => Err(VdecError::Allocation("没有缓冲池".into())),
        });
        match result {
            Ok(buffer) => Ok(buffer),
            Err(e) if size > 0 => {
                warn!("缓冲池分配失败 ({e}), 改为直接分配 {size} 字节");
                Ok(Buffer::zeroed(size))
            }
            Err(e) => Err(e),
        }
    }

    /// 为帧从缓冲池申请输出图像
    pub fn allocate_output_frame(&mut self, id: FrameId) -> VdecResult<()> {
        match self.frames.get(id) {
            None => return Err(VdecError::UnknownFrame(id)),
            Some(frame) if frame.output_buffer.is_some() => {
                return Err(VdecError::InvalidState(format!("帧 #{id} 已有输出缓冲区")));
            }
            Some(_) => {}
        }
        self.negotiate_if_needed()?;
        let buffer = self
            .pool
            .as_ref()
            .ok_or_else(|| VdecError::Allocation("没有缓冲池".into()))?
            .acquire()?;
        if let Some(frame) = self.frames.get_mut(id) {
            frame.output_buffer = Some(buffer);
        }
        Ok(())
    }

    // ============================================================
    // 标签
    // ============================================================

    /// 设置解码器自身的标签, 与上游标签合并后在下一帧之前送出
    pub fn merge_tags(&mut self, tags: Option<TagList>, mode: TagMergeMode) {
        self.tags = tags;
        self.tags_merge_mode = mode;
        self.tags_changed = true;
    }

    /// 解码器自身的标签
    pub fn tags(&self) -> Option<&TagList> {
        self.tags.as_ref()
    }

    pub(crate) fn merged_tags_event(&self) -> Option<Event> {
        let tags = TagList::merge(
            self.upstream_tags.as_ref(),
            self.tags.as_ref(),
            self.tags_merge_mode,
        )?;
        Some(Event::Tag {
            tags,
            scope: TagScope::Stream,
        })
    }

    // ============================================================
    // 错误累计
    // ============================================================

    /// 报告一次解码错误
    ///
    /// 错误权重累加到计数上, 下一个输出带不连续标志. 设置了上限 (≥ 0) 且累计
    /// 超过上限时为致命错误, 返回 `Err(VdecError::Decode)`; 否则吸收错误继续解码.
    pub fn report_error(&mut self, weight: i32, text: impl Into<String>) -> VdecResult<()> {
        let text = text.into();
        self.error_count += weight;
        self.discont = true;
        let max = self.config.max_errors;
        if max >= 0 && self.error_count > max {
            error!("解码错误 ({}/{max}), 终止: {text}", self.error_count);
            self.post_message(Message::Error { text: text.clone() });
            return Err(VdecError::Decode(text));
        }
        warn!("解码错误 ({}/{max}), 继续: {text}", self.error_count);
        self.post_message(Message::Warning { text });
        Ok(())
    }

    // ============================================================
    // 内部
    // ============================================================

    pub(crate) fn post_message(&mut self, message: Message) {
        self.outgoing.push(SinkItem::Message(message));
    }

    /// 送出一个事件, 段事件同时更新输出段
    pub(crate) fn push_event(&mut self, event: Event) {
        if let Event::Segment(segment) = &event {
            if segment.is_time() {
                debug!(
                    "输出段: start={}, stop={}, rate={}",
                    segment.start,
                    ClockTime::display(segment.stop),
                    segment.rate
                );
                self.output_segment = segment.clone();
                self.in_out_segment_sync = self.input_segment == *segment;
                self.sequencer.last_timestamp_out = None;
                self.qos.set_earliest_time(None);
            }
        }
        trace!("送出事件 {}", event.name());
        self.outgoing.push(SinkItem::Event(event));
    }

    pub(crate) fn push_event_list(&mut self, events: Vec<Event>) {
        for event in events {
            self.push_event(event);
        }
    }

    /// 送出等待中的事件
    pub(crate) fn push_pending_events(&mut self) {
        let pending = std::mem::take(&mut self.pending_events);
        self.push_event_list(pending);
    }

    /// 把事件排在下一个新建帧之前
    pub(crate) fn queue_event(&mut self, event: Event) {
        trace!("事件 {} 排队等待下一帧", event.name());
        self.current_frame_events.push(event);
    }

    pub(crate) fn new_frame(&mut self) -> CodecFrame {
        let mut frame = CodecFrame::new(self.system_frame_number, self.decode_frame_number);
        self.system_frame_number = self.system_frame_number.wrapping_add(1);
        self.decode_frame_number = self.decode_frame_number.wrapping_add(1);
        frame.events = std::mem::take(&mut self.current_frame_events);
        trace!("新建帧 #{}", frame.system_frame_number);
        frame
    }

    /// 当前是否只解码关键帧
    pub(crate) fn key_units_only(&self) -> bool {
        match self.decode_flags_override {
            Some(flags) => flags.contains(SegmentFlags::TRICKMODE_KEY_UNITS),
            None => self.input_segment.is_key_units(),
        }
    }

    pub(crate) fn take_outgoing(&mut self) -> Vec<SinkItem> {
        std::mem::take(&mut self.outgoing)
    }

    fn clear_queues(&mut self) {
        self.gather.clear();
        self.parse.clear();
        self.parse_gather.clear();
        self.decode.clear();
        self.output_queued.clear();
        self.stale_frames.clear();
        for frame in self.frames.drain() {
            self.stale_frames.insert(frame.id());
        }
    }

    /// 重置流状态
    ///
    /// - 软重置 (`full`, `hard` 皆假): 清空字节累积器与时间戳记录
    /// - 硬重置: 另外清空段、在途帧、队列、事件与错误计数
    /// - 完全重置: 另外丢弃输入/输出格式、标签、计数与缓冲池
    pub(crate) fn reset(&mut self, full: bool, hard: bool) {
        debug!("重置流状态: full={full}, hard={hard}");
        if full || hard {
            self.input_segment = Segment::undefined();
            self.output_segment = Segment::undefined();
            self.clear_queues();
            self.in_out_segment_sync = true;
            self.current_frame = None;
            self.current_frame_events.clear();
            self.pending_events.clear();
            self.error_count = 0;
            self.had_output_data = false;
            self.had_input_data = false;
            self.qos.reset(false);
            self.decode_flags_override = None;
        }

        if full {
            self.input_state = None;
            self.format_rejected = false;
            self.output_state = None;
            self.output_state_changed = false;
            self.last_pushed_caps = None;
            self.qos.reset(true);
            self.tags = None;
            self.tags_merge_mode = self.config.tags_merge_mode;
            self.upstream_tags = None;
            self.tags_changed = false;
            self.sequencer.reset(true);
            self.decode_frame_number = 0;
            self.distance_from_sync = 0;
            if let Some(pool) = self.pool.as_mut() {
                pool.set_active(false);
            }
            self.pool = None;
            self.stale_frames.clear();
        }

        self.discont = true;
        self.sequencer.reset(false);
        self.input_offset = 0;
        self.frame_offset = 0;
        self.input_adapter.clear();
        self.output_adapter.clear();
        self.timestamps.clear();
        self.bytes_out = 0;
        self.time = Some(ClockTime::ZERO);
    }
}

/// 取出排在 `kind` 之前的事件, 其余事件保持原顺序
fn take_events_before(events: &mut Vec<Event>, kind: EventKind) -> Vec<Event> {
    let (early, rest): (Vec<Event>, Vec<Event>) =
        std::mem::take(events).into_iter().partition(|e| e.kind() < kind);
    *events = rest;
    early
}
