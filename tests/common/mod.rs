//! 集成测试共用的脚本解码器与辅助函数.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use vdec::base::{
    AllocationQuery, Caps, CodecFrame, CollectSink, DecoderConfig, DecoderContext, Event, FrameId,
    ParseOutcome, VideoCodec, VideoDecoder, default_decide_allocation,
};
use vdec::core::{
    Buffer, BufferFlags, ClockTime, PixelFormat, Rational, Segment, VdecError, VdecResult,
    VideoInfo,
};

/// 测试图像宽度
pub const WIDTH: u32 = 2;
/// 测试图像高度
pub const HEIGHT: u32 = 2;
/// GRAY8 2x2 单帧字节数
pub const FRAME_SIZE: usize = 4;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn ms(v: u64) -> ClockTime {
    ClockTime::from_mseconds(v)
}

/// 25 fps 的 GRAY8 2x2 输入格式
pub fn gray_caps() -> Caps {
    Caps::raw(VideoInfo::new(PixelFormat::Gray8, WIDTH, HEIGHT).with_fps(Rational::new(25, 1)))
}

/// 一帧压缩数据, 内容为帧序号
pub fn frame_buffer(index: u8, pts: Option<ClockTime>, key: bool) -> Buffer {
    let mut flags = BufferFlags::empty();
    if !key {
        flags |= BufferFlags::DELTA_UNIT;
    }
    Buffer::from_data(vec![index; FRAME_SIZE])
        .with_pts(pts)
        .with_dts(pts)
        .with_duration(ms(40))
        .with_flags(flags)
}

/// 设置格式与段后的解码器
pub fn start_decoder(
    codec: ScriptedCodec,
    config: DecoderConfig,
    segment: Segment,
) -> (VideoDecoder, Arc<CollectSink>) {
    init_logger();
    let sink = Arc::new(CollectSink::new());
    let decoder = VideoDecoder::new(Box::new(codec), sink.clone(), config).unwrap();
    decoder.start().unwrap();
    decoder.send_event(Event::Caps(gray_caps())).unwrap();
    decoder.send_event(Event::Segment(segment)).unwrap();
    (decoder, sink)
}

/// 输出缓冲区的首字节 (即输入帧序号)
pub fn output_indices(sink: &CollectSink) -> Vec<u8> {
    sink.buffers().iter().map(|b| b.data[0]).collect()
}

/// 输出缓冲区的 PTS
pub fn output_pts(sink: &CollectSink) -> Vec<Option<ClockTime>> {
    sink.buffers().iter().map(|b| b.pts).collect()
}

/// 事件名称序列
pub fn event_names(sink: &CollectSink) -> Vec<String> {
    sink.events().iter().map(|e| e.name().to_string()).collect()
}

/// 脚本解码器
///
/// 图像内容直接复制输入. 可设定缓存帧数 (模拟 B 帧延迟)、按输入首字节
/// 指定解码失败或丢弃的帧, 并记录每次回调.
#[derive(Debug, Default)]
pub struct ScriptedCodec {
    /// 最多缓存多少帧后才开始输出
    pub delay: usize,
    /// 首字节在此集合中的帧返回 `Err(VdecError::Decode)`
    pub fail: HashSet<u8>,
    /// 首字节在此集合中的帧被 `drop_frame`
    pub drop: HashSet<u8>,
    /// 拒绝输入格式
    pub reject_format: bool,
    /// 是否实现 drain (否则基类退回 finish)
    pub has_drain: bool,
    /// 非打包模式下每帧的字节数
    pub parse_size: usize,
    /// 解析器从不消费数据
    pub stall: bool,
    /// 不足一帧的数据先并入当前帧 (`Consumed`), 凑满后再完成
    pub gather: bool,
    /// 已并入当前帧的字节数
    pub gathered: usize,
    /// 缓冲池最多同时存活的缓冲区数量
    pub max_buffers: Option<usize>,
    /// 分配协商时不提供缓冲池
    pub no_pool: bool,
    /// 回调记录
    pub log: Arc<Mutex<Vec<String>>>,
    /// 已接收但尚未输出的帧
    pub held: VecDeque<FrameId>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self {
            parse_size: FRAME_SIZE,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, indices: &[u8]) -> Self {
        self.fail.extend(indices);
        self
    }

    pub fn dropping(mut self, indices: &[u8]) -> Self {
        self.drop.extend(indices);
        self
    }

    pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn output(&mut self, ctx: &mut DecoderContext, id: FrameId) -> VdecResult<()> {
        let input = ctx
            .frame(id)
            .and_then(|f| f.input_buffer.clone())
            .ok_or(VdecError::UnknownFrame(id))?;
        let first = input.data.first().copied().unwrap_or(0);
        if self.drop.contains(&first) {
            return ctx.drop_frame(id);
        }
        ctx.allocate_output_frame(id)?;
        if let Some(buffer) = ctx.frame_mut(id).and_then(|f| f.output_buffer.as_mut()) {
            buffer.map_writable(|data| {
                let n = data.len().min(input.size());
                data[..n].copy_from_slice(&input.data[..n]);
            });
        }
        ctx.finish_frame(id)
    }

    fn parse_gathering(&mut self, input: &[u8], at_eos: bool) -> ParseOutcome {
        let need = self.parse_size - self.gathered;
        if input.len() >= need {
            self.gathered = 0;
            ParseOutcome::Complete(need)
        } else if at_eos && (self.gathered > 0 || !input.is_empty()) {
            self.gathered = 0;
            ParseOutcome::Complete(input.len())
        } else if input.is_empty() {
            ParseOutcome::NeedData
        } else {
            self.gathered += input.len();
            ParseOutcome::Consumed(input.len())
        }
    }

    fn output_all(&mut self, ctx: &mut DecoderContext) -> VdecResult<()> {
        while let Some(id) = self.held.pop_front() {
            self.output(ctx, id)?;
        }
        Ok(())
    }
}

impl VideoCodec for ScriptedCodec {
    fn name(&self) -> &str {
        "scripted"
    }

    fn set_format(&mut self, ctx: &mut DecoderContext, caps: &Caps) -> VdecResult<bool> {
        self.record("set_format");
        if self.reject_format {
            return Ok(false);
        }
        ctx.set_output_state(PixelFormat::Gray8, caps.info.width, caps.info.height, Some(caps))?;
        Ok(true)
    }

    fn parse(
        &mut self,
        _frame: &mut CodecFrame,
        input: &[u8],
        at_eos: bool,
    ) -> VdecResult<ParseOutcome> {
        self.record(format!("parse:{}:{at_eos}", input.len()));
        if self.stall {
            return Ok(ParseOutcome::Consumed(0));
        }
        if self.gather {
            return Ok(self.parse_gathering(input, at_eos));
        }
        if input.len() >= self.parse_size {
            Ok(ParseOutcome::Complete(self.parse_size))
        } else if at_eos && !input.is_empty() {
            Ok(ParseOutcome::Complete(input.len()))
        } else {
            Ok(ParseOutcome::NeedData)
        }
    }

    fn handle_frame(&mut self, ctx: &mut DecoderContext, frame: FrameId) -> VdecResult<()> {
        let first = ctx
            .frame(frame)
            .and_then(|f| f.input_buffer.as_ref())
            .and_then(|b| b.data.first().copied())
            .unwrap_or(0);
        self.record(format!("handle:{first}"));
        if self.fail.contains(&first) {
            return Err(VdecError::Decode(format!("帧 {first} 损坏")));
        }
        self.held.push_back(frame);
        while self.held.len() > self.delay {
            if let Some(id) = self.held.pop_front() {
                self.output(ctx, id)?;
            }
        }
        Ok(())
    }

    fn drain(&mut self, ctx: &mut DecoderContext) -> Option<VdecResult<()>> {
        if !self.has_drain {
            return None;
        }
        self.record("drain");
        Some(self.output_all(ctx))
    }

    fn finish(&mut self, ctx: &mut DecoderContext) -> VdecResult<()> {
        self.record("finish");
        self.output_all(ctx)
    }

    fn flush(&mut self) {
        self.record("flush");
        self.held.clear();
        self.gathered = 0;
    }

    fn decide_allocation(&mut self, query: &mut AllocationQuery) -> VdecResult<()> {
        if self.no_pool {
            query.pool = None;
            return Ok(());
        }
        default_decide_allocation(query)?;
        if let (Some(max), Some(pool)) = (self.max_buffers, query.pool.as_mut()) {
            pool.max_buffers = max;
        }
        Ok(())
    }
}
