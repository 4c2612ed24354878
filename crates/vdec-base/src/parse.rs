//! 非打包输入的解析驱动 (ParseDriver).
//!
//! 输入字节先进入 `input_adapter`, 编解码器的 `parse` 每次报告头部多少字节属于
//! 当前帧; 这些字节移入 `output_adapter`. 帧完整时整体取出作为帧的输入,
//! 并从 `TimestampTracker` 取回帧起始偏移对应的时间戳.

use log::{error, trace};
use vdec_core::{Buffer, BufferFlags, ClockTime, VdecError, VdecResult};

use crate::codec::{ParseOutcome, VideoCodec};
use crate::context::DecoderContext;
use crate::forward;

/// 连续多少次调用没有进展视为解析器故障
const MAX_INACTIVE_CALLS: u32 = 2;

/// 解析尽可能多的完整帧
///
/// # 参数
/// - `at_eos`: 不会再有更多输入, 解析器应交出末尾的残余数据
/// - `new_buffer`: 刚收到新数据, 即使累积器为空也要调用一次解析器
pub(crate) fn parse_available(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    at_eos: bool,
    mut new_buffer: bool,
) -> VdecResult<()> {
    let mut available = ctx.input_adapter.available();
    let mut inactive = 0;

    while available > 0 || new_buffer {
        new_buffer = false;
        if ctx.current_frame.is_none() {
            ctx.current_frame = Some(ctx.new_frame());
        }

        let was_available = available;
        let outcome = {
            let Some(frame) = ctx.current_frame.as_mut() else {
                return Err(VdecError::Internal("没有正在解析的帧".into()));
            };
            codec.parse(frame, ctx.input_adapter.as_slice(), at_eos)?
        };
        trace!("解析结果 {outcome:?}, 可用 {was_available} 字节");

        match outcome {
            ParseOutcome::NeedData => break,
            ParseOutcome::Consumed(n) => add_to_frame(ctx, n),
            ParseOutcome::Complete(n) => {
                add_to_frame(ctx, n);
                have_frame(codec, ctx)?;
            }
        }

        available = ctx.input_adapter.available();
        if ctx.current_frame.is_none() || available != was_available {
            inactive = 0;
        } else {
            inactive += 1;
            if inactive == MAX_INACTIVE_CALLS {
                error!("解析器连续 {inactive} 次没有消费数据");
                return Err(VdecError::ParserStall { calls: inactive });
            }
        }
    }
    Ok(())
}

/// 把输入头部 `n` 字节归入当前帧
pub(crate) fn add_to_frame(ctx: &mut DecoderContext, n: usize) {
    if n == 0 {
        return;
    }
    trace!("向当前帧追加 {n} 字节");
    if ctx.output_adapter.available() == 0 {
        ctx.frame_offset = ctx.input_offset - ctx.input_adapter.available() as u64;
    }
    let data = ctx.input_adapter.take(n);
    ctx.output_adapter.push(&data);
}

/// 当前帧已完整: 附上输入数据与时间戳, 交给解码 (反向播放时先收集)
pub(crate) fn have_frame(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext) -> VdecResult<()> {
    let Some(mut frame) = ctx.current_frame.take() else {
        return Err(VdecError::Internal("没有正在解析的帧".into()));
    };

    let data = ctx.output_adapter.take_all();
    let info = ctx.timestamps.take_at_offset(ctx.frame_offset);
    let mut buffer = Buffer::from_data(data)
        .with_pts(info.pts)
        .with_dts(info.dts)
        .with_duration(info.duration)
        .with_flags(info.flags);
    buffer.offset = Some(ctx.frame_offset);
    trace!(
        "收集到完整帧: offset={}, {} 字节, PTS {}",
        ctx.frame_offset,
        buffer.size(),
        ClockTime::display(buffer.pts)
    );

    if !buffer.flags.contains(BufferFlags::DELTA_UNIT) {
        frame.set_sync_point();
    }
    frame.input_buffer = Some(buffer);

    if ctx.input_segment.rate < 0.0 {
        ctx.parse_gather.push_back(frame);
        Ok(())
    } else {
        forward::decode_frame(codec, ctx, frame)
    }
}
