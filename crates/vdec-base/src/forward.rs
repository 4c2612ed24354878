//! 正向解码管线 (ForwardPipeline).
//!
//! 打包输入时每个缓冲区就是一帧, 直接派发; 非打包输入先累积, 再由解析驱动切分.
//! 反向播放收集阶段同样经过这里, 只是切出的帧进入 `parse_gather` 而不是派发.

use log::{debug, trace};
use vdec_core::{Buffer, ClockTime, VdecError, VdecResult};

use crate::codec::VideoCodec;
use crate::context::DecoderContext;
use crate::drain;
use crate::frame::CodecFrame;
use crate::parse;

/// 在途帧超过此数量时记录调试日志
const FRAME_LIST_WARN_LEN: usize = 10;

/// 正向处理一个输入缓冲区
pub(crate) fn chain_forward(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    buffer: Buffer,
    at_eos: bool,
) -> VdecResult<()> {
    let key_units = ctx.key_units_only();
    let forward = ctx.input_segment.rate > 0.0;

    // 反向播放在 chain_reverse 中处理不连续点
    if forward && buffer.is_discont() && key_units {
        drain::drain_out(codec, ctx, false)?;
    }

    if !ctx.config.packetized {
        ctx.timestamps.record(ctx.input_offset, &buffer);
    }
    ctx.input_offset += buffer.size() as u64;

    let result = if ctx.config.packetized {
        let mut frame = match ctx.current_frame.take() {
            Some(frame) => frame,
            None => ctx.new_frame(),
        };
        let was_keyframe = !buffer.is_delta_unit();
        if was_keyframe {
            trace!("帧 #{} 为同步点", frame.system_frame_number);
            frame.set_sync_point();
        }
        frame.input_buffer = Some(buffer);

        if ctx.input_segment.rate < 0.0 {
            ctx.parse_gather.push_back(frame);
            Ok(())
        } else {
            decode_frame(codec, ctx, frame).and_then(|()| {
                // 关键帧模式下立即排空, 减少延迟
                if was_keyframe && forward && key_units {
                    drain::drain_out(codec, ctx, false)
                } else {
                    Ok(())
                }
            })
        }
    } else {
        ctx.input_adapter.push(&buffer.data);
        parse::parse_available(codec, ctx, at_eos, true)
    };

    match result {
        Err(VdecError::NeedMoreData) => Ok(()),
        other => other,
    }
}

/// 登记一帧并交给编解码器
///
/// 编解码器返回 `Err(VdecError::Decode)` 时计入错误次数; 错误被吸收时,
/// 尚未完成的帧按丢弃处理.
pub(crate) fn decode_frame(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    mut frame: CodecFrame,
) -> VdecResult<()> {
    if frame.is_sync_point() {
        ctx.distance_from_sync = 0;
    }
    frame.distance_from_sync = ctx.distance_from_sync;
    ctx.distance_from_sync = ctx.distance_from_sync.saturating_add(1);

    if let Some(input) = frame.input_buffer.as_ref() {
        frame.pts = input.pts;
        frame.dts = input.dts;
        frame.duration = input.duration;
    }
    ctx.sequencer.record_pts_delta(&frame);
    frame.dts_hint = frame.dts;
    frame.pts_hint = frame.pts;
    frame.deadline = frame
        .pts
        .and_then(|pts| ctx.input_segment.to_running_time(pts));

    let id = frame.id();
    trace!(
        "派发帧 #{id}: PTS {}, DTS {}, 距同步点 {}",
        ClockTime::display(frame.pts),
        ClockTime::display(frame.dts),
        frame.distance_from_sync
    );
    ctx.frames.insert(frame);
    if ctx.frames.len() > FRAME_LIST_WARN_LEN {
        debug!("在途帧过多: {} 帧, 编解码器可能遗漏了完成帧", ctx.frames.len());
    }

    if ctx.needs_negotiation() {
        ctx.negotiate_with(&mut |query| codec.decide_allocation(query))?;
    }

    match codec.handle_frame(ctx, id) {
        Ok(()) => Ok(()),
        Err(VdecError::Decode(text)) => {
            ctx.report_error(1, text)?;
            if ctx.frames.position(id).is_some() {
                ctx.drop_frame(id)?;
            }
            Ok(())
        }
        Err(e) => {
            debug!("帧 #{id} 处理失败: {e}");
            Err(e)
        }
    }
}
