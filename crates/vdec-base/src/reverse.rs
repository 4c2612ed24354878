//! 反向解码管线 (ReversePipeline).
//!
//! 反向播放时上游按 GOP 倒序送入数据, 每块以不连续标志开头, 块内仍是正向顺序.
//! 收到不连续点时, 把已收集的数据解析成帧, 从最新的帧往回找关键帧; 每找到一个
//! 关键帧就把它之后的帧正向解码, 排空编解码器, 再把解码结果倒序送出.

use log::{debug, trace};
use vdec_core::{Buffer, BufferFlags, ClockTime, VdecResult};

use crate::codec::VideoCodec;
use crate::context::DecoderContext;
use crate::drain;
use crate::event::{Event, EventKind};
use crate::forward;

/// 反向处理一个输入缓冲区, `None` 表示流结束
pub(crate) fn chain_reverse(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    buffer: Option<Buffer>,
) -> VdecResult<()> {
    let mut result = Ok(());
    if buffer.as_ref().is_none_or(Buffer::is_discont) {
        debug!("反向播放: 收到不连续点");
        result = flush_parse(codec, ctx, false);
    }

    if let Some(buffer) = buffer {
        trace!(
            "收集缓冲区: {} 字节, PTS {}",
            buffer.size(),
            ClockTime::display(buffer.pts)
        );
        ctx.gather.push_back(buffer);
    }
    result
}

/// 解析并解码已收集的全部数据, 倒序送出
pub(crate) fn flush_parse(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    at_eos: bool,
) -> VdecResult<()> {
    debug!("反向播放: 解析已收集的 {} 个缓冲区", ctx.gather.len());

    // 新收集的数据排在尚未解析出帧的数据前面
    let mut parse = std::mem::take(&mut ctx.gather);
    parse.append(&mut ctx.parse);
    ctx.parse = parse;

    drain::flush_now(codec, ctx, false);

    let queued = std::mem::take(&mut ctx.parse);
    for buffer in queued {
        // 仍需保留的缓冲区先放回, 产生了帧再移除
        ctx.parse.push_back(buffer.clone());
        let result = forward::chain_forward(codec, ctx, buffer, at_eos);
        if !ctx.parse_gather.is_empty() {
            ctx.parse.pop_back();
        } else {
            trace!("缓冲区没有产生帧, 保留");
        }
        result?;
    }

    // 段事件必须在解码前生效, 以决定输出进入反向队列
    for index in 0..ctx.parse_gather.len() {
        let early: Vec<Event> = match ctx.parse_gather.get_mut(index) {
            Some(frame) => {
                let (early, rest): (Vec<Event>, Vec<Event>) = std::mem::take(&mut frame.events)
                    .into_iter()
                    .partition(|e| e.kind() <= EventKind::Segment);
                frame.events = rest;
                early
            }
            None => Vec::new(),
        };
        for event in &early {
            if let Event::Segment(segment) = event {
                if segment.is_time() {
                    debug!("反向播放: 帧上附带新段, rate={}", segment.rate);
                    ctx.output_segment = segment.clone();
                    ctx.in_out_segment_sync = ctx.input_segment == *segment;
                }
            }
        }
        ctx.pending_events.extend(early);
    }

    // 从最新的帧往回移入解码队列, 遇到关键帧就解码这一段
    while let Some(frame) = ctx.parse_gather.pop_back() {
        let is_sync = frame.is_sync_point();
        ctx.decode.push_front(frame);
        if !is_sync {
            continue;
        }
        debug!("反向播放: 关键帧, 解码 {} 帧", ctx.decode.len());
        flush_decode(codec, ctx)?;
        drain::codec_drain(codec, ctx)?;
        push_output_queued(ctx)?;
        drain::flush_now(codec, ctx, false);
    }

    if at_eos {
        discard_undecodable(ctx);
    }
    Ok(())
}

/// 按解码顺序派发 `decode` 队列中的帧
fn flush_decode(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext) -> VdecResult<()> {
    while let Some(frame) = ctx.decode.pop_front() {
        trace!(
            "反向播放: 解码帧 #{}, PTS {}",
            frame.system_frame_number,
            ClockTime::display(frame.input_buffer.as_ref().and_then(|b| b.pts))
        );
        forward::decode_frame(codec, ctx, frame)?;
    }
    Ok(())
}

/// 倒序送出输出队列, 缺失的时间戳由后一帧往前推
fn push_output_queued(ctx: &mut DecoderContext) -> VdecResult<()> {
    let fallback_duration = ctx.output_state.as_ref().and_then(|c| c.info.frame_duration());
    let mut known_duration = None;
    let mut result = Ok(());

    while let Some(mut buffer) = ctx.output_queued.pop_front() {
        if result.is_err() {
            continue;
        }
        buffer.flags.remove(BufferFlags::DISCONT);

        if buffer.duration.is_some() {
            known_duration = buffer.duration;
        }
        match buffer.pts {
            Some(pts) => ctx.sequencer.last_timestamp_out = Some(pts),
            None => {
                let duration = buffer.duration.or(known_duration).or(fallback_duration);
                if let (Some(last), Some(duration)) = (ctx.sequencer.last_timestamp_out, duration) {
                    buffer.pts = Some(last.saturating_sub(duration));
                    ctx.sequencer.last_timestamp_out = buffer.pts;
                    trace!("反向推算时间戳 {}", ClockTime::display(buffer.pts));
                }
            }
        }
        result = ctx.clip_and_push(buffer);
    }
    result
}

/// 流结束时丢弃永远等不到关键帧的帧, 其事件留给后续输出
fn discard_undecodable(ctx: &mut DecoderContext) {
    let leftover = ctx.decode.len() + ctx.parse_gather.len();
    if leftover > 0 {
        debug!("反向播放: 流结束, 丢弃 {leftover} 个没有关键帧的帧");
    }
    let frames: Vec<_> = ctx.decode.drain(..).chain(ctx.parse_gather.drain(..)).collect();
    for mut frame in frames {
        ctx.pending_events.append(&mut frame.events);
    }
    ctx.parse.clear();
}
