//! 排空与刷新.
//!
//! 排空 (drain) 让编解码器交出缓存的帧, 流可以继续; 刷新 (flush) 丢弃在途状态.
//! 软刷新只清理字节累积器与时间戳记录, 硬刷新另外清空段、在途帧与事件队列.
//! 两者都保留已协商的输入/输出格式.

use log::{debug, trace};
use vdec_core::VdecResult;

use crate::codec::VideoCodec;
use crate::context::DecoderContext;
use crate::parse;
use crate::reverse;

/// 排空/刷新状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// 正常解码
    Running,
    /// 正在排空
    Draining,
    /// 已刷新, 之后没有新输入
    Flushed {
        /// 是否为硬刷新
        hard: bool,
    },
}

impl Default for DrainState {
    fn default() -> Self {
        Self::Flushed { hard: true }
    }
}

/// 排空编解码器
///
/// 正向播放时非打包输入先以 EOS 标志再解析一次; `at_eos` 为真时调用编解码器的
/// `finish`, 否则调用 `drain` (未实现时退回 `finish`). 反向播放时把收集到的
/// 全部数据按 GOP 解码并倒序送出.
///
/// `at_eos` 的排空成功后状态为 `Flushed { hard: false }`, 其余情况恢复排空前的状态.
pub(crate) fn drain_out(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    at_eos: bool,
) -> VdecResult<()> {
    let previous = ctx.drain_state;
    ctx.drain_state = DrainState::Draining;
    debug!("排空解码器: at_eos={at_eos}");

    let result = if ctx.input_segment.rate > 0.0 {
        drain_forward(codec, ctx, at_eos)
    } else {
        reverse::flush_parse(codec, ctx, true)
    };

    ctx.drain_state = match (&result, at_eos) {
        (Ok(()), true) => DrainState::Flushed { hard: false },
        _ => previous,
    };
    result
}

fn drain_forward(
    codec: &mut dyn VideoCodec,
    ctx: &mut DecoderContext,
    at_eos: bool,
) -> VdecResult<()> {
    if !ctx.config.packetized {
        // 已并入当前帧但尚未完成的数据也要交给解析器最后一次
        let pending = ctx.output_adapter.available() > 0;
        parse::parse_available(codec, ctx, true, pending)?;
    }
    if at_eos {
        codec.finish(ctx)
    } else {
        codec_drain(codec, ctx)
    }
}

/// 调用编解码器的 `drain`, 未实现时退回 `finish`
pub(crate) fn codec_drain(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext) -> VdecResult<()> {
    match codec.drain(ctx) {
        Some(result) => result,
        None => {
            trace!("编解码器 {} 未实现 drain, 改用 finish", codec.name());
            codec.finish(ctx)
        }
    }
}

/// 刷新解码器
///
/// 自上次刷新以来没有新输入, 且上次刷新不弱于本次时不做任何事.
pub(crate) fn flush(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext, hard: bool) {
    if let DrainState::Flushed { hard: was_hard } = ctx.drain_state {
        if was_hard || !hard {
            trace!("已刷新, 忽略重复刷新 (hard={hard})");
            return;
        }
    }
    flush_now(codec, ctx, hard);
    ctx.drain_state = DrainState::Flushed { hard };
}

/// 无条件刷新
pub(crate) fn flush_now(codec: &mut dyn VideoCodec, ctx: &mut DecoderContext, hard: bool) {
    debug!("刷新解码器: hard={hard}");
    codec.flush();
    ctx.reset(false, hard);
}
