//! 编解码器 trait 定义.
//!
//! 具体解码器 (rawvideo 以及测试里的脚本解码器) 实现 `VideoCodec`, 由基类
//! `VideoDecoder` 驱动. 基类负责帧登记、时间戳、QoS、正反向调度与事件排序,
//! 编解码器只需要把压缩数据变成图像.

use vdec_core::{VdecError, VdecResult};

use crate::allocation::{AllocationQuery, default_decide_allocation};
use crate::caps::Caps;
use crate::context::DecoderContext;
use crate::frame::{CodecFrame, FrameId};

/// 一次解析调用的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// 输入头部 `n` 字节属于当前帧, 帧尚未完整
    Consumed(usize),
    /// 输入头部 `n` 字节属于当前帧, 且当前帧已完整
    Complete(usize),
    /// 现有数据不足以继续解析
    NeedData,
}

/// 视频编解码器 trait
///
/// 调用流程:
/// 1. `open()` / `start()`
/// 2. `set_format()` 接收输入格式, 通常在其中调用 `ctx.set_output_state()`
/// 3. 每一帧调用 `handle_frame()`, 编解码器最终对每一帧调用一次
///    `ctx.finish_frame()` 或 `ctx.drop_frame()`
/// 4. 段结束时 `drain()` / `finish()` 交出缓存帧
/// 5. `stop()` / `close()`
///
/// 所有回调都在流锁内执行, 回调收到的 `DecoderContext` 即为加锁后的流状态.
pub trait VideoCodec: Send {
    /// 编解码器名称
    fn name(&self) -> &str;

    /// 打开编解码器 (分配长期资源)
    fn open(&mut self) -> VdecResult<()> {
        Ok(())
    }

    /// 关闭编解码器
    fn close(&mut self) -> VdecResult<()> {
        Ok(())
    }

    /// 开始处理数据
    fn start(&mut self) -> VdecResult<()> {
        Ok(())
    }

    /// 停止处理数据
    fn stop(&mut self) -> VdecResult<()> {
        Ok(())
    }

    /// 接收新的输入格式
    ///
    /// 返回 `Ok(false)` 表示拒绝该格式, 之后的数据会以 `NotNegotiated` 被拒绝.
    fn set_format(&mut self, _ctx: &mut DecoderContext, _caps: &Caps) -> VdecResult<bool> {
        Ok(true)
    }

    /// 在累积的输入中寻找帧边界 (仅非打包模式)
    ///
    /// # 参数
    /// - `frame`: 正在收集的帧
    /// - `input`: 尚未归入任何帧的输入数据
    /// - `at_eos`: 不会再有更多输入
    fn parse(
        &mut self,
        _frame: &mut CodecFrame,
        _input: &[u8],
        _at_eos: bool,
    ) -> VdecResult<ParseOutcome> {
        Err(VdecError::Unsupported(format!(
            "编解码器 {} 不支持解析非打包输入",
            self.name()
        )))
    }

    /// 解码一帧
    ///
    /// 帧已登记, 可通过 `ctx.frame_mut(frame)` 访问. 返回 `Err(VdecError::Decode)`
    /// 时由基类计入错误次数, 未完成的帧按丢弃处理.
    fn handle_frame(&mut self, ctx: &mut DecoderContext, frame: FrameId) -> VdecResult<()>;

    /// 输出所有缓存帧, 之后仍可继续解码
    ///
    /// 返回 None 表示未实现, 基类改为调用 `finish()`.
    fn drain(&mut self, _ctx: &mut DecoderContext) -> Option<VdecResult<()>> {
        None
    }

    /// 流结束时输出所有缓存帧
    fn finish(&mut self, _ctx: &mut DecoderContext) -> VdecResult<()> {
        Ok(())
    }

    /// 丢弃内部状态 (seek 或刷新后)
    fn flush(&mut self) {}

    /// 确定输出缓冲池配置
    fn decide_allocation(&mut self, query: &mut AllocationQuery) -> VdecResult<()> {
        default_decide_allocation(query)
    }
}
