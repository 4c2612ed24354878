//! 统一错误类型定义.
//!
//! 所有 vdec crate 共用的错误类型. 解码管线的流状态 (EOS, 刷新中, 未协商等)
//! 同样以错误变体表达, `Ok(())` 即表示正常流转.

use thiserror::Error;

/// vdec 框架统一错误类型
#[derive(Debug, Error)]
pub enum VdecError {
    /// 格式协商失败 (输入格式被拒绝, 输出格式无法协商)
    #[error("格式错误: {0}")]
    Format(String),

    /// 解析器连续两次未消费数据也未产生帧
    #[error("解析器停滞: 连续 {calls} 次调用未消费数据")]
    ParserStall {
        /// 未取得进展的调用次数
        calls: u32,
    },

    /// 输出缓冲区分配失败 (缓冲池耗尽或未激活)
    #[error("缓冲区分配失败: {0}")]
    Allocation(String),

    /// 编解码器报告的解码错误
    #[error("解码错误: {0}")]
    Decode(String),

    /// 流已结束, 有输入但没有产生任何输出
    #[error("流结束前没有解码出任何有效帧")]
    SegmentUnderrun,

    /// 尚未协商格式, 拒绝数据
    #[error("格式未协商: {0}")]
    NotNegotiated(String),

    /// 正在刷新, 数据被丢弃
    #[error("正在刷新, 数据已丢弃")]
    Flushing,

    /// 已到达流末尾 (下游不再需要数据)
    #[error("已到达流末尾")]
    Eos,

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 引用了不存在 (或已完成) 的帧
    #[error("未知帧: #{0}")]
    UnknownFrame(u32),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 当前状态下不允许的操作
    #[error("状态错误: {0}")]
    InvalidState(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl VdecError {
    /// 是否为流级致命错误
    ///
    /// `Eos`, `Flushing`, `NeedMoreData` 以及分配失败属于可恢复的流状态,
    /// 其余错误会终止当前流.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Eos | Self::Flushing | Self::NeedMoreData | Self::Allocation(_)
        )
    }
}

/// vdec 框架统一 Result 类型
pub type VdecResult<T> = Result<T, VdecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_流状态不是致命错误() {
        assert!(!VdecError::Eos.is_fatal());
        assert!(!VdecError::Flushing.is_fatal());
        assert!(!VdecError::Allocation("池耗尽".into()).is_fatal());
        assert!(VdecError::ParserStall { calls: 2 }.is_fatal());
        assert!(VdecError::SegmentUnderrun.is_fatal());
    }

    #[test]
    fn test_错误消息() {
        let err = VdecError::UnknownFrame(7);
        assert_eq!(err.to_string(), "未知帧: #7");
    }
}
