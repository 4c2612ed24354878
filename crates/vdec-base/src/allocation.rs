//! 输出缓冲区分配协商.
//!
//! 协商输出格式后, 基类构造一个 `AllocationQuery` 交给编解码器的
//! `decide_allocation`, 由其确认 (或修改) 缓冲池配置.

use log::debug;
use vdec_core::{BufferPoolConfig, VdecResult};

use crate::caps::Caps;

/// 分配查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationQuery {
    /// 输出格式
    pub caps: Option<Caps>,
    /// 是否需要缓冲池
    pub need_pool: bool,
    /// 选定的缓冲池配置; 处理完毕后为 None 表示没有可用缓冲池
    pub pool: Option<BufferPoolConfig>,
}

impl AllocationQuery {
    /// 以输出格式创建查询
    pub fn new(caps: Option<Caps>, need_pool: bool) -> Self {
        Self {
            caps,
            need_pool,
            pool: None,
        }
    }

    /// 输出格式下单帧字节数
    pub fn frame_size(&self) -> usize {
        self.caps.as_ref().map_or(0, |c| c.info.size)
    }
}

/// 默认分配策略
///
/// 缓冲区大小取查询建议值与单帧字节数中的较大者, 没有建议时新建一个不限数量的缓冲池.
pub fn default_decide_allocation(query: &mut AllocationQuery) -> VdecResult<()> {
    let frame_size = query.frame_size();
    let config = match query.pool {
        Some(mut config) => {
            config.size = config.size.max(frame_size);
            config
        }
        None => BufferPoolConfig {
            size: frame_size,
            min_buffers: 0,
            max_buffers: 0,
        },
    };
    debug!(
        "默认分配策略: size={}, min={}, max={}",
        config.size, config.min_buffers, config.max_buffers
    );
    query.pool = Some(config);
    Ok(())
}
