//! 输出缓冲池.
//!
//! 对标 FFmpeg 的 `AVBufferPool`: 按固定大小分配缓冲区, 并限制同时存活的数量.
//! 缓冲区的所有克隆都释放后, 占用的槽位自动归还.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::trace;

use crate::buffer::Buffer;
use crate::error::{VdecError, VdecResult};

/// 缓冲池配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferPoolConfig {
    /// 每个缓冲区的字节数
    pub size: usize,
    /// 最少预留的缓冲区数量
    pub min_buffers: usize,
    /// 最多同时存活的缓冲区数量, 0 表示不限
    pub max_buffers: usize,
}

/// 池槽位, 释放时归还计数
#[derive(Debug)]
pub(crate) struct PoolSlot {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 缓冲池
#[derive(Debug)]
pub struct BufferPool {
    config: BufferPoolConfig,
    active: bool,
    outstanding: Arc<AtomicUsize>,
}

impl BufferPool {
    /// 按配置创建 (未激活) 缓冲池
    pub fn new(config: BufferPoolConfig) -> Self {
        Self {
            config,
            active: false,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 当前配置
    pub fn config(&self) -> BufferPoolConfig {
        self.config
    }

    /// 修改配置, 激活状态下不允许
    pub fn set_config(&mut self, config: BufferPoolConfig) -> VdecResult<()> {
        if self.active {
            return Err(VdecError::InvalidState("缓冲池激活时不能修改配置".into()));
        }
        self.config = config;
        Ok(())
    }

    /// 激活或停用缓冲池
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// 是否已激活
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 当前仍存活的缓冲区数量
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// 从缓冲池取出一个零填充缓冲区
    ///
    /// # 返回
    /// - `Err(VdecError::Allocation)`: 缓冲池未激活或已达到 `max_buffers`
    pub fn acquire(&self) -> VdecResult<Buffer> {
        if !self.active {
            return Err(VdecError::Allocation("缓冲池未激活".into()));
        }
        let max = self.config.max_buffers;
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if max > 0 && n >= max { None } else { Some(n + 1) }
            })
            .map_err(|n| VdecError::Allocation(format!("缓冲池已耗尽: {n}/{max} 个缓冲区在用")))?;

        trace!(
            "缓冲池分配 {} 字节, 在用 {}",
            self.config.size,
            self.outstanding()
        );
        Ok(Buffer::pooled(
            self.config.size,
            PoolSlot {
                outstanding: Arc::clone(&self.outstanding),
            },
        ))
    }
}
