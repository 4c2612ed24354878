//! 编解码器注册表.
//!
//! 按名称或输入媒体类型查找并实例化 `VideoCodec`.

use std::collections::HashMap;

use vdec_core::{VdecError, VdecResult};

use crate::codec::VideoCodec;

/// 编解码器工厂函数类型
pub type CodecFactory = fn() -> VdecResult<Box<dyn VideoCodec>>;

/// 注册条目
struct CodecEntry {
    /// 编解码器名称
    name: String,
    /// 工厂函数
    factory: CodecFactory,
}

/// 编解码器注册表
///
/// 同一媒体类型可注册多个编解码器, 先注册的优先.
pub struct CodecRegistry {
    /// 媒体类型到注册条目的映射
    by_media_type: HashMap<String, Vec<CodecEntry>>,
}

impl CodecRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            by_media_type: HashMap::new(),
        }
    }

    /// 注册一个编解码器
    pub fn register(
        &mut self,
        media_type: impl Into<String>,
        name: impl Into<String>,
        factory: CodecFactory,
    ) {
        self.by_media_type
            .entry(media_type.into())
            .or_default()
            .push(CodecEntry {
                name: name.into(),
                factory,
            });
    }

    /// 为输入媒体类型创建编解码器实例
    pub fn create_for_media_type(&self, media_type: &str) -> VdecResult<Box<dyn VideoCodec>> {
        let entry = self
            .by_media_type
            .get(media_type)
            .and_then(|entries| entries.first())
            .ok_or_else(|| VdecError::Unsupported(format!("未找到 {media_type} 的解码器")))?;
        (entry.factory)()
    }

    /// 按名称创建编解码器实例
    pub fn create(&self, name: &str) -> VdecResult<Box<dyn VideoCodec>> {
        let entry = self
            .by_media_type
            .values()
            .flatten()
            .find(|entry| entry.name == name)
            .ok_or_else(|| VdecError::Unsupported(format!("未找到名为 {name} 的解码器")))?;
        (entry.factory)()
    }

    /// 获取所有已注册的 (媒体类型, 名称), 按名称排序
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut result: Vec<(&str, &str)> = self
            .by_media_type
            .iter()
            .flat_map(|(media_type, entries)| {
                entries
                    .iter()
                    .map(move |entry| (media_type.as_str(), entry.name.as_str()))
            })
            .collect();
        result.sort_by(|a, b| a.1.cmp(b.1));
        result
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
