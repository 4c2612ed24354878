//! 解码器配置.
//!
//! 构造 `VideoDecoder` 时传入, 也可从 JSON 文件加载. 所有字段都有默认值,
//! JSON 中缺省的字段取默认值.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vdec_core::{ClockTime, VdecError, VdecResult};

use crate::tags::TagMergeMode;

/// 连续解码错误的默认上限
pub const DEFAULT_MAX_ERRORS: i32 = 10;

/// 解码器配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 输入是否已按帧切分 (无需解析器)
    pub packetized: bool,
    /// 连续解码错误上限, 超过即为致命错误; -1 表示不限
    pub max_errors: i32,
    /// 是否根据下游 QoS 反馈丢弃迟到帧
    pub qos: bool,
    /// 是否必须先收到输入格式才接受数据
    pub needs_format: bool,
    /// 最小解码延迟 (毫秒)
    pub min_latency_ms: u64,
    /// 最大解码延迟 (毫秒), None 表示无上限
    pub max_latency_ms: Option<u64>,
    /// 解码器标签与上游标签的合并模式
    pub tags_merge_mode: TagMergeMode,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            packetized: true,
            max_errors: DEFAULT_MAX_ERRORS,
            qos: true,
            needs_format: false,
            min_latency_ms: 0,
            max_latency_ms: None,
            tags_merge_mode: TagMergeMode::default(),
        }
    }
}

impl DecoderConfig {
    /// 从 JSON 字符串解析
    pub fn from_json_str(json: &str) -> VdecResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| VdecError::InvalidArgument(format!("解析解码器配置失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> VdecResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// 检查取值范围
    pub fn validate(&self) -> VdecResult<()> {
        if self.max_errors < -1 {
            return Err(VdecError::InvalidArgument(format!(
                "max_errors 必须 >= -1, 实际为 {}",
                self.max_errors
            )));
        }
        if let Some(max) = self.max_latency_ms {
            if max < self.min_latency_ms {
                return Err(VdecError::InvalidArgument(format!(
                    "最大延迟 {max}ms 小于最小延迟 {}ms",
                    self.min_latency_ms
                )));
            }
        }
        Ok(())
    }

    /// 最小延迟
    pub fn min_latency(&self) -> ClockTime {
        ClockTime::from_mseconds(self.min_latency_ms)
    }

    /// 最大延迟
    pub fn max_latency(&self) -> Option<ClockTime> {
        self.max_latency_ms.map(ClockTime::from_mseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_默认值() {
        let config = DecoderConfig::default();
        assert!(config.packetized);
        assert!(config.qos);
        assert_eq!(config.max_errors, DEFAULT_MAX_ERRORS);
    }

    #[test]
    fn test_config_部分字段() {
        let config = DecoderConfig::from_json_str(r#"{"max_errors": -1, "packetized": false}"#).unwrap();
        assert_eq!(config.max_errors, -1);
        assert!(!config.packetized);
        assert!(config.qos, "缺省字段应取默认值");
        assert_eq!(config.tags_merge_mode, TagMergeMode::Replace);
    }

    #[test]
    fn test_config_非法取值() {
        assert!(DecoderConfig::from_json_str(r#"{"max_errors": -5}"#).is_err());
        assert!(DecoderConfig::from_json_str(r#"{"min_latency_ms": 50, "max_latency_ms": 10}"#).is_err());
        assert!(DecoderConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_config_从文件加载() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"qos": false, "tags_merge_mode": "keep_all"}}"#).unwrap();
        let config = DecoderConfig::from_json_file(file.path()).unwrap();
        assert!(!config.qos);
        assert_eq!(config.tags_merge_mode, TagMergeMode::KeepAll);
    }
}
