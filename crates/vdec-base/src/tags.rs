//! 元数据标签列表与合并规则.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 标签合并模式
///
/// 描述把"新"标签列表合并进"旧"标签列表时的取舍.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMergeMode {
    /// 以新列表整体替换旧列表
    ReplaceAll,
    /// 同名标签以新值替换
    #[default]
    Replace,
    /// 同名标签的新值追加在旧值之后
    Append,
    /// 同名标签的新值插入在旧值之前
    Prepend,
    /// 同名标签保留旧值, 只补充旧列表没有的标签
    Keep,
    /// 完全保留旧列表
    KeepAll,
}

/// 标签列表, 每个标签可以有多个值
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagList {
    entries: BTreeMap<String, Vec<String>>,
}

impl TagList {
    /// 创建空标签列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加单值标签 (构造用)
    pub fn with(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(tag, value);
        self
    }

    /// 追加一个标签值
    pub fn add(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(tag.into()).or_default().push(value.into());
    }

    /// 标签的全部值
    pub fn get(&self, tag: &str) -> Option<&[String]> {
        self.entries.get(tag).map(Vec::as_slice)
    }

    /// 标签的第一个值
    pub fn get_first(&self, tag: &str) -> Option<&str> {
        self.get(tag).and_then(|v| v.first()).map(String::as_str)
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 标签数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 按模式合并两个列表
    ///
    /// # 参数
    /// - `old`: 旧列表 (如上游标签)
    /// - `new`: 新列表 (如解码器自身的标签)
    /// - `mode`: 合并模式
    ///
    /// # 返回
    /// 两者皆空时返回 None
    pub fn merge(old: Option<&TagList>, new: Option<&TagList>, mode: TagMergeMode) -> Option<TagList> {
        let merged = match (old, new) {
            (None, None) => return None,
            (Some(old), None) => match mode {
                TagMergeMode::ReplaceAll => TagList::new(),
                _ => old.clone(),
            },
            (None, Some(new)) => match mode {
                TagMergeMode::KeepAll => TagList::new(),
                _ => new.clone(),
            },
            (Some(old), Some(new)) => {
                let mut result = old.clone();
                result.insert_all(new, mode);
                result
            }
        };
        if merged.is_empty() { None } else { Some(merged) }
    }

    /// 把 `other` 的标签按模式并入自身
    pub fn insert_all(&mut self, other: &TagList, mode: TagMergeMode) {
        match mode {
            TagMergeMode::ReplaceAll => {
                *self = other.clone();
                return;
            }
            TagMergeMode::KeepAll => return,
            _ => {}
        }
        for (tag, values) in &other.entries {
            let existing = self.entries.entry(tag.clone()).or_default();
            match mode {
                TagMergeMode::Replace => *existing = values.clone(),
                TagMergeMode::Append => existing.extend(values.iter().cloned()),
                TagMergeMode::Prepend => {
                    let mut merged = values.clone();
                    merged.append(existing);
                    *existing = merged;
                }
                TagMergeMode::Keep => {
                    if existing.is_empty() {
                        *existing = values.clone();
                    }
                }
                TagMergeMode::ReplaceAll | TagMergeMode::KeepAll => {}
            }
        }
    }
}
