//! 字节累积器.
//!
//! 收集任意大小的输入块, 按需从头部取出指定长度的数据.

use bytes::{Bytes, BytesMut};

/// 字节累积器
#[derive(Debug, Default)]
pub struct Adapter {
    data: BytesMut,
}

impl Adapter {
    /// 创建空累积器
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加数据
    pub fn push(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// 可用字节数
    pub fn available(&self) -> usize {
        self.data.len()
    }

    /// 查看全部可用数据
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// 从头部取出 `n` 字节, 不足时取出全部
    pub fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.data.len());
        self.data.split_to(n).freeze()
    }

    /// 取出全部数据
    pub fn take_all(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    /// 丢弃全部数据
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_累积与取出() {
        let mut adapter = Adapter::new();
        adapter.push(&[1, 2, 3]);
        adapter.push(&[4, 5]);
        assert_eq!(adapter.available(), 5);
        assert_eq!(&adapter.take(2)[..], &[1, 2]);
        assert_eq!(adapter.as_slice(), &[3, 4, 5]);
        assert_eq!(&adapter.take(10)[..], &[3, 4, 5]);
        assert_eq!(adapter.available(), 0);
        assert!(adapter.take_all().is_empty());
    }
}
