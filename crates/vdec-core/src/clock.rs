//! 纳秒精度的时钟时间.
//!
//! 管线中所有时间戳 (pts, dts, 时长, 段边界) 都以 `ClockTime` 表示,
//! "未定义" 统一使用 `Option<ClockTime>` 的 `None`.

use std::fmt;
use std::ops::Add;

use crate::rational::Rational;

/// 时钟时间 (纳秒)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClockTime(u64);

impl ClockTime {
    /// 零时刻
    pub const ZERO: Self = Self(0);
    /// 1 纳秒
    pub const NSECOND: Self = Self(1);
    /// 1 微秒
    pub const USECOND: Self = Self(1_000);
    /// 1 毫秒
    pub const MSECOND: Self = Self(1_000_000);
    /// 1 秒
    pub const SECOND: Self = Self(1_000_000_000);
    /// 可表示的最大时间
    pub const MAX: Self = Self(u64::MAX);

    /// 从纳秒创建
    pub const fn from_nseconds(ns: u64) -> Self {
        Self(ns)
    }

    /// 从毫秒创建
    pub const fn from_mseconds(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    /// 从秒创建
    pub const fn from_seconds(s: u64) -> Self {
        Self(s.saturating_mul(1_000_000_000))
    }

    /// 纳秒值
    pub const fn nseconds(self) -> u64 {
        self.0
    }

    /// 毫秒值 (向下取整)
    pub const fn mseconds(self) -> u64 {
        self.0 / 1_000_000
    }

    /// 转换为秒 (f64)
    pub fn to_seconds_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// 加法, 溢出返回 None
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// 减法, 结果为负返回 None
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// 减法, 结果为负时取 0
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// 加上一个有符号差值 (纳秒), 结果为负或溢出返回 None
    pub fn offset_by(self, diff: i64) -> Option<Self> {
        if diff >= 0 {
            self.0.checked_add(diff.unsigned_abs()).map(Self)
        } else {
            self.0.checked_sub(diff.unsigned_abs()).map(Self)
        }
    }

    /// 有符号差值 `self - other` (纳秒), 超出 i64 时饱和
    pub fn diff(self, other: Self) -> i64 {
        let d = i128::from(self.0) - i128::from(other.0);
        d.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// 按 `num / den` 缩放, 中间结果使用 128 位避免溢出
    pub fn mul_div(self, num: u64, den: u64) -> Option<Self> {
        uint64_scale(self.0, num, den).map(Self)
    }

    /// 由帧率推导单帧时长: `1s * fps.den / fps.num`
    ///
    /// 帧率非正 (未知或可变帧率) 时返回 None.
    pub fn frame_duration(fps: Rational) -> Option<Self> {
        if !fps.is_positive() {
            return None;
        }
        Self::SECOND.mul_div(fps.den as u64, fps.num as u64)
    }

    /// 格式化可选时间, 未定义时输出 "none"
    pub fn display(t: Option<Self>) -> String {
        match t {
            Some(t) => t.to_string(),
            None => "none".to_string(),
        }
    }
}

impl Add for ClockTime {
    type Output = Self;

    /// 饱和加法
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ns = self.0;
        let secs = ns / 1_000_000_000;
        write!(
            f,
            "{}:{:02}:{:02}.{:09}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            ns % 1_000_000_000
        )
    }
}

/// 计算 `val * num / den`, 使用 128 位中间值
///
/// `den` 为 0 或结果超出 u64 时返回 None.
pub fn uint64_scale(val: u64, num: u64, den: u64) -> Option<u64> {
    if den == 0 {
        return None;
    }
    let r = u128::from(val) * u128::from(num) / u128::from(den);
    u64::try_from(r).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_帧时长() {
        let d = ClockTime::frame_duration(Rational::new(25, 1));
        assert_eq!(d, Some(ClockTime::from_mseconds(40)));
        let d = ClockTime::frame_duration(Rational::new(30000, 1001));
        assert_eq!(d, Some(ClockTime::from_nseconds(33_366_666)));
        assert_eq!(ClockTime::frame_duration(Rational::ZERO), None);
    }

    #[test]
    fn test_clock_有符号偏移() {
        let t = ClockTime::from_mseconds(100);
        assert_eq!(t.offset_by(-40_000_000), Some(ClockTime::from_mseconds(60)));
        assert_eq!(t.offset_by(-200_000_000), None);
        assert_eq!(ClockTime::from_mseconds(60).diff(t), -40_000_000);
    }

    #[test]
    fn test_clock_显示() {
        let t = ClockTime::from_seconds(3661) + ClockTime::from_mseconds(5);
        assert_eq!(t.to_string(), "1:01:01.005000000");
        assert_eq!(ClockTime::display(None), "none");
    }
}
