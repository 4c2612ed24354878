//! 合成码流.
//!
//! 生成 GRAY8 原始图像序列, 每 `gop` 帧一个关键帧, 其余帧带 DELTA_UNIT 标志.
//! 每帧像素值为帧序号, 便于在输出中辨认.

use vdec_core::{Buffer, BufferFlags, ClockTime, Rational, VdecError, VdecResult};

/// 合成码流参数
#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub frames: u32,
    pub gop: u32,
    pub width: u32,
    pub height: u32,
    pub fps: Rational,
}

impl StreamSpec {
    /// 单帧时长
    pub fn frame_duration(&self) -> VdecResult<ClockTime> {
        ClockTime::frame_duration(self.fps)
            .ok_or_else(|| VdecError::InvalidArgument(format!("无效帧率 {}", self.fps)))
    }

    fn frame(&self, index: u32, duration: ClockTime) -> Buffer {
        let size = (self.width * self.height) as usize;
        let pts = duration.mul_div(u64::from(index), 1);
        let mut flags = BufferFlags::empty();
        if index % self.gop != 0 {
            flags |= BufferFlags::DELTA_UNIT;
        }
        Buffer::from_data(vec![index as u8; size])
            .with_pts(pts)
            .with_dts(pts)
            .with_duration(duration)
            .with_flags(flags)
    }

    /// 正向播放顺序的全部帧
    pub fn forward(&self) -> VdecResult<Vec<Buffer>> {
        let duration = self.frame_duration()?;
        Ok((0..self.frames).map(|i| self.frame(i, duration)).collect())
    }

    /// 反向播放顺序: GOP 倒序, GOP 内正向, 每个 GOP 首帧带不连续标志
    pub fn reverse(&self) -> VdecResult<Vec<Buffer>> {
        let duration = self.frame_duration()?;
        let mut starts: Vec<u32> = (0..self.frames).step_by(self.gop as usize).collect();
        starts.reverse();

        let mut buffers = Vec::with_capacity(self.frames as usize);
        for start in starts {
            let end = (start + self.gop).min(self.frames);
            for i in start..end {
                let mut buffer = self.frame(i, duration);
                if i == start {
                    buffer.flags |= BufferFlags::DISCONT;
                }
                buffers.push(buffer);
            }
        }
        Ok(buffers)
    }

    /// 非打包输入: 把正向码流切成不与帧边界对齐的块
    ///
    /// 块的时间戳取块内第一个起始字节属于的帧, 与解析器按偏移取回时间戳的方式一致.
    pub fn chunked(&self, chunk: usize) -> VdecResult<Vec<Buffer>> {
        let frames = self.forward()?;
        let mut chunks = Vec::new();
        for frame in frames {
            let data = frame.data.clone();
            for (n, piece) in data.chunks(chunk.max(1)).enumerate() {
                let mut buffer = Buffer::from_data(piece.to_vec());
                if n == 0 {
                    buffer.pts = frame.pts;
                    buffer.dts = frame.dts;
                    buffer.duration = frame.duration;
                    buffer.flags = frame.flags;
                }
                chunks.push(buffer);
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StreamSpec {
        StreamSpec {
            frames: 7,
            gop: 3,
            width: 2,
            height: 2,
            fps: Rational::new(25, 1),
        }
    }

    #[test]
    fn test_forward_关键帧间隔() {
        let frames = sample().forward().unwrap();
        assert_eq!(frames.len(), 7);
        let keys: Vec<bool> = frames.iter().map(|b| !b.is_delta_unit()).collect();
        assert_eq!(keys, vec![true, false, false, true, false, false, true]);
        assert_eq!(frames[1].pts, Some(ClockTime::from_mseconds(40)));
    }

    #[test]
    fn test_reverse_gop_倒序() {
        let frames = sample().reverse().unwrap();
        let order: Vec<u8> = frames.iter().map(|b| b.data[0]).collect();
        assert_eq!(order, vec![6, 3, 4, 5, 0, 1, 2]);
        assert!(frames[0].is_discont());
        assert!(frames[1].is_discont());
        assert!(!frames[2].is_discont());
        assert!(frames[4].is_discont());
    }

    #[test]
    fn test_chunked_拆分() {
        let chunks = sample().chunked(3).unwrap();
        // 每帧 4 字节拆成 3 + 1
        assert_eq!(chunks.len(), 14);
        assert!(chunks[0].pts.is_some());
        assert!(chunks[1].pts.is_none());
    }
}
