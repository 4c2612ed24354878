//! RAW 视频解码器.
//!
//! 输入即为未压缩的图像, 每帧原样复制到缓冲池申请的输出图像中.
//! 非打包输入按单帧字节数切分.

use log::{debug, warn};
use vdec_core::{PixelFormat, VdecError, VdecResult};

use crate::caps::Caps;
use crate::codec::{ParseOutcome, VideoCodec};
use crate::context::DecoderContext;
use crate::frame::{CodecFrame, FrameId};

/// RAW 视频解码器
pub struct RawVideoDecoder {
    /// 图像宽度
    width: u32,
    /// 图像高度
    height: u32,
    /// 像素格式
    pixel_format: PixelFormat,
    /// 每帧总字节数, 0 表示尚未收到格式
    frame_size: usize,
}

impl RawVideoDecoder {
    /// 创建解码器
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_format: PixelFormat::None,
            frame_size: 0,
        }
    }

    /// 注册表使用的工厂函数
    pub fn create() -> VdecResult<Box<dyn VideoCodec>> {
        Ok(Box::new(Self::new()))
    }
}

impl Default for RawVideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCodec for RawVideoDecoder {
    fn name(&self) -> &str {
        "rawvideo"
    }

    fn set_format(&mut self, ctx: &mut DecoderContext, caps: &Caps) -> VdecResult<bool> {
        if !caps.is_raw() {
            warn!("rawvideo 解码器不支持 {}", caps.media_type);
            return Ok(false);
        }
        let info = &caps.info;
        let Some(frame_size) = info.format.frame_size(info.width, info.height) else {
            warn!("无法计算 {} 的帧大小", info);
            return Ok(false);
        };

        self.width = info.width;
        self.height = info.height;
        self.pixel_format = info.format;
        self.frame_size = frame_size;
        ctx.set_output_state(info.format, info.width, info.height, Some(caps))?;

        debug!(
            "打开 rawvideo 解码器: {}x{}, 格式={}, 帧大小={}",
            self.width, self.height, self.pixel_format, self.frame_size,
        );
        Ok(true)
    }

    fn parse(
        &mut self,
        _frame: &mut CodecFrame,
        input: &[u8],
        at_eos: bool,
    ) -> VdecResult<ParseOutcome> {
        if self.frame_size == 0 {
            return Err(VdecError::NotNegotiated(
                "rawvideo 解码器尚未收到输入格式".into(),
            ));
        }
        if input.len() >= self.frame_size {
            return Ok(ParseOutcome::Complete(self.frame_size));
        }
        if at_eos && !input.is_empty() {
            // 末尾的残余数据作为一帧交出, 由 handle_frame 报告错误
            debug!("流结束时剩余 {} 字节, 不足一帧", input.len());
            return Ok(ParseOutcome::Complete(input.len()));
        }
        Ok(ParseOutcome::NeedData)
    }

    fn handle_frame(&mut self, ctx: &mut DecoderContext, frame: FrameId) -> VdecResult<()> {
        let input = ctx
            .frame(frame)
            .and_then(|f| f.input_buffer.clone())
            .ok_or(VdecError::UnknownFrame(frame))?;

        if input.size() != self.frame_size {
            return Err(VdecError::Decode(format!(
                "数据大小 {} 与预期帧大小 {} 不匹配",
                input.size(),
                self.frame_size,
            )));
        }

        ctx.allocate_output_frame(frame)?;
        if let Some(output) = ctx.frame_mut(frame).and_then(|f| f.output_buffer.as_mut()) {
            output.map_writable(|data| {
                let n = input.size().min(data.len());
                data[..n].copy_from_slice(&input.data[..n]);
            });
        }
        ctx.finish_frame(frame)
    }

    fn flush(&mut self) {
        debug!("rawvideo 解码器刷新");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use vdec_core::VideoInfo;

    use crate::config::DecoderConfig;
    use crate::qos::QosController;

    fn yuv_caps(w: u32, h: u32) -> Caps {
        Caps::raw(VideoInfo::new(PixelFormat::Yuv420p, w, h))
    }

    #[test]
    fn test_parse_按帧大小切分() {
        let mut dec = RawVideoDecoder::new();
        dec.frame_size = 6;
        let mut frame = CodecFrame::new(0, 0);

        assert_eq!(
            dec.parse(&mut frame, &[0; 4], false).unwrap(),
            ParseOutcome::NeedData
        );
        assert_eq!(
            dec.parse(&mut frame, &[0; 10], false).unwrap(),
            ParseOutcome::Complete(6)
        );
        assert_eq!(
            dec.parse(&mut frame, &[0; 4], true).unwrap(),
            ParseOutcome::Complete(4),
            "流结束时残余数据应作为一帧交出"
        );
        assert_eq!(
            dec.parse(&mut frame, &[], true).unwrap(),
            ParseOutcome::NeedData
        );
    }

    #[test]
    fn test_parse_未设置格式() {
        let mut dec = RawVideoDecoder::new();
        let mut frame = CodecFrame::new(0, 0);
        assert!(matches!(
            dec.parse(&mut frame, &[0; 4], false),
            Err(VdecError::NotNegotiated(_))
        ));
    }

    #[test]
    fn test_set_format_设置输出格式() {
        let mut ctx = DecoderContext::new(
            DecoderConfig::default(),
            Arc::new(QosController::new()),
            Arc::new(AtomicBool::new(false)),
        );
        let mut dec = RawVideoDecoder::new();

        let caps = yuv_caps(4, 2);
        assert!(dec.set_format(&mut ctx, &caps).unwrap());
        assert_eq!(dec.frame_size, 8 + 2 * 2);
        let output = ctx.output_state().expect("应已设置输出格式");
        assert_eq!(output.info.size, 12);
        assert!(output.is_raw());

        let h264 = Caps::new("video/x-h264", VideoInfo::new(PixelFormat::None, 4, 2));
        assert!(!dec.set_format(&mut ctx, &h264).unwrap(), "非原始视频应被拒绝");
    }
}
