//! 端到端集成测试: 反向播放.
//!
//! 上游按 GOP 倒序送入, 每个 GOP 以不连续标志开头; 输出应为完全倒序的图像.

mod common;

use common::{
    ScriptedCodec, event_names, frame_buffer, ms, output_indices, output_pts, start_decoder,
};
use vdec::base::{DecoderConfig, Event};
use vdec::core::{Buffer, BufferFlags, Segment, VdecError};

fn gop_buffer(index: u8, key: bool) -> Buffer {
    let mut buffer = frame_buffer(index, Some(ms(u64::from(index) * 40)), key);
    if key {
        buffer.flags |= BufferFlags::DISCONT;
    }
    buffer
}

fn reverse_segment() -> Segment {
    Segment::new_time().with_rate(-1.0)
}

#[test]
fn test_reverse_两个_gop_完全倒序输出() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        reverse_segment(),
    );

    // GOP [3 4 5] 先到, 然后是 [0 1 2]
    for i in [3u8, 4, 5, 0, 1, 2] {
        decoder.push_buffer(gop_buffer(i, i % 3 == 0)).unwrap();
    }
    assert_eq!(
        output_indices(&sink),
        vec![5, 4, 3],
        "收到下一个不连续点时应输出上一个 GOP"
    );

    decoder.send_event(Event::Eos).unwrap();
    assert_eq!(output_indices(&sink), vec![5, 4, 3, 2, 1, 0]);

    let pts: Vec<_> = sink.buffers().iter().map(|b| b.pts).collect();
    assert!(
        pts.windows(2).all(|w| w[0] > w[1]),
        "反向输出的 PTS 应递减: {pts:?}"
    );
    assert_eq!(event_names(&sink), vec!["caps", "segment", "eos"]);
    assert_eq!(decoder.stats().unwrap().frames_in_flight, 0);
}

#[test]
fn test_reverse_有延迟的解码器() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new().with_delay(2),
        DecoderConfig::default(),
        reverse_segment(),
    );
    for i in [3u8, 4, 5, 0, 1, 2] {
        decoder.push_buffer(gop_buffer(i, i % 3 == 0)).unwrap();
    }
    decoder.send_event(Event::Eos).unwrap();

    assert_eq!(output_indices(&sink), vec![5, 4, 3, 2, 1, 0]);
}

#[test]
fn test_reverse_没有关键帧的数据在流结束时丢弃() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        reverse_segment(),
    );
    let mut first = frame_buffer(4, Some(ms(160)), false);
    first.flags |= BufferFlags::DISCONT;
    decoder.push_buffer(first).unwrap();
    decoder
        .push_buffer(frame_buffer(5, Some(ms(200)), false))
        .unwrap();

    let result = decoder.send_event(Event::Eos);
    assert!(
        matches!(result, Err(VdecError::SegmentUnderrun)),
        "有输入却没有输出应报告 SegmentUnderrun"
    );
    assert!(sink.buffers().is_empty());
    assert_eq!(decoder.stats().unwrap().frames_in_flight, 0);
    assert!(event_names(&sink).contains(&"eos".to_string()));
}

#[test]
fn test_reverse_段起点之前的图像被裁掉() {
    let segment = reverse_segment().with_range(ms(100), None);
    let (decoder, sink) = start_decoder(ScriptedCodec::new(), DecoderConfig::default(), segment);

    for i in [3u8, 4, 5, 0, 1, 2] {
        decoder.push_buffer(gop_buffer(i, i % 3 == 0)).unwrap();
    }
    let _ = decoder.send_event(Event::Eos);

    // 帧 2 (80ms) 覆盖到 120ms, 裁剪后仍在段内; 帧 0, 1 完全在段外
    assert_eq!(output_indices(&sink), vec![5, 4, 3, 2]);
}

#[test]
fn test_reverse_缺失时间戳由后一帧往前推算() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        reverse_segment(),
    );

    // 每个 GOP 只有最后一帧带 PTS, 帧 4 同时缺少时长
    let gop = |index: u8, key: bool, pts: Option<u64>| {
        let mut buffer = frame_buffer(index, pts.map(ms), key);
        if key {
            buffer.flags |= BufferFlags::DISCONT;
        }
        if index == 4 {
            buffer.duration = None;
        }
        buffer
    };
    for (index, key, pts) in [
        (3u8, true, None),
        (4, false, None),
        (5, false, Some(200)),
        (0, true, None),
        (1, false, None),
        (2, false, Some(80)),
    ] {
        decoder.push_buffer(gop(index, key, pts)).unwrap();
    }
    decoder.send_event(Event::Eos).unwrap();

    assert_eq!(output_indices(&sink), vec![5, 4, 3, 2, 1, 0]);
    assert_eq!(
        output_pts(&sink),
        [200, 160, 120, 80, 40, 0].map(|v| Some(ms(v))).to_vec()
    );
}
