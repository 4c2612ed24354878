//! 端到端集成测试: 刷新与排空.

mod common;

use common::{
    ScriptedCodec, event_names, frame_buffer, ms, output_indices, start_decoder,
};
use vdec::base::{DecoderConfig, DrainState, Event};
use vdec::core::{BufferFlags, Segment, VdecError};

fn count(log: &std::sync::Mutex<Vec<String>>, entry: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == entry).count()
}

fn flush(decoder: &vdec::base::VideoDecoder) {
    decoder.send_event(Event::FlushStart).unwrap();
    decoder
        .send_event(Event::FlushStop { reset_time: true })
        .unwrap();
}

#[test]
fn test_flush_重复刷新只执行一次() {
    let codec = ScriptedCodec::new().with_delay(1);
    let log = codec.log_handle();
    let (decoder, _sink) = start_decoder(codec, DecoderConfig::default(), Segment::new_time());

    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    flush(&decoder);
    flush(&decoder);

    assert_eq!(count(&log, "flush"), 1, "两次刷新之间没有新数据, 第二次应被忽略");
    assert_eq!(
        decoder.drain_state().unwrap(),
        DrainState::Flushed { hard: true }
    );
    assert_eq!(decoder.stats().unwrap().frames_in_flight, 0);
}

#[test]
fn test_flush_刷新期间拒绝数据() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder.send_event(Event::FlushStart).unwrap();
    let result = decoder.push_buffer(frame_buffer(0, Some(ms(0)), true));
    assert!(matches!(result, Err(VdecError::Flushing)));

    decoder
        .send_event(Event::FlushStop { reset_time: true })
        .unwrap();
    assert_eq!(event_names(&sink), vec!["flush-start", "flush-stop"]);
}

#[test]
fn test_flush_刷新后恢复输出() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new().with_delay(1),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    decoder.push_buffer(frame_buffer(1, Some(ms(40)), true)).unwrap();
    assert_eq!(output_indices(&sink), vec![0]);

    flush(&decoder);
    // 帧 #1 在刷新时被清除, 迟到的完成调用被忽略
    assert!(decoder.finish_frame(1).is_ok());

    decoder
        .send_event(Event::Segment(Segment::new_time().with_range(ms(80), None)))
        .unwrap();
    decoder.push_buffer(frame_buffer(2, Some(ms(80)), true)).unwrap();
    decoder.send_event(Event::Eos).unwrap();

    assert_eq!(output_indices(&sink), vec![0, 2]);
    let buffers = sink.buffers();
    assert!(
        buffers[1].flags.contains(BufferFlags::DISCONT),
        "刷新后的第一个输出应带不连续标志"
    );
    assert_eq!(
        event_names(&sink),
        vec!["caps", "segment", "flush-start", "flush-stop", "segment", "eos"]
    );
}

#[test]
fn test_drain_新流开始时排空() {
    let codec = ScriptedCodec {
        has_drain: true,
        ..ScriptedCodec::new().with_delay(2)
    };
    let log = codec.log_handle();
    let (decoder, sink) = start_decoder(codec, DecoderConfig::default(), Segment::new_time());

    for i in 0..3u8 {
        decoder
            .push_buffer(frame_buffer(i, Some(ms(u64::from(i) * 40)), true))
            .unwrap();
    }
    assert_eq!(output_indices(&sink), vec![0]);

    decoder
        .send_event(Event::StreamStart {
            stream_id: "second".into(),
        })
        .unwrap();
    assert_eq!(output_indices(&sink), vec![0, 1, 2]);
    assert_eq!(count(&log, "drain"), 1);
    assert_eq!(count(&log, "finish"), 0);
    assert_eq!(event_names(&sink).last().map(String::as_str), Some("stream-start"));
}

#[test]
fn test_drain_未实现时退回_finish() {
    let codec = ScriptedCodec::new().with_delay(2);
    let log = codec.log_handle();
    let (decoder, sink) = start_decoder(codec, DecoderConfig::default(), Segment::new_time());

    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    decoder
        .send_event(Event::StillFrame { active: true })
        .unwrap();

    assert_eq!(output_indices(&sink), vec![0]);
    assert_eq!(count(&log, "finish"), 1);
    assert_eq!(decoder.drain_state().unwrap(), DrainState::Running);
}

#[test]
fn test_drain_停止后回到已刷新状态() {
    let (decoder, _sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    assert_eq!(decoder.drain_state().unwrap(), DrainState::Running);

    decoder.stop().unwrap();
    assert_eq!(
        decoder.drain_state().unwrap(),
        DrainState::Flushed { hard: true }
    );
    let stats = decoder.stats().unwrap();
    assert_eq!(stats.frames_in_flight, 0);
    assert_eq!(stats.error_count, 0);
}

#[test]
fn test_flush_只容忍最近一次刷新清除的帧() {
    let (decoder, _sink) = start_decoder(
        ScriptedCodec::new().with_delay(2),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    decoder.push_buffer(frame_buffer(1, Some(ms(40)), true)).unwrap();
    flush(&decoder);

    decoder
        .send_event(Event::Segment(Segment::new_time()))
        .unwrap();
    decoder.push_buffer(frame_buffer(2, Some(ms(0)), true)).unwrap();
    flush(&decoder);

    assert!(decoder.finish_frame(2).is_ok(), "帧 #2 在最近一次刷新时清除");
    assert!(
        matches!(decoder.finish_frame(0), Err(VdecError::UnknownFrame(0))),
        "更早刷新清除的帧不再记录"
    );
    assert!(matches!(
        decoder.finish_frame(2),
        Err(VdecError::UnknownFrame(2))
    ));
}

#[test]
fn test_drain_流结束后为软刷新状态() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new().with_delay(1),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    decoder.send_event(Event::Eos).unwrap();

    assert_eq!(output_indices(&sink), vec![0]);
    assert_eq!(
        decoder.drain_state().unwrap(),
        DrainState::Flushed { hard: false }
    );

    // 流结束后的硬刷新仍要执行
    flush(&decoder);
    assert_eq!(
        decoder.drain_state().unwrap(),
        DrainState::Flushed { hard: true }
    );
}
