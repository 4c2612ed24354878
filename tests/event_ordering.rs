//! 端到端集成测试: 事件与数据的相对顺序.

mod common;

use std::sync::Arc;

use common::{
    ScriptedCodec, event_names, frame_buffer, gray_caps, init_logger, ms, output_indices,
    output_pts, start_decoder,
};
use vdec::base::{CollectSink, DecoderConfig, Event, SinkItem, TagList, TagScope, VideoDecoder};
use vdec::core::{Segment, SegmentFlags, VdecError};

fn new_decoder(codec: ScriptedCodec) -> (VideoDecoder, Arc<CollectSink>) {
    init_logger();
    let sink = Arc::new(CollectSink::new());
    let decoder = VideoDecoder::new(Box::new(codec), sink.clone(), DecoderConfig::default()).unwrap();
    decoder.start().unwrap();
    (decoder, sink)
}

#[test]
fn test_events_缺少段事件时自动补上() {
    let (decoder, sink) = new_decoder(ScriptedCodec::new());
    decoder.send_event(Event::Caps(gray_caps())).unwrap();
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();

    assert_eq!(event_names(&sink), vec!["caps", "segment"]);
    assert_eq!(output_pts(&sink), vec![Some(ms(0))]);
}

#[test]
fn test_events_新流事件排在格式之前() {
    let (decoder, sink) = new_decoder(ScriptedCodec::new());
    decoder
        .send_event(Event::StreamStart {
            stream_id: "video-0".into(),
        })
        .unwrap();
    decoder.send_event(Event::Caps(gray_caps())).unwrap();
    decoder.send_event(Event::Segment(Segment::new_time())).unwrap();
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();

    assert_eq!(event_names(&sink), vec!["stream-start", "caps", "segment"]);
}

#[test]
fn test_events_标签随下一帧送出() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder
        .send_event(Event::Tag {
            tags: TagList::new().with("title", "测试"),
            scope: TagScope::Stream,
        })
        .unwrap();
    assert!(sink.events().is_empty(), "标签事件应等待下一帧");

    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    assert_eq!(event_names(&sink), vec!["caps", "segment", "tag"]);

    let tags = sink.events().into_iter().find_map(|e| match e {
        Event::Tag { tags, .. } => Some(tags),
        _ => None,
    });
    assert_eq!(tags.and_then(|t| t.get_first("title").map(String::from)), Some("测试".into()));

    // 标签事件排在图像之前
    let items = sink.items();
    let tag_pos = items
        .iter()
        .position(|i| matches!(i, SinkItem::Event(Event::Tag { .. })));
    let buffer_pos = items.iter().position(|i| matches!(i, SinkItem::Buffer(_)));
    assert!(tag_pos < buffer_pos);
}

#[test]
fn test_events_非串行化事件立即送出() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder
        .send_event(Event::Custom {
            name: "oob".into(),
            serialized: false,
        })
        .unwrap();
    decoder
        .send_event(Event::Custom {
            name: "inband".into(),
            serialized: true,
        })
        .unwrap();
    assert_eq!(event_names(&sink), vec!["oob"]);

    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    assert_eq!(event_names(&sink), vec!["oob", "caps", "segment", "inband"]);
}

#[test]
fn test_events_空隙事件触发协商() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new(),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder
        .send_event(Event::Gap {
            timestamp: ms(0),
            duration: Some(ms(40)),
        })
        .unwrap();
    assert_eq!(event_names(&sink), vec!["caps", "segment", "gap"]);
}

#[test]
fn test_events_没有输出格式时空隙事件报错() {
    let (decoder, sink) = new_decoder(ScriptedCodec::new());
    decoder.send_event(Event::Segment(Segment::new_time())).unwrap();
    let result = decoder.send_event(Event::Gap {
        timestamp: ms(0),
        duration: None,
    });
    assert!(matches!(result, Err(VdecError::Format(_))));
    assert!(sink.events().is_empty());
}

#[test]
fn test_events_只解码关键帧时空隙事件排空() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new().with_delay(2),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    for i in 0..3u8 {
        decoder
            .push_buffer(frame_buffer(i, Some(ms(u64::from(i) * 40)), true))
            .unwrap();
    }
    assert_eq!(output_indices(&sink), vec![0]);

    decoder
        .send_event(Event::InstantRateChange {
            rate_multiplier: 2.0,
            flags: SegmentFlags::TRICKMODE_KEY_UNITS,
        })
        .unwrap();
    decoder
        .send_event(Event::Gap {
            timestamp: ms(120),
            duration: Some(ms(40)),
        })
        .unwrap();

    assert_eq!(output_indices(&sink), vec![0, 1, 2]);
    assert_eq!(
        event_names(&sink),
        vec!["caps", "segment", "instant-rate-change", "gap"]
    );
}

#[test]
fn test_events_段结束事件排空并转发() {
    let (decoder, sink) = start_decoder(
        ScriptedCodec::new().with_delay(1),
        DecoderConfig::default(),
        Segment::new_time(),
    );
    decoder.push_buffer(frame_buffer(0, Some(ms(0)), true)).unwrap();
    decoder
        .send_event(Event::SegmentDone {
            position: Some(ms(40)),
        })
        .unwrap();

    assert_eq!(output_indices(&sink), vec![0]);
    assert_eq!(event_names(&sink), vec!["caps", "segment", "segment-done"]);
}
