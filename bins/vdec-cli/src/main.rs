//! vdec-cli - 视频解码管线命令行工具
//!
//! 生成一段合成的原始视频码流, 送入 rawvideo 解码器, 打印输出统计.
//! 可选反向播放、非打包输入、段裁剪与 QoS 丢帧.

mod logging;
mod stream;

use std::process;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use log::info;

use vdec_base::{
    Caps, CollectSink, DecoderConfig, Event, Message, VideoDecoder, codecs::RawVideoDecoder,
};
use vdec_core::{
    Buffer, ClockTime, PixelFormat, Rational, Segment, VdecError, VdecResult, VideoInfo,
};

use stream::StreamSpec;

/// 非打包输入的块大小 (字节)
const CHUNK_SIZE: usize = 1000;

#[derive(Parser, Debug)]
#[command(name = "vdec-cli", version, about = "视频解码器基类管线演示工具")]
struct Cli {
    /// 帧数
    #[arg(long, default_value_t = 50)]
    frames: u32,

    /// 关键帧间隔
    #[arg(long, default_value_t = 10)]
    gop: u32,

    /// 图像宽度
    #[arg(long, default_value_t = 64)]
    width: u32,

    /// 图像高度
    #[arg(long, default_value_t = 48)]
    height: u32,

    /// 帧率 (如 "25" 或 "30000/1001")
    #[arg(long, default_value = "25")]
    fps: String,

    /// 反向播放 (rate = -1.0)
    #[arg(long)]
    reverse: bool,

    /// 以不对齐帧边界的字节块送入 (需要解析器)
    #[arg(long)]
    unpacketized: bool,

    /// 段终点 (毫秒), 之后的图像被裁掉
    #[arg(long)]
    segment_stop: Option<u64>,

    /// 模拟下游 QoS 反馈: 最早期限 (毫秒), 早于它的帧被丢弃
    #[arg(long)]
    qos_earliest: Option<u64>,

    /// 解码器配置文件 (JSON)
    #[arg(long)]
    config: Option<String>,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// 一次运行的结果
#[derive(Debug, Default)]
struct Summary {
    buffers: usize,
    first_pts: Option<ClockTime>,
    last_pts: Option<ClockTime>,
    dropped: u64,
    qos_messages: usize,
    warnings: usize,
    errors: usize,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("vdec-cli", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    match run(&cli) {
        Ok((summary, flow)) => {
            print_summary(&summary, &flow);
            if let Err(e) = flow {
                eprintln!("错误: {e}");
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("错误: {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<(Summary, VdecResult<()>)> {
    if cli.gop == 0 {
        bail!("关键帧间隔必须大于 0");
    }
    let fps = parse_fps(&cli.fps)?;
    let stream = StreamSpec {
        frames: cli.frames,
        gop: cli.gop,
        width: cli.width,
        height: cli.height,
        fps,
    };

    let mut config = match &cli.config {
        Some(path) => DecoderConfig::from_json_file(path)
            .with_context(|| format!("加载配置文件 {path} 失败"))?,
        None => DecoderConfig::default(),
    };
    if cli.unpacketized {
        config.packetized = false;
    }
    let packetized = config.packetized;

    let sink = Arc::new(CollectSink::new());
    let decoder = VideoDecoder::new(Box::new(RawVideoDecoder::new()), sink.clone(), config)?;
    decoder.open()?;
    decoder.start()?;

    let info = VideoInfo::new(PixelFormat::Gray8, cli.width, cli.height).with_fps(fps);
    let rate = if cli.reverse { -1.0 } else { 1.0 };
    let segment = Segment::new_time()
        .with_rate(rate)
        .with_range(ClockTime::ZERO, cli.segment_stop.map(ClockTime::from_mseconds));

    decoder.send_event(Event::StreamStart {
        stream_id: "vdec-cli/0".into(),
    })?;
    decoder.send_event(Event::Caps(Caps::raw(info)))?;
    decoder.send_event(Event::Segment(segment))?;

    let buffers = match (cli.reverse, packetized) {
        (true, _) => stream.reverse()?,
        (false, true) => stream.forward()?,
        (false, false) => stream.chunked(CHUNK_SIZE)?,
    };
    info!(
        "送入 {} 个缓冲区: {}x{} @ {fps} fps, rate={rate}",
        buffers.len(),
        cli.width,
        cli.height
    );

    let earliest = cli.qos_earliest.map(ClockTime::from_mseconds);
    let flow = feed(&decoder, buffers, earliest);
    let stats = decoder.stats()?;
    decoder.stop()?;
    decoder.close()?;

    let mut summary = Summary {
        dropped: stats.qos.dropped,
        ..Summary::default()
    };
    for buffer in sink.buffers() {
        summary.buffers += 1;
        if summary.first_pts.is_none() {
            summary.first_pts = buffer.pts;
        }
        summary.last_pts = buffer.pts;
    }
    for message in sink.messages() {
        match message {
            Message::Qos(_) => summary.qos_messages += 1,
            Message::Warning { .. } => summary.warnings += 1,
            Message::Error { .. } => summary.errors += 1,
            Message::Latency { .. } => {}
        }
    }
    Ok((summary, flow))
}

/// 送入全部数据与 EOS, 返回第一个错误
///
/// 输出段事件会清除 QoS 期限, 因此模拟的下游反馈在第一个缓冲区之后才送入.
/// 输出越过段尾 (`Eos`) 时停止送数据, 仍以 EOS 事件结束.
fn feed(
    decoder: &VideoDecoder,
    buffers: Vec<Buffer>,
    earliest: Option<ClockTime>,
) -> VdecResult<()> {
    for (index, buffer) in buffers.into_iter().enumerate() {
        match decoder.push_buffer(buffer) {
            Ok(()) => {}
            Err(VdecError::Eos) => {
                info!("输出已越过段尾, 停止送入");
                break;
            }
            Err(e) => return Err(e),
        }
        if index == 0 {
            if let Some(earliest) = earliest {
                info!("模拟下游 QoS 反馈: 最早期限 {earliest}");
                decoder.handle_qos(1.0, 0, Some(earliest));
            }
        }
    }
    decoder.send_event(Event::Eos)
}

/// 解析帧率: "25" 或 "30000/1001"
fn parse_fps(text: &str) -> anyhow::Result<Rational> {
    let (num, den) = match text.split_once('/') {
        Some((num, den)) => (num.trim(), den.trim()),
        None => (text.trim(), "1"),
    };
    let num: i32 = num.parse().with_context(|| format!("无效帧率: {text}"))?;
    let den: i32 = den.parse().with_context(|| format!("无效帧率: {text}"))?;
    let fps = Rational::new(num, den);
    if !fps.is_positive() {
        bail!("帧率必须为正: {text}");
    }
    Ok(fps)
}

fn print_summary(summary: &Summary, flow: &VdecResult<()>) {
    println!("输出图像: {}", summary.buffers);
    println!(
        "时间范围: {} - {}",
        ClockTime::display(summary.first_pts),
        ClockTime::display(summary.last_pts)
    );
    println!("QoS 丢帧: {} ({} 条 QoS 消息)", summary.dropped, summary.qos_messages);
    println!("警告: {}, 错误: {}", summary.warnings, summary.errors);
    match flow {
        Ok(()) => println!("结果: ok"),
        Err(e) => println!("结果: {e}"),
    }
}
