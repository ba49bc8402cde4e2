//! liu-probe - 媒体信息探测工具
//!
//! 通过 [`MediaDemuxer`] 打开输入, 打印全局与轨道元数据, 并可按拉模式或
//! 推模式读取全部样本做统计.

use std::collections::BTreeMap;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use liu::core::{LiuError, Meta, MetaValue, Sample, SeekMode};
use liu::demux::{DemuxerConfig, DemuxerEvent, EventReceiver, MediaDemuxer, SampleQueue};
use liu::logging::{self, LoggingConfig};
use liu::source::MediaSource;

/// 拉模式初始缓冲区大小
const INITIAL_BUFFER: usize = 64 * 1024;
/// 推模式每条轨道的队列槽位数
const QUEUE_SLOTS: usize = 16;
/// 推模式连续无样本的最长等待
const PUSH_IDLE_LIMIT: Duration = Duration::from_secs(5);

/// Liu 媒体信息探测工具
#[derive(Parser, Debug)]
#[command(name = "liu-probe", version, about = "纯 Rust 媒体解封装探测工具")]
struct Cli {
    /// 输入 URI 或文件路径
    input: String,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 读取全部样本并统计
    #[arg(long)]
    read_samples: bool,

    /// 以推模式 (输出队列) 读取样本, 需同时指定 --read-samples
    #[arg(long)]
    push: bool,

    /// 读取前先 seek 到指定毫秒
    #[arg(long)]
    seek_ms: Option<i64>,

    /// 引擎配置文件 (TOML)
    #[arg(long)]
    config: Option<String>,

    /// 写入日志文件的目录, 不指定时使用 env_logger 输出到 stderr
    #[arg(long)]
    log_dir: Option<String>,

    /// 文件日志级别
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Serialize)]
struct ProbeOutput {
    input: String,
    format: Option<String>,
    live: bool,
    duration_ms: Option<i64>,
    global: Meta,
    tracks: Vec<TrackInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<BTreeMap<usize, SampleStats>>,
}

#[derive(Serialize)]
struct TrackInfo {
    index: usize,
    kind: String,
    mime: String,
    meta: Meta,
}

#[derive(Debug, Default, Serialize)]
struct SampleStats {
    count: u64,
    bytes: u64,
    sync_frames: u64,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
    eos: bool,
}

impl SampleStats {
    fn record(&mut self, sample: &Sample) {
        if sample.is_eos() {
            self.eos = true;
            return;
        }
        self.count += 1;
        self.bytes += sample.data.len() as u64;
        if sample.is_sync() {
            self.sync_frames += 1;
        }
        self.first_pts.get_or_insert(sample.pts);
        self.last_pts = Some(sample.pts);
    }
}

/// 把引擎事件写入日志
struct LogEvents;

impl EventReceiver for LogEvents {
    fn on_event(&self, event: DemuxerEvent) {
        match event {
            DemuxerEvent::Error(code) => warn!("解封装错误: {:?}", code),
            other => info!("事件: {:?}", other),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli) {
        eprintln!("错误: 初始化日志失败: {e:#}");
        process::exit(1);
    }
    if let Err(e) = run(&cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    match &cli.log_dir {
        Some(dir) => {
            let config = LoggingConfig {
                level: cli.log_level.clone(),
                ..LoggingConfig::with_directory(dir.clone())
            };
            logging::init(config)
        }
        None => {
            env_logger::init();
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<DemuxerConfig> {
    let Some(path) = path else {
        return Ok(DemuxerConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("读取配置失败: {path}"))?;
    DemuxerConfig::from_toml_str(&text).with_context(|| format!("解析配置失败: {path}"))
}

fn run(cli: &Cli) -> Result<()> {
    if cli.push && !cli.read_samples {
        bail!("--push 需要与 --read-samples 一起使用");
    }
    let config = load_config(cli.config.as_deref())?;
    let demuxer = MediaDemuxer::new(
        Arc::new(liu::default_source_registry()),
        Arc::new(liu::default_format_registry()),
        config,
    );
    demuxer.set_event_receiver(Arc::new(LogEvents));
    demuxer
        .set_data_source(&MediaSource::uri(cli.input.as_str()))
        .with_context(|| format!("无法打开输入 '{}'", cli.input))?;

    let tracks = demuxer
        .stream_meta()
        .into_iter()
        .enumerate()
        .map(|(index, meta)| TrackInfo {
            index,
            kind: format!("{:?}", meta.media_type()),
            mime: meta.mime().unwrap_or("unknown").to_string(),
            meta,
        })
        .collect::<Vec<_>>();

    let samples = if cli.read_samples {
        Some(if cli.push {
            drain_push(&demuxer, cli.seek_ms)?
        } else {
            drain_pull(&demuxer, cli.seek_ms)?
        })
    } else {
        None
    };

    let output = ProbeOutput {
        input: cli.input.clone(),
        format: demuxer.format_name(),
        live: demuxer.is_live(),
        duration_ms: demuxer.duration(),
        global: demuxer.global_meta(),
        tracks,
        samples,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&output);
    }
    Ok(())
}

fn select_all(demuxer: &MediaDemuxer, seek_ms: Option<i64>) -> Result<Vec<usize>> {
    let ids = (0..demuxer.track_count()).collect::<Vec<_>>();
    for &id in &ids {
        demuxer
            .select_track(id)
            .with_context(|| format!("选择轨道 {id} 失败"))?;
    }
    if let Some(ms) = seek_ms {
        let landed = demuxer.seek_to(ms, SeekMode::ClosestSync)?;
        info!("seek 到 {} ms, 实际 {} ms", ms, landed);
    }
    Ok(ids)
}

/// 拉模式: 依次读取每条轨道直到 EOS, 缓冲区不足时加倍重试
fn drain_pull(demuxer: &MediaDemuxer, seek_ms: Option<i64>) -> Result<BTreeMap<usize, SampleStats>> {
    let ids = select_all(demuxer, seek_ms)?;
    let mut stats = BTreeMap::new();
    for id in ids {
        let entry: &mut SampleStats = stats.entry(id).or_default();
        let mut capacity = INITIAL_BUFFER;
        let mut sample = Sample::with_capacity(capacity);
        loop {
            match demuxer.read_sample(id, &mut sample) {
                Ok(()) => {
                    entry.record(&sample);
                    if sample.is_eos() {
                        break;
                    }
                }
                Err(LiuError::Again) => continue,
                Err(LiuError::NoMemory(_)) => {
                    capacity *= 2;
                    sample = Sample::with_capacity(capacity);
                }
                Err(LiuError::EndOfStream) => {
                    entry.eos = true;
                    break;
                }
                Err(e) => {
                    warn!("轨道 {} 读取中断: {}", id, e);
                    break;
                }
            }
        }
    }
    Ok(stats)
}

/// 推模式: 每条轨道绑定一个内存队列, 启动后轮询消费直到全部 EOS
fn drain_push(demuxer: &MediaDemuxer, seek_ms: Option<i64>) -> Result<BTreeMap<usize, SampleStats>> {
    let ids = select_all(demuxer, seek_ms)?;
    let mut queues = Vec::with_capacity(ids.len());
    for &id in &ids {
        let queue = Arc::new(SampleQueue::new(QUEUE_SLOTS));
        demuxer.set_output_buffer_queue(id, queue.clone())?;
        queues.push((id, queue));
    }
    demuxer.start()?;

    let mut stats: BTreeMap<usize, SampleStats> = ids.iter().map(|&id| (id, SampleStats::default())).collect();
    let mut idle = Duration::ZERO;
    let poll = Duration::from_millis(20);
    while stats.values().any(|s| !s.eos) {
        let mut got = false;
        for (id, queue) in &queues {
            if let Some(sample) = queue.pop_timeout(poll) {
                if let Some(entry) = stats.get_mut(id) {
                    entry.record(&sample);
                }
                got = true;
            }
        }
        if got {
            idle = Duration::ZERO;
        } else {
            idle += poll * queues.len() as u32;
            if idle >= PUSH_IDLE_LIMIT {
                warn!("等待样本超时, 提前结束");
                break;
            }
        }
    }
    demuxer.stop()?;
    Ok(stats)
}

fn format_value(value: &MetaValue) -> String {
    match value {
        MetaValue::Int(v) => v.to_string(),
        MetaValue::Float(v) => format!("{v:.3}"),
        MetaValue::Str(v) => v.clone(),
        MetaValue::Bool(v) => v.to_string(),
        MetaValue::Bytes(v) => format!("<{} 字节>", v.len()),
    }
}

fn print_meta(meta: &Meta, indent: &str) {
    for (key, value) in meta.iter() {
        println!("{indent}{key:<20} {}", format_value(value));
    }
}

fn print_text(output: &ProbeOutput) {
    println!("[FORMAT]");
    println!("  input                {}", output.input);
    println!("  format               {}", output.format.as_deref().unwrap_or("unknown"));
    println!("  live                 {}", output.live);
    match output.duration_ms {
        Some(ms) => println!("  duration_ms          {ms}"),
        None => println!("  duration_ms          N/A"),
    }
    print_meta(&output.global, "  ");

    for track in &output.tracks {
        println!("[TRACK #{}] {} {}", track.index, track.kind, track.mime);
        print_meta(&track.meta, "  ");
    }

    if let Some(samples) = &output.samples {
        println!("[SAMPLES]");
        for (id, s) in samples {
            println!(
                "  #{id}: {} 个样本, {} 字节, 同步帧 {}, pts {:?}..{:?}, eos={}",
                s.count, s.bytes, s.sync_frames, s.first_pts, s.last_pts, s.eos
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_统计跳过_eos_样本() {
        let mut stats = SampleStats::default();
        stats.record(&Sample::from_slice(&[1, 2, 3, 4], 1000));
        stats.record(&Sample::from_slice(&[5, 6, 7, 8], 2000));
        stats.record(&Sample::eos(0));
        assert_eq!(stats.count, 2);
        assert_eq!(stats.bytes, 8);
        assert_eq!(stats.first_pts, Some(1000));
        assert_eq!(stats.last_pts, Some(2000));
        assert!(stats.eos);
    }

    #[test]
    fn test_元数据值格式化() {
        assert_eq!(format_value(&MetaValue::Int(42)), "42");
        assert_eq!(format_value(&MetaValue::Float(1.5)), "1.500");
        assert_eq!(format_value(&MetaValue::Bytes(vec![0; 3])), "<3 字节>");
    }

    #[test]
    fn test_命令行参数() {
        let cli = Cli::parse_from(["liu-probe", "a.wav", "--json", "--read-samples", "--push"]);
        assert!(cli.json && cli.read_samples && cli.push);
        assert_eq!(cli.log_level, "info");
        assert!(load_config(None).is_ok());
    }
}
