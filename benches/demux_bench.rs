//! Liu 解封装引擎性能基准测试.
//!
//! 覆盖拉模式缓存窗口读取、推模式数据打包器吞吐与 WAV 端到端读取.

use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use liu::core::Sample;
use liu::demux::stream::data_packer::DataPacker;
use liu::demux::stream::pull::PullReader;
use liu::demux::{DemuxerConfig, MediaDemuxer};
use liu::source::{MediaSource, Source};

const FILE_SIZE: usize = 1 << 20;
const CHUNK: usize = 4096;

/// 写入临时文件, 返回 (目录守卫, 路径)
fn temp_file(name: &str, data: &[u8]) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join(name);
    std::fs::write(&path, data).expect("写入临时文件失败");
    let path = path.to_string_lossy().to_string();
    (dir, path)
}

fn make_wav(frames: usize) -> Vec<u8> {
    let pcm: Vec<u8> = (0..frames).flat_map(|i| ((i % 512) as i16).to_le_bytes()).collect();
    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&44100u32.to_le_bytes());
    out.extend_from_slice(&88200u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
    out.extend_from_slice(&pcm);
    out
}

fn bench_pull_window(c: &mut Criterion) {
    let data: Vec<u8> = (0..FILE_SIZE).map(|i| (i % 251) as u8).collect();
    let (_dir, path) = temp_file("window.bin", &data);
    let source = Arc::new(Source::new(Arc::new(liu::default_source_registry())));
    source.set_source(&MediaSource::uri(path)).expect("打开文件失败");

    let mut group = c.benchmark_group("pull_window");
    group.throughput(Throughput::Bytes(FILE_SIZE as u64));
    group.bench_function("sequential_4k", |b| {
        b.iter(|| {
            let reader = PullReader::new(Arc::clone(&source));
            let mut offset = 0u64;
            while (offset as usize) < FILE_SIZE {
                let data = reader.get_range(offset, CHUNK).expect("读取失败");
                offset += data.len() as u64;
            }
            black_box(reader.backing_reads())
        });
    });
    group.bench_function("repeated_in_window", |b| {
        let reader = PullReader::new(Arc::clone(&source));
        b.iter(|| black_box(reader.get_range(black_box(1024), 512).expect("读取失败")));
    });
    group.finish();
}

fn bench_data_packer(c: &mut Criterion) {
    let block = vec![0x5Au8; CHUNK];
    let mut group = c.benchmark_group("data_packer");
    group.throughput(Throughput::Bytes(FILE_SIZE as u64));
    group.bench_function("push_then_get", |b| {
        b.iter(|| {
            let packer = DataPacker::new();
            let mut offset = 0u64;
            let mut taken = 0usize;
            while (offset as usize) < FILE_SIZE {
                packer.push_data(&block, offset);
                offset += CHUNK as u64;
                if let Some(data) = packer.get_range(CHUNK, 0, false, Duration::ZERO) {
                    taken += data.len();
                }
            }
            black_box(taken)
        });
    });
    group.finish();
}

fn bench_wav_read(c: &mut Criterion) {
    let frames = 44100 * 10;
    let (_dir, path) = temp_file("bench.wav", &make_wav(frames));
    let mut group = c.benchmark_group("wav_read");
    group.throughput(Throughput::Bytes((frames * 2) as u64));
    group.sample_size(20);
    group.bench_function("pull_10s_mono", |b| {
        b.iter(|| {
            let demuxer = MediaDemuxer::new(
                Arc::new(liu::default_source_registry()),
                Arc::new(liu::default_format_registry()),
                DemuxerConfig::default(),
            );
            demuxer.set_data_source(&MediaSource::uri(path.as_str())).expect("打开失败");
            demuxer.select_track(0).expect("选择轨道失败");
            let mut sample = Sample::with_capacity(8192);
            let mut bytes = 0usize;
            while demuxer.read_sample(0, &mut sample).is_ok() && !sample.is_eos() {
                bytes += sample.len();
            }
            black_box(bytes)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_pull_window, bench_data_packer, bench_wav_read);
criterion_main!(benches);
