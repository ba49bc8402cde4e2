//! 端到端集成测试: 内置 WAV 插件在文件 (拉流) 与字节流 (推流) 上的完整管线.

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use liu::core::{LiuError, MediaType, Sample, SeekMode, tag};
use liu::demux::{DemuxerConfig, DemuxerEvent, MediaDemuxer, SampleQueue};
use liu::source::MediaSource;

use common::*;

const RATE: u32 = 8000;
/// 3 秒单声道
const FRAMES: usize = 24_000;

fn open(source: &MediaSource) -> (MediaDemuxer, Arc<EventLog>) {
    let demuxer = MediaDemuxer::new(
        Arc::new(liu::default_source_registry()),
        Arc::new(liu::default_format_registry()),
        DemuxerConfig::default(),
    );
    let events = Arc::new(EventLog::default());
    demuxer.set_event_receiver(events.clone());
    demuxer.set_data_source(source).expect("打开 WAV 失败");
    (demuxer, events)
}

/// 拉模式读完一条轨道, 返回 (样本数, 总字节数, 最后一个 pts)
fn read_all(demuxer: &MediaDemuxer, track_id: usize) -> (usize, usize, i64) {
    let mut sample = Sample::with_capacity(16 * 1024);
    let (mut count, mut bytes, mut last_pts) = (0, 0, 0);
    loop {
        match demuxer.read_sample(track_id, &mut sample) {
            Ok(()) if sample.is_eos() => break,
            Ok(()) => {
                count += 1;
                bytes += sample.len();
                last_pts = sample.pts;
            }
            Err(LiuError::Again) => continue,
            Err(e) => panic!("读取样本失败: {}", e),
        }
    }
    (count, bytes, last_pts)
}

#[test]
fn test_wav_文件拉模式() {
    let dir = tempfile::tempdir().unwrap();
    let pcm = sine_s16(RATE, 440.0, FRAMES, 1);
    let path = write_temp_wav(dir.path(), "tone.wav", &make_wav(&pcm, 1, RATE));
    let (demuxer, events) = open(&MediaSource::uri(path));

    assert_eq!(demuxer.format_name().as_deref(), Some("wav"));
    assert!(!demuxer.is_live());
    assert!(events.snapshot().is_empty());
    assert_eq!(demuxer.duration(), Some(3000));
    assert_eq!(demuxer.track_count(), 1);
    assert_eq!(demuxer.audio_track_id(), Some(0));
    assert_eq!(demuxer.video_track_id(), None);

    let track = &demuxer.stream_meta()[0];
    assert_eq!(track.media_type(), MediaType::Audio);
    assert_eq!(track.get_i64(tag::AUDIO_SAMPLE_RATE), Some(i64::from(RATE)));
    assert_eq!(track.get_i64(tag::AUDIO_CHANNEL_COUNT), Some(1));

    demuxer.select_track(0).unwrap();
    let (count, bytes, last_pts) = read_all(&demuxer, 0);
    assert_eq!(bytes, pcm.len());
    assert_eq!(count, FRAMES.div_ceil(1024));
    // 最后一个包从第 23 * 1024 帧开始
    assert_eq!(last_pts, 23 * 1024 * 1_000_000 / i64::from(RATE));
}

#[test]
fn test_wav_seek_后继续读取() {
    let dir = tempfile::tempdir().unwrap();
    let pcm = sine_s16(RATE, 440.0, FRAMES, 1);
    let path = write_temp_wav(dir.path(), "seek.wav", &make_wav(&pcm, 1, RATE));
    let (demuxer, _) = open(&MediaSource::uri(path));
    demuxer.select_track(0).unwrap();

    let (_, _, _) = read_all(&demuxer, 0);
    assert!(demuxer.track_status(0).unwrap().eos);

    let landed = demuxer.seek_to(1500, SeekMode::PreviousSync).unwrap();
    assert_eq!(landed, 1500);
    assert!(!demuxer.track_status(0).unwrap().eos);

    let mut sample = Sample::with_capacity(16 * 1024);
    demuxer.read_sample(0, &mut sample).unwrap();
    assert_eq!(sample.pts, 1_500_000);
    let (_, rest, _) = read_all(&demuxer, 0);
    assert_eq!(sample.len() + rest, pcm.len() / 2);
}

#[test]
fn test_wav_缓冲区不足() {
    let dir = tempfile::tempdir().unwrap();
    let pcm = sine_s16(RATE, 440.0, 4096, 2);
    let path = write_temp_wav(dir.path(), "stereo.wav", &make_wav(&pcm, 2, RATE));
    let (demuxer, _) = open(&MediaSource::uri(path));
    demuxer.select_track(0).unwrap();

    let mut small = Sample::with_capacity(100);
    assert!(matches!(
        demuxer.read_sample(0, &mut small),
        Err(LiuError::NoMemory(_))
    ));
    // 换更大的缓冲区后从同一位置继续
    let mut big = Sample::with_capacity(8192);
    demuxer.read_sample(0, &mut big).unwrap();
    assert_eq!(big.pts, 0);
    assert_eq!(big.len(), 1024 * 4);
}

#[test]
fn test_wav_文件推模式() {
    let dir = tempfile::tempdir().unwrap();
    let pcm = sine_s16(RATE, 220.0, FRAMES, 1);
    let path = write_temp_wav(dir.path(), "push.wav", &make_wav(&pcm, 1, RATE));
    let (demuxer, _) = open(&MediaSource::uri(path));

    let queue = Arc::new(SampleQueue::new(64));
    demuxer.set_output_buffer_queue(0, queue.clone()).unwrap();
    demuxer.start().unwrap();

    let mut bytes = 0;
    let mut eos = false;
    let ok = wait_until(Duration::from_secs(5), || {
        while let Some(sample) = queue.pop() {
            eos |= sample.is_eos();
            bytes += sample.len();
        }
        eos
    });
    assert!(ok, "推模式未到达流末尾");
    assert_eq!(bytes, pcm.len());
    demuxer.stop().unwrap();
}

#[test]
fn test_wav_字节流按直播读取() {
    let pcm = sine_s16(RATE, 330.0, FRAMES, 1);
    let wav = make_wav(&pcm, 1, RATE);
    let (demuxer, events) = open(&MediaSource::stream(Cursor::new(wav)));

    assert!(demuxer.is_live());
    assert_eq!(events.snapshot(), vec![DemuxerEvent::IsLiveStream]);
    assert_eq!(demuxer.format_name().as_deref(), Some("wav"));

    demuxer.select_track(0).unwrap();
    assert!(demuxer.seek_to(1000, SeekMode::PreviousSync).is_err());

    let (_, bytes, _) = read_all(&demuxer, 0);
    assert_eq!(bytes, pcm.len());
}
