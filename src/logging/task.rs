//! 日志维护任务: 零点翻滚, 压缩历史文件, 删除过期文件.

use super::{LoggingConfig, daily_log_path};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{error, warn};

/// 启动维护任务.
///
/// 调用方处于 tokio 运行时中时直接挂到该运行时; 否则 (例如同步 CLI)
/// 起一个后台线程运行单线程运行时.
pub(super) fn spawn_maintenance(config: LoggingConfig, reopen: Arc<AtomicBool>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(maintenance_loop(config, reopen));
        return;
    }

    let spawned = std::thread::Builder::new()
        .name("liu-log-maintenance".into())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(rt) => rt.block_on(maintenance_loop(config, reopen)),
                Err(err) => error!("创建日志维护运行时失败: {}", err),
            }
        });
    if let Err(err) = spawned {
        warn!("启动日志维护线程失败, 不再自动翻滚: {}", err);
    }
}

async fn maintenance_loop(config: LoggingConfig, reopen: Arc<AtomicBool>) {
    let period = Duration::from_secs(config.cleanup_interval_seconds.max(1));
    let mut cleanup_tick = tokio::time::interval(period);

    if let Err(err) = sweep(&config, Local::now().date_naive()) {
        error!("启动时清理日志失败: {}", err);
    }

    let mut rollover_at = next_midnight(Local::now());
    loop {
        tokio::select! {
            _ = cleanup_tick.tick() => {
                if let Err(err) = sweep(&config, Local::now().date_naive()) {
                    error!("清理日志失败: {}", err);
                }
            }
            _ = tokio::time::sleep_until(rollover_at) => {
                // 新文件由写入器在下一次写入时创建
                reopen.store(true, Ordering::Release);
                if let Err(err) = sweep(&config, Local::now().date_naive()) {
                    error!("翻滚后清理日志失败: {}", err);
                }
                rollover_at = next_midnight(Local::now());
            }
        }
    }
}

/// 删除早于保留期的文件, 并按需压缩今天以前的 `.log`
fn sweep(config: &LoggingConfig, today: NaiveDate) -> Result<()> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(());
    }
    let cutoff = today - ChronoDuration::days(config.retention_days);

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((date, compressed)) = parse_log_name(&name, &config.file_prefix) else {
            continue;
        };
        let path = entry.path();

        if date < cutoff {
            if let Err(err) = fs::remove_file(&path) {
                warn!("删除过期日志失败, path={}: {}", path.display(), err);
            }
        } else if config.compress_history && !compressed && date < today {
            if let Err(err) = gzip_file(&path) {
                warn!("压缩日志失败: {}", err);
            }
        }
    }
    Ok(())
}

/// 压缩为 `<name>.gz` 并删除原文件; 目标已存在时跳过
fn gzip_file(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(());
    }

    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path).with_context(|| format!("删除已压缩日志失败, path={}", path.display()))
}

/// 解析 `<prefix>.<date>.log[.gz]`, 返回日期与是否已压缩
fn parse_log_name(name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (date_part, compressed) = match rest.strip_suffix(".log.gz") {
        Some(date_part) => (date_part, true),
        None => (rest.strip_suffix(".log")?, false),
    };
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date, compressed))
}

/// 下一个本地零点对应的 tokio 时刻; 时区换算失败时一小时后重试
fn next_midnight(now: DateTime<Local>) -> tokio::time::Instant {
    let fallback = tokio::time::Instant::now() + Duration::from_secs(3600);
    let Some(midnight) = (now.date_naive() + ChronoDuration::days(1)).and_hms_opt(0, 0, 0) else {
        return fallback;
    };
    let Some(local) = Local.from_local_datetime(&midnight).earliest() else {
        return fallback;
    };
    let wait = SystemTime::from(local.with_timezone(&Utc))
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    tokio::time::Instant::now() + wait
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn config(dir: &Path) -> LoggingConfig {
        LoggingConfig {
            retention_days: 3,
            ..LoggingConfig::with_directory(dir.to_string_lossy().to_string())
        }
    }

    #[test]
    fn test_解析日志文件名() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 6).unwrap();
        assert_eq!(parse_log_name("liu.2026-02-06.log", "liu"), Some((date, false)));
        assert_eq!(parse_log_name("liu.2026-02-06.log.gz", "liu"), Some((date, true)));
        assert_eq!(parse_log_name("liu.log", "liu"), None);
        assert_eq!(parse_log_name("other.2026-02-06.log", "liu"), None);
        assert_eq!(parse_log_name("liu.2026-2-6.log", "liu"), None);
    }

    #[test]
    fn test_清理过期并压缩历史() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();

        let expired = daily_log_path(dir.path(), "liu", today - ChronoDuration::days(5));
        let history = daily_log_path(dir.path(), "liu", today - ChronoDuration::days(1));
        let current = daily_log_path(dir.path(), "liu", today);
        fs::write(&expired, b"old").unwrap();
        fs::write(&history, b"yesterday").unwrap();
        fs::write(&current, b"today").unwrap();

        sweep(&cfg, today).unwrap();

        assert!(!expired.exists());
        assert!(!history.exists());
        assert!(current.exists());

        let gz = PathBuf::from(format!("{}.gz", history.display()));
        let mut text = String::new();
        flate2::read::GzDecoder::new(File::open(gz).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "yesterday");
    }

    #[test]
    fn test_关闭压缩时保留原文件() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            compress_history: false,
            ..config(dir.path())
        };
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        let history = daily_log_path(dir.path(), "liu", today - ChronoDuration::days(1));
        fs::write(&history, b"x").unwrap();

        sweep(&cfg, today).unwrap();
        assert!(history.exists());
    }
}
