//! 日志系统.
//!
//! 库内部统一使用 `log` 门面输出, 这里负责把记录汇入 `tracing` 订阅器:
//! 控制台 (彩色) + 按天命名的日志文件 (非阻塞写入), 并由后台维护任务
//! 负责零点翻滚、历史压缩与过期清理.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod task;

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 文件日志级别 (EnvFilter 语法, 如 `info` 或 `liu_demux=debug`)
    #[serde(default = "default_level")]
    pub level: String,
    /// 控制台日志级别, 为空时不输出到控制台
    #[serde(default = "default_console_level")]
    pub console_level: String,
    pub directory: String,
    #[serde(default = "default_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_true")]
    pub compress_history: bool,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_console_level() -> String {
    "warn".to_string()
}

fn default_prefix() -> String {
    "liu".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> i64 {
    14
}

fn default_cleanup_interval() -> u64 {
    3600
}

impl LoggingConfig {
    /// 以默认参数写入指定目录
    pub fn with_directory(directory: impl Into<String>) -> Self {
        Self {
            level: default_level(),
            console_level: default_console_level(),
            directory: directory.into(),
            file_prefix: default_prefix(),
            retention_days: default_retention_days(),
            compress_history: true,
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }

    /// 当天的日志文件路径
    pub fn current_log_path(&self) -> PathBuf {
        daily_log_path(
            Path::new(&self.directory),
            &self.file_prefix,
            Local::now().date_naive(),
        )
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志订阅器.
///
/// 全局订阅器只能安装一次, 重复调用返回错误. `log` 宏产生的记录
/// 由 tracing-subscriber 自动桥接.
pub fn init(config: LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let reopen = Arc::new(AtomicBool::new(false));
    let writer = DailyFileWriter::open(
        Path::new(&config.directory),
        &config.file_prefix,
        Arc::clone(&reopen),
    )?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(LineFormatter { ansi: false })
        .with_filter(EnvFilter::try_new(&config.level).context("解析文件日志级别失败")?);

    let console_layer = if config.console_level.is_empty() {
        None
    } else {
        let filter = EnvFilter::try_new(&config.console_level).context("解析控制台日志级别失败")?;
        Some(
            fmt::Layer::default()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .event_format(LineFormatter { ansi: true })
                .with_filter(filter),
        )
    };

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("安装全局日志订阅器失败")?;
    LOG_GUARD.set(guard).ok();

    task::spawn_maintenance(config, reopen);
    Ok(())
}

/// 写入当天日志文件; 维护任务翻滚后置位 `reopen`, 下次写入时切换到新文件
struct DailyFileWriter {
    directory: PathBuf,
    prefix: String,
    reopen: Arc<AtomicBool>,
    file: File,
}

impl DailyFileWriter {
    fn open(directory: &Path, prefix: &str, reopen: Arc<AtomicBool>) -> Result<Self> {
        let path = daily_log_path(directory, prefix, Local::now().date_naive());
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            reopen,
            file: open_append(&path)?,
        })
    }

    fn switch_to_today(&mut self) -> std::io::Result<()> {
        let path = daily_log_path(&self.directory, &self.prefix, Local::now().date_naive());
        self.file = open_append(&path).map_err(std::io::Error::other)?;
        Ok(())
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.reopen.swap(false, Ordering::AcqRel) {
            self.switch_to_today()?;
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

/// `<prefix>.<YYYY-MM-DD>.log`
pub(crate) fn daily_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

/// 单行格式: `[MM-DD hh:mm:ss.mmm] LEVEL target > 字段`
struct LineFormatter {
    ansi: bool,
}

impl LineFormatter {
    fn level_color(level: &tracing::Level) -> &'static str {
        match *level {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        )?;
        if self.ansi {
            write!(writer, "{}{:5}\x1b[0m ", Self::level_color(meta.level()), meta.level())?;
        } else {
            write!(writer, "{:5} ", meta.level())?;
        }
        write!(writer, "{} > ", meta.target())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_按日期生成日志路径() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let path = daily_log_path(Path::new("logs"), "liu", date);
        assert_eq!(path, PathBuf::from("logs/liu.2026-03-09.log"));
    }

    #[test]
    fn test_配置默认值() {
        let config: LoggingConfig = serde_json::from_str(r#"{"directory":"logs"}"#).unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.console_level, "warn");
        assert_eq!(config.file_prefix, "liu");
        assert_eq!(config.retention_days, 14);
        assert!(config.compress_history);
    }

    #[test]
    fn test_写入器按标志切换文件() {
        let dir = tempfile::tempdir().unwrap();
        let reopen = Arc::new(AtomicBool::new(false));
        let mut writer = DailyFileWriter::open(dir.path(), "w", Arc::clone(&reopen)).unwrap();
        writer.write_all(b"first\n").unwrap();
        reopen.store(true, Ordering::Release);
        writer.write_all(b"second\n").unwrap();
        writer.flush().unwrap();
        assert!(!reopen.load(Ordering::Acquire));

        let path = daily_log_path(dir.path(), "w", Local::now().date_naive());
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("first") && text.contains("second"));
    }
}
