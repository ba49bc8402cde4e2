//! 日志系统集成测试.
//!
//! 全局订阅器只能安装一次, 涉及 `init()` 的测试放在同一个用例里并标记 `#[ignore]`,
//! 需要单独运行: `cargo test --test logging_system -- --ignored`

use std::fs;
use std::time::Duration;

use liu::logging::{LoggingConfig, init};

#[tokio::test]
#[ignore]
async fn test_日志写入当天文件并按级别过滤() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        level: "info".to_string(),
        console_level: String::new(),
        file_prefix: "liu-test".to_string(),
        compress_history: false,
        ..LoggingConfig::with_directory(dir.path().to_string_lossy().to_string())
    };
    let log_path = config.current_log_path();

    init(config.clone()).expect("日志初始化失败");
    assert!(init(config).is_err(), "重复初始化应当失败");

    tracing::error!("错误日志_ERROR_MSG");
    tracing::info!("信息日志_INFO_MSG");
    tracing::debug!("调试日志_DEBUG_MSG");
    // 库代码使用 log 门面, 同样写入文件
    log::warn!(target: "liu_demux", "门面日志_LOG_MSG");

    tokio::time::sleep(Duration::from_millis(300)).await;

    let content = fs::read_to_string(&log_path)
        .unwrap_or_else(|e| panic!("读取日志文件失败: {:?}, 错误: {}", log_path, e));
    assert!(content.contains("错误日志_ERROR_MSG"));
    assert!(content.contains("信息日志_INFO_MSG"));
    assert!(content.contains("门面日志_LOG_MSG"));
    assert!(content.contains("liu_demux"));
    assert!(!content.contains("调试日志_DEBUG_MSG"), "debug 日志应该被过滤");
    assert!(content.contains("INFO"));
}

#[test]
fn test_日志文件命名() {
    let config = LoggingConfig::with_directory("logs");
    let today = chrono::Local::now().date_naive();
    let expected = format!("logs/liu.{}.log", today.format("%Y-%m-%d"));
    assert_eq!(config.current_log_path().to_string_lossy(), expected);
}

#[test]
fn test_从_json_读取配置() {
    let config: LoggingConfig = serde_json::from_str(
        r#"{"level":"debug","directory":"/tmp/liu","retention_days":3,"compress_history":false}"#,
    )
    .unwrap();
    assert_eq!(config.level, "debug");
    assert_eq!(config.retention_days, 3);
    assert!(!config.compress_history);
    assert_eq!(config.cleanup_interval_seconds, 3600);
}
