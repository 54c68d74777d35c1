// 日志初始化
//
// 日志统一输出到 stderr, stdout 留给 `--json` 的运行结果。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// `RUST_LOG` 优先于命令行的 `--log-level`; ort 自身的日志只保留 warn 以上。
pub fn init(level: &str) {
    let filter_string = format!("{},ort=warn", level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_string));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    // 重复初始化(例如测试中)时忽略错误
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init();
}
