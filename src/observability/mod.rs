//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，可通过 RUST_LOG 覆盖；日志写到 stderr，stdout 留给答案输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局订阅器；`json` 为 true 时输出 JSON 行。重复调用无副作用。
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (plain, json_layer) = if json {
        (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json_layer)
        .try_init();
}
