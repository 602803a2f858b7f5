//! 日志订阅器
//!
//! 开发环境输出带颜色的单行日志；生产环境输出 JSON，并在 span 关闭时记录耗时，
//! 便于按 `order_no`、`payment_no` 等字段检索一次回调的完整链路。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    } else {
        fmt::layer().compact().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(&config.log_level))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// 集成测试使用，输出交给测试框架捕获；重复调用无副作用
pub fn init_for_test() {
    let _ = tracing_subscriber::registry()
        .with(build_filter("debug,sqlx=warn"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
