//! 可观测性
//!
//! 进程启动时调用一次 [`init`]：先装日志订阅器，再按需启动 Prometheus 端点。
//! 业务代码只通过 [`metrics`] 中的记录函数上报，不直接拼指标名。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 写入日志与 `service_starts_total` 标签，通常由入口注入
    pub service_name: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    /// RUST_LOG 存在时被覆盖
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            metrics_enabled: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 持有指标端点任务，drop 时终止
pub struct ObservabilityGuard {
    metrics: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 不启动任何端点（测试或关闭指标时）
    pub fn empty() -> Self {
        Self { metrics: None }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.metrics.take() {
            handle.shutdown();
            info!("指标端点已停止");
        }
    }
}

pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        json_logs = config.json_logs,
        "可观测性已初始化"
    );

    Ok(ObservabilityGuard { metrics })
}
