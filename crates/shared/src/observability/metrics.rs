//! 交易指标
//!
//! 记录函数在未安装 recorder 时为 no-op，单元测试无需初始化。
//! `/metrics` 与 `/health` 由独立端口上的 axum 服务暴露。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

pub struct MetricsHandle {
    server: JoinHandle<()>,
}

impl MetricsHandle {
    pub fn shutdown(self) {
        self.server.abort();
    }
}

pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    metrics::counter!("service_starts_total", "service" => config.service_name.clone()).increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = serve(addr, handle).await?;
    Ok(MetricsHandle { server })
}

fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders created by source and transaction type");
    metrics::describe_counter!("order_transitions_total", "Order status transitions by target status");
    metrics::describe_counter!("payment_callbacks_total", "Payment gateway callbacks by outcome");
    metrics::describe_histogram!(
        "payment_callback_duration_seconds",
        "Payment callback handling duration in seconds"
    );
    metrics::describe_counter!("payments_closed_total", "Expired payments closed by sweep");
    metrics::describe_counter!("refunds_total", "Refund workflow transitions by status");
    metrics::describe_counter!("hook_deliveries_total", "Order event hook deliveries by handler and outcome");
    metrics::describe_gauge!("worker_last_run_timestamp", "Unix timestamp of the last worker loop");
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) -> Result<JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "指标端点已启动");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标端点异常退出");
        }
    }))
}

/// `source`: direct / cart
#[inline]
pub fn record_order_created(source: &str, transaction_type: &str) {
    metrics::counter!(
        "orders_created_total",
        "source" => source.to_string(),
        "transaction_type" => transaction_type.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_order_transition(to_status: &str) {
    metrics::counter!("order_transitions_total", "status" => to_status.to_string()).increment(1);
}

/// 回调结果与处理耗时
#[inline]
pub fn record_payment_callback(outcome: &str, duration_secs: f64) {
    metrics::counter!("payment_callbacks_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("payment_callback_duration_seconds").record(duration_secs);
}

#[inline]
pub fn record_payments_closed(count: u64) {
    metrics::counter!("payments_closed_total").increment(count);
}

#[inline]
pub fn record_refund(status: &str) {
    metrics::counter!("refunds_total", "status" => status.to_string()).increment(1);
}

#[inline]
pub fn record_hook_delivery(handler: &str, outcome: &str) {
    metrics::counter!(
        "hook_deliveries_total",
        "handler" => handler.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 用于告警：长时间未更新说明后台任务卡住
#[inline]
pub fn set_worker_last_run(worker: &str) {
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string())
        .set(chrono::Utc::now().timestamp() as f64);
}
