//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志与链路追踪的初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// 初始化 tracing
///
/// 日志输出到 stderr，使 stdout 只承载命令结果（便于 `--json` 输出被管道消费）。
/// `RUST_LOG` 存在时覆盖 `default_filter`。
///
/// # 参数
///
/// * `service_name` - 服务名称，用作 tracer 名称
/// * `default_filter` - 未设置 `RUST_LOG` 时使用的过滤规则
pub fn init_tracing(service_name: &str, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // 未配置 exporter，span 仅在进程内传播
    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    // 重复初始化时保留先前的 subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);
}
