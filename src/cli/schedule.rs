//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了调度命令的实现。

use crate::config::Config;
use crate::database::DbEngine;
use crate::manager::PartitionManagerFactory;
use crate::metrics::get_metrics_string;
use crate::scheduler::PartitionScheduler;
use anyhow::{Context, Result};
use tracing::{info, warn};

/// 在前台运行调度器，直到收到 Ctrl-C
pub async fn start(
    config: &Config,
    engine: DbEngine,
    keep_weeks: Option<u32>,
    run_now: bool,
) -> Result<()> {
    let policy = config.retention(keep_weeks)?;
    let factory = PartitionManagerFactory::from_config(config, engine)?;
    let scheduler = PartitionScheduler::new(factory, policy, &config.scheduler);

    if run_now {
        if let Err(e) = scheduler.run_weekly_now().await {
            warn!("Immediate weekly run failed: {}", e);
        }
        if let Err(e) = scheduler.run_daily_now().await {
            warn!("Immediate daily run failed: {}", e);
        }
    }

    scheduler.start();
    println!(
        "✅ Partition scheduler started for {} (weekly: {}, daily: {}, keeping {} weeks)",
        engine,
        config.scheduler.weekly_schedule(),
        config.scheduler.daily_schedule(),
        policy.keep_weeks()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    scheduler.shutdown().await;
    info!("Scheduler metrics:\n{}", get_metrics_string());
    println!("✅ Partition scheduler stopped");
    Ok(())
}

pub fn stop() {
    println!("ℹ️  The scheduler runs in the foreground of `manage-partitions schedule start`.");
    println!("   Stop it by interrupting that process (Ctrl-C or SIGINT); running jobs finish first.");
}
