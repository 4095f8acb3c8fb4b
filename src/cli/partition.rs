//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区维护命令的实现。
//!
//! 每个命令分为两层：外层解析配置并构建管理器工厂，`*_with` 函数基于工厂执行。
//! 失败时返回错误，由进程以状态码 1 退出。

use crate::cli::{AddArgs, CheckArgs, CleanupArgs};
use crate::config::Config;
use crate::database::{CleanupSummary, DbEngine, PartitionDescriptor, RetentionPolicy, WeekKey};
use crate::error::PartitionError;
use crate::manager::{CheckReport, PartitionManagerFactory, StepOutcome};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", output);
    Ok(())
}

#[derive(Serialize)]
struct AddOutput<'a> {
    engine: DbEngine,
    week: String,
    partition: &'a str,
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    engine: DbEngine,
    table: &'a str,
    partitions: &'a [PartitionDescriptor],
}

#[derive(Serialize)]
struct FailureOutput<'a> {
    status: &'static str,
    operation: &'a str,
    error: String,
}

/// 输出失败信息并生成退出错误
///
/// JSON 模式下在标准输出打印错误对象，否则在标准错误打印 `❌` 行
fn failure(json: bool, operation: &str, message: &str, error: &PartitionError) -> anyhow::Error {
    if json {
        let output = FailureOutput {
            status: "failed",
            operation,
            error: error.to_string(),
        };
        if let Err(e) = print_json(&output) {
            eprintln!("❌ {}: {} ({})", message, error, e);
        }
    } else {
        eprintln!("❌ {}: {}", message, error);
    }
    anyhow!("{} failed", operation)
}

/// `add <year> <week>`
///
/// 周号校验先于加载配置，非法参数不会触发任何连接
pub async fn add(
    load_config: impl FnOnce() -> Result<Config>,
    engine: DbEngine,
    args: &AddArgs,
    json: bool,
) -> Result<()> {
    let week = WeekKey::new(args.year, args.week)
        .with_context(|| format!("Invalid week {}-W{:02}", args.year, args.week))?;
    let config = load_config()?;
    let factory = PartitionManagerFactory::from_config(&config, engine)?;
    add_with(&factory, week, json).await
}

pub async fn add_with(factory: &PartitionManagerFactory, week: WeekKey, json: bool) -> Result<()> {
    let manager = factory.create();

    match manager
        .with_session(move |m| Box::pin(m.add_weekly_partition(week)))
        .await
    {
        Ok(partition) => {
            if json {
                print_json(&AddOutput {
                    engine: factory.engine(),
                    week: week.to_string(),
                    partition: &partition,
                })
            } else {
                println!("✅ Partition {} added for {}", partition, week);
                Ok(())
            }
        }
        Err(e) => Err(failure(
            json,
            "add",
            &format!("Failed to add partition for {}", week),
            &e,
        )),
    }
}

pub async fn cleanup(config: &Config, engine: DbEngine, args: &CleanupArgs, json: bool) -> Result<()> {
    let policy = config.retention(args.keep_weeks)?;
    let factory = PartitionManagerFactory::from_config(config, engine)?;
    cleanup_with(&factory, policy, json).await
}

pub async fn cleanup_with(
    factory: &PartitionManagerFactory,
    policy: RetentionPolicy,
    json: bool,
) -> Result<()> {
    let manager = factory.create();

    match manager
        .with_session(move |m| Box::pin(m.drop_old_partitions(policy)))
        .await
    {
        Ok(summary) => {
            if json {
                print_json(&summary)
            } else {
                print_cleanup(&summary);
                Ok(())
            }
        }
        Err(e) => Err(failure(json, "cleanup", "Partition cleanup failed", &e)),
    }
}

pub async fn info(config: &Config, engine: DbEngine, json: bool) -> Result<()> {
    let factory = PartitionManagerFactory::from_config(config, engine)?;
    info_with(&factory, json).await
}

pub async fn info_with(factory: &PartitionManagerFactory, json: bool) -> Result<()> {
    let manager = factory.create();

    let partitions = manager
        .with_session(|m| Box::pin(m.get_partition_info()))
        .await
        .map_err(|e| failure(json, "info", "Failed to read partition info", &e))?;

    if json {
        return print_json(&InfoOutput {
            engine: factory.engine(),
            table: manager.table(),
            partitions: &partitions,
        });
    }

    println!("Partitions of {} ({}):", manager.table(), factory.engine());
    print_partitions(&partitions);
    Ok(())
}

/// `init` 与 `check` 共用：检查并修复
pub async fn check(
    config: &Config,
    engine: DbEngine,
    args: &CheckArgs,
    json: bool,
    initializing: bool,
) -> Result<()> {
    let policy = config.retention(args.keep_weeks)?;
    let factory = PartitionManagerFactory::from_config(config, engine)?;
    check_with(&factory, policy, json, initializing).await
}

/// 只有连接失败或分区查询失败时返回错误；清理与添加的失败只体现在输出中
pub async fn check_with(
    factory: &PartitionManagerFactory,
    policy: RetentionPolicy,
    json: bool,
    initializing: bool,
) -> Result<()> {
    let manager = factory.create();

    if initializing && !json {
        println!(
            "Initializing partitions of {} ({})...",
            manager.table(),
            factory.engine()
        );
    }

    let report = manager
        .with_session(move |m| Box::pin(m.check_and_repair_partitions(policy)))
        .await
        .map_err(|e| failure(json, "check", "Partition check failed", &e))?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_partitions(partitions: &[PartitionDescriptor]) {
    if partitions.is_empty() {
        println!("  (no partitions)");
        return;
    }
    for partition in partitions {
        println!(
            "  - {}: {} rows, {:.2}MB",
            partition.name,
            partition.row_count,
            partition.data_size_mb()
        );
    }
}

fn print_cleanup(summary: &CleanupSummary) {
    if summary.delegated {
        println!(
            "✅ Old partitions cleaned up (keeping {} weeks)",
            summary.keep_weeks
        );
    } else if summary.dropped.is_empty() {
        println!(
            "✅ No partitions older than {} (keeping {} weeks)",
            summary.cutoff, summary.keep_weeks
        );
    } else {
        println!(
            "✅ Dropped {} partitions older than {}: {}",
            summary.dropped.len(),
            summary.cutoff,
            summary.dropped.join(", ")
        );
    }
}

fn print_report(report: &CheckReport) {
    println!("Found {} partitions:", report.partitions.len());
    print_partitions(&report.partitions);

    match &report.cleanup {
        StepOutcome::Succeeded { value } => print_cleanup(value),
        StepOutcome::Failed { error } => println!("⚠️  Partition cleanup failed: {}", error),
    }

    match &report.added {
        StepOutcome::Succeeded { value } => println!("✅ Next week's partition {} is in place", value),
        StepOutcome::Failed { error } => {
            println!("⚠️  Adding next week's partition failed: {}", error)
        }
    }

    if report.is_healthy() {
        println!("✅ Partition check completed");
    } else {
        println!("⚠️  Partition check completed with warnings");
    }
}
