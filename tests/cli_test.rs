//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分区维护命令测试：退出状态与执行顺序

mod common;

use common::*;
use sea_orm::DatabaseBackend;
use std::cell::Cell;
use std::io::Write;
use std::process::Command;
use std::sync::atomic::Ordering;
use weekpart::cli::partition;
use weekpart::cli::AddArgs;
use weekpart::database::{RetentionPolicy, WeekKey};

fn manage_partitions(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_manage-partitions"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run manage-partitions")
}

/// 非法周号在加载配置之前被拒绝
#[tokio::test]
async fn test_add_rejects_invalid_week_before_loading_config() {
    let loaded = Cell::new(false);
    let args = AddArgs {
        year: 2025,
        week: 53,
    };

    let result = partition::add(
        || {
            loaded.set(true);
            Err(anyhow::anyhow!("configuration must not be read"))
        },
        weekpart::DbEngine::MariaDb,
        &args,
        false,
    )
    .await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("2025-W53"), "{:#}", err);
    assert!(!loaded.get());
}

/// 合法周号才会加载配置
#[tokio::test]
async fn test_add_loads_config_for_valid_week() {
    let loaded = Cell::new(false);
    let args = AddArgs {
        year: 2026,
        week: 53,
    };

    let result = partition::add(
        || {
            loaded.set(true);
            Err(anyhow::anyhow!("no configuration"))
        },
        weekpart::DbEngine::MariaDb,
        &args,
        false,
    )
    .await;

    assert!(result.is_err());
    assert!(loaded.get());
}

/// 添加成功时关闭连接
#[tokio::test]
async fn test_add_with_success() {
    let backend = ScriptedBackend::new();
    let connector = CountingConnector::new(DatabaseBackend::MySql);
    let factory = factory_with(backend.clone(), connector.clone());

    partition::add_with(&factory, WeekKey::new(2025, 3).unwrap(), false)
        .await
        .unwrap();

    assert_eq!(backend.calls(), vec!["add:2025-W03"]);
    assert_eq!(connector.closed(), 1);
}

/// 添加失败时命令返回错误
#[tokio::test]
async fn test_add_with_failure_is_an_error() {
    let backend = ScriptedBackend::new();
    backend.fail_add.store(true, Ordering::SeqCst);
    let connector = CountingConnector::new(DatabaseBackend::MySql);
    let factory = factory_with(backend, connector.clone());

    let result = partition::add_with(&factory, WeekKey::new(2099, 1).unwrap(), true).await;

    assert!(result.is_err());
    assert_eq!(connector.closed(), 1);
}

/// 清理失败时命令返回错误
#[tokio::test]
async fn test_cleanup_with_failure_is_an_error() {
    let backend = ScriptedBackend::new();
    backend.fail_cleanup.store(true, Ordering::SeqCst);
    let factory = factory_with(backend, CountingConnector::new(DatabaseBackend::MySql));

    let result = partition::cleanup_with(&factory, RetentionPolicy::new(4).unwrap(), false).await;
    assert!(result.is_err());
}

/// 连接失败时 info 返回错误
#[tokio::test]
async fn test_info_with_unreachable_database_is_an_error() {
    let backend = ScriptedBackend::new();
    let factory = factory_with(
        backend.clone(),
        CountingConnector::unreachable(DatabaseBackend::MySql),
    );

    assert!(partition::info_with(&factory, false).await.is_err());
    assert!(backend.calls().is_empty());
}

/// 清理与添加都失败时 check 仍然成功退出
#[tokio::test]
async fn test_check_with_partial_failures_succeeds() {
    let backend = ScriptedBackend::new();
    backend.fail_cleanup.store(true, Ordering::SeqCst);
    backend.fail_add.store(true, Ordering::SeqCst);
    let connector = CountingConnector::new(DatabaseBackend::MySql);
    let factory = factory_with(backend.clone(), connector.clone());
    let policy = RetentionPolicy::new(2).unwrap();

    partition::check_with(&factory, policy, false, true)
        .await
        .unwrap();
    partition::check_with(&factory, policy, true, false)
        .await
        .unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[0], "info");
    assert_eq!(calls[1], "cleanup:2");
    assert!(calls[2].starts_with("add:"));
    assert_eq!(connector.closed(), 2);
}

/// 分区查询失败时 check 以错误退出
#[tokio::test]
async fn test_check_with_inspection_failure_is_an_error() {
    let backend = ScriptedBackend::new();
    backend.fail_info.store(true, Ordering::SeqCst);
    let connector = CountingConnector::new(DatabaseBackend::MySql);
    let factory = factory_with(backend.clone(), connector.clone());

    let result = partition::check_with(&factory, RetentionPolicy::new(1).unwrap(), false, false).await;

    assert!(result.is_err());
    assert_eq!(backend.calls(), vec!["info"]);
    assert_eq!(connector.closed(), 1);
}

/// 非法周号：进程以状态码 1 退出
#[test]
fn test_binary_invalid_week_exits_with_one() {
    let output = manage_partitions(&["add", "2025", "54"]);
    assert_eq!(output.status.code(), Some(1));
}

/// 缺少参数：进程以状态码 1 退出（而不是 clap 默认的 2）
#[test]
fn test_binary_usage_error_exits_with_one() {
    let output = manage_partitions(&["add", "2025"]);
    assert_eq!(output.status.code(), Some(1));

    let output = manage_partitions(&["--db-type", "oracle", "info"]);
    assert_eq!(output.status.code(), Some(1));
}

/// 帮助、版本与 schedule stop 以状态码 0 退出
#[test]
fn test_binary_informational_commands_exit_with_zero() {
    assert_eq!(manage_partitions(&["--help"]).status.code(), Some(0));
    assert_eq!(manage_partitions(&["--version"]).status.code(), Some(0));
    assert_eq!(manage_partitions(&["schedule", "stop"]).status.code(), Some(0));
}

/// 未配置保留周数时，check 在连接之前失败
#[test]
fn test_binary_check_without_retention_exits_with_one() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [mariadb]
        host = "127.0.0.1"
        port = 1
        user = "root"
        database = "client_util_app"
    "#
    )
    .unwrap();
    let path = file.path().to_str().unwrap();

    let output = manage_partitions(&["--config", path, "check"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("retention"), "{}", stderr);

    let output = manage_partitions(&["--config", path, "cleanup", "0"]);
    assert_eq!(output.status.code(), Some(1));
}
