//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区管理器，负责连接生命周期与分区维护流程的编排。

use crate::config::Config;
use crate::database::{
    build_connection_url, create_backend, CleanupSummary, Connector, DbConnector, DbEngine,
    PartitionBackend, PartitionDescriptor, RetentionPolicy, SqlSession, WeekKey,
};
use crate::error::{PartitionError, Result};
use crate::metrics::GLOBAL_METRICS;
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// 单个步骤的执行结果
///
/// 组合流程中非致命步骤的失败以值的形式保留，流程继续执行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome<T> {
    Succeeded { value: T },
    Failed { error: String },
}

impl<T> StepOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StepOutcome::Succeeded { value } => Some(value),
            StepOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StepOutcome::Succeeded { .. } => None,
            StepOutcome::Failed { error } => Some(error),
        }
    }
}

impl<T> From<Result<T>> for StepOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => StepOutcome::Succeeded { value },
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// 检查与修复的组合结果
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// 修复前的分区快照
    pub partitions: Vec<PartitionDescriptor>,
    pub cleanup: StepOutcome<CleanupSummary>,
    /// 下周分区名称
    pub added: StepOutcome<String>,
}

impl CheckReport {
    /// 清理与添加均成功
    pub fn is_healthy(&self) -> bool {
        self.cleanup.is_success() && self.added.is_success()
    }
}

/// 分区管理器
///
/// 每次CLI调用或调度执行创建一个实例，持有一条独立连接。
/// 连接前调用任何操作都返回 `PartitionError::NotConnected`。
pub struct PartitionManager {
    backend: Arc<dyn PartitionBackend>,
    connector: Arc<dyn Connector>,
    statement_timeout: Duration,
    session: Mutex<Option<SqlSession>>,
}

impl PartitionManager {
    pub fn new(
        backend: Arc<dyn PartitionBackend>,
        connector: Arc<dyn Connector>,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            connector,
            statement_timeout,
            session: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> DbEngine {
        self.backend.engine()
    }

    pub fn table(&self) -> &str {
        self.backend.table()
    }

    /// 建立连接
    ///
    /// 连接失败直接返回错误，不做捕获；已连接时不重复建立
    #[instrument(skip(self), level = "info", fields(engine = %self.engine()))]
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let connection = self.connector.open().await?;
        *guard = Some(SqlSession::new(connection, self.statement_timeout));
        info!("Partition manager connected to {}", self.connector.describe());
        Ok(())
    }

    /// 断开连接
    ///
    /// 断开失败只记录日志，不向上传播
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            match self.connector.close(session.into_connection()).await {
                Ok(()) => info!("Partition manager disconnected from {}", self.engine()),
                Err(e) => warn!("Failed to close {} connection: {}", self.engine(), e),
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// 在连接作用域内执行操作
    ///
    /// connect → op → disconnect。op 返回错误或 panic 时同样先断开连接，
    /// panic 在连接释放后继续向上传播
    pub async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a PartitionManager) -> BoxFuture<'a, Result<T>>,
    {
        self.connect().await?;
        let outcome = AssertUnwindSafe(op(self)).catch_unwind().await;
        self.disconnect().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => {
                error!("Partition operation on {} panicked, connection released", self.table());
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// 添加指定周的分区
    #[instrument(skip(self), level = "info", fields(engine = %self.engine()))]
    pub async fn add_weekly_partition(&self, week: WeekKey) -> Result<String> {
        let start = Instant::now();
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(PartitionError::NotConnected)?;
        let result = self.backend.add_weekly_partition(session, week).await;
        drop(guard);
        self.record("add", start, result.is_ok());
        result
    }

    /// 添加包含指定日期的周分区
    pub async fn add_partition_for_date(&self, date: NaiveDate) -> Result<String> {
        self.add_weekly_partition(WeekKey::of(date)).await
    }

    /// 添加下周分区
    ///
    /// 始终创建一周之后所在周的分区，当前周的分区由上一次执行负责
    pub async fn auto_manage_partitions(&self) -> Result<String> {
        self.auto_manage_partitions_at(Local::now().date_naive()).await
    }

    pub async fn auto_manage_partitions_at(&self, today: NaiveDate) -> Result<String> {
        let target = today + ChronoDuration::days(7);
        info!(
            "Ensuring partition for next week {} (target date {})",
            WeekKey::of(target),
            target
        );
        self.add_partition_for_date(target).await
    }

    /// 删除超出保留窗口的分区
    pub async fn drop_old_partitions(&self, policy: RetentionPolicy) -> Result<CleanupSummary> {
        self.drop_old_partitions_at(policy, Local::now().date_naive())
            .await
    }

    #[instrument(skip(self), level = "info", fields(engine = %self.engine()))]
    pub async fn drop_old_partitions_at(
        &self,
        policy: RetentionPolicy,
        today: NaiveDate,
    ) -> Result<CleanupSummary> {
        let start = Instant::now();
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(PartitionError::NotConnected)?;
        let result = self
            .backend
            .drop_old_partitions(session, policy, today)
            .await;
        drop(guard);
        self.record("cleanup", start, result.is_ok());
        result
    }

    /// 查询分区信息
    #[instrument(skip(self), level = "info", fields(engine = %self.engine()))]
    pub async fn get_partition_info(&self) -> Result<Vec<PartitionDescriptor>> {
        let start = Instant::now();
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(PartitionError::NotConnected)?;
        let result = self.backend.get_partition_info(session).await;
        drop(guard);
        self.record("info", start, result.is_ok());
        if let Ok(partitions) = &result {
            GLOBAL_METRICS.set_partition_count(self.table(), partitions.len());
        }
        result
    }

    /// 检查并修复分区
    ///
    /// 依次执行：查询分区（失败即中止）→ 清理过期分区 → 添加下周分区。
    /// 清理与添加失败只记录警告，结果保留在报告中。
    pub async fn check_and_repair_partitions(&self, policy: RetentionPolicy) -> Result<CheckReport> {
        self.check_and_repair_partitions_at(policy, Local::now().date_naive())
            .await
    }

    #[instrument(skip(self), level = "info", fields(engine = %self.engine(), table = %self.table()))]
    pub async fn check_and_repair_partitions_at(
        &self,
        policy: RetentionPolicy,
        today: NaiveDate,
    ) -> Result<CheckReport> {
        let partitions = match self.get_partition_info().await {
            Ok(partitions) => partitions,
            Err(PartitionError::NotConnected) => return Err(PartitionError::NotConnected),
            Err(e) => {
                GLOBAL_METRICS.record_operation(self.engine().as_str(), "check", false);
                return Err(PartitionError::Inspection(e.to_string()));
            }
        };
        info!(
            "Found {} partitions on {}",
            partitions.len(),
            self.table()
        );

        let cleanup = StepOutcome::from(self.drop_old_partitions_at(policy, today).await);
        if let Some(error) = cleanup.error() {
            warn!("Partition cleanup failed, continuing: {}", error);
        }

        let added = StepOutcome::from(self.auto_manage_partitions_at(today).await);
        if let Some(error) = added.error() {
            warn!("Adding next week's partition failed, continuing: {}", error);
        }

        let report = CheckReport {
            partitions,
            cleanup,
            added,
        };
        GLOBAL_METRICS.record_operation(self.engine().as_str(), "check", report.is_healthy());
        Ok(report)
    }

    fn record(&self, op: &str, start: Instant, success: bool) {
        let engine = self.engine();
        GLOBAL_METRICS.record_operation(engine.as_str(), op, success);
        GLOBAL_METRICS.record_duration(engine.as_str(), op, start.elapsed().as_secs_f64());
    }
}

/// 分区管理器工厂
///
/// 调度器每次执行都通过工厂创建新的管理器，从而获得独立连接
#[derive(Clone)]
pub struct PartitionManagerFactory {
    backend: Arc<dyn PartitionBackend>,
    connector: Arc<dyn Connector>,
    statement_timeout: Duration,
}

impl PartitionManagerFactory {
    pub fn new(
        backend: Arc<dyn PartitionBackend>,
        connector: Arc<dyn Connector>,
        statement_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            connector,
            statement_timeout,
        }
    }

    /// 根据配置构建工厂
    pub fn from_config(config: &Config, engine: DbEngine) -> Result<Self> {
        let db = config.db_config(engine)?;
        let settings = &config.partition;
        let connector = DbConnector::new(
            engine,
            build_connection_url(engine, db),
            Duration::from_secs(settings.connect_timeout_secs),
        );
        let backend = create_backend(engine, settings)?;

        Ok(Self::new(
            backend,
            Arc::new(connector),
            Duration::from_secs(settings.statement_timeout_secs),
        ))
    }

    pub fn engine(&self) -> DbEngine {
        self.backend.engine()
    }

    pub fn create(&self) -> PartitionManager {
        PartitionManager::new(
            self.backend.clone(),
            self.connector.clone(),
            self.statement_timeout,
        )
    }
}
