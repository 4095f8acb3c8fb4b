//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use weekpart::database::partition::{CleanupSummary, PartitionBackend, RetentionPolicy};
use weekpart::database::{
    Connector, DbEngine, NamingScheme, PartitionBoundary, PartitionDescriptor, SqlSession, WeekKey,
};
use weekpart::error::{PartitionError, Result};
use weekpart::manager::{PartitionManager, PartitionManagerFactory};
use weekpart::scheduler::Clock;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 范围分区描述（`pYYYYWW`，LESS THAN 下一周边界）
pub fn range_partition(week: WeekKey) -> PartitionDescriptor {
    PartitionDescriptor {
        name: NamingScheme::Range.partition_name(week),
        boundary: PartitionBoundary::LessThan {
            value: week.next_boundary(),
        },
        row_count: 100,
        data_size_bytes: 1024 * 1024,
        index_size_bytes: 0,
    }
}

/// 计数连接器
///
/// 每次 open 返回一个新的 MockDatabase 连接，并统计 open/close 次数
pub struct CountingConnector {
    backend: DatabaseBackend,
    fail_open: AtomicBool,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl CountingConnector {
    pub fn new(backend: DatabaseBackend) -> Arc<Self> {
        Arc::new(Self {
            backend,
            fail_open: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    pub fn unreachable(backend: DatabaseBackend) -> Arc<Self> {
        let connector = Self::new(backend);
        connector.fail_open.store(true, Ordering::SeqCst);
        connector
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn open(&self) -> Result<DatabaseConnection> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(PartitionError::Connection(
                "Connection refused (os error 111)".to_string(),
            ));
        }
        Ok(MockDatabase::new(self.backend).into_connection())
    }

    async fn close(&self, connection: DatabaseConnection) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        drop(connection);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mock://{:?}", self.backend)
    }
}

/// 脚本化分区后端
///
/// 不发送SQL，按预设结果返回，并记录调用顺序
pub struct ScriptedBackend {
    pub partitions: Mutex<Vec<PartitionDescriptor>>,
    pub fail_info: AtomicBool,
    pub fail_cleanup: AtomicBool,
    pub fail_add: AtomicBool,
    pub panic_cleanup: AtomicBool,
    pub delay: Duration,
    pub calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    naming: NamingScheme,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            partitions: Mutex::new(Vec::new()),
            fail_info: AtomicBool::new(false),
            fail_cleanup: AtomicBool::new(false),
            fail_add: AtomicBool::new(false),
            panic_cleanup: AtomicBool::new(false),
            delay,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            naming: NamingScheme::Range,
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: String) {
        self.calls.lock().unwrap().push(call);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartitionBackend for ScriptedBackend {
    fn engine(&self) -> DbEngine {
        DbEngine::MariaDb
    }

    fn table(&self) -> &str {
        "check_server_log_dtl"
    }

    async fn add_weekly_partition(&self, _session: &SqlSession, week: WeekKey) -> Result<String> {
        self.enter(format!("add:{}", week)).await;
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(PartitionError::Database(
                "Duplicate partition name p209901".to_string(),
            ));
        }
        Ok(self.naming.partition_name(week))
    }

    async fn drop_old_partitions(
        &self,
        _session: &SqlSession,
        policy: RetentionPolicy,
        today: NaiveDate,
    ) -> Result<CleanupSummary> {
        self.enter(format!("cleanup:{}", policy.keep_weeks())).await;
        if self.panic_cleanup.load(Ordering::SeqCst) {
            panic!("cleanup exploded");
        }
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(PartitionError::Database(
                "PROCEDURE DropOldPartitions does not exist".to_string(),
            ));
        }
        let partitions = self.partitions.lock().unwrap().clone();
        let dropped = policy
            .select_expired(&partitions, today)
            .into_iter()
            .map(|p| p.name.clone())
            .collect();
        Ok(CleanupSummary {
            keep_weeks: policy.keep_weeks(),
            cutoff: policy.cutoff(today),
            dropped,
            delegated: false,
        })
    }

    async fn get_partition_info(&self, _session: &SqlSession) -> Result<Vec<PartitionDescriptor>> {
        self.enter("info".to_string()).await;
        if self.fail_info.load(Ordering::SeqCst) {
            return Err(PartitionError::Timeout(
                "query did not finish within 60s".to_string(),
            ));
        }
        Ok(self.partitions.lock().unwrap().clone())
    }
}

pub fn manager_with(
    backend: Arc<ScriptedBackend>,
    connector: Arc<CountingConnector>,
) -> PartitionManager {
    PartitionManager::new(backend, connector, Duration::from_secs(5))
}

pub fn factory_with(
    backend: Arc<ScriptedBackend>,
    connector: Arc<CountingConnector>,
) -> PartitionManagerFactory {
    PartitionManagerFactory::new(backend, connector, Duration::from_secs(5))
}

/// 跟随 tokio 时间前进的时钟
///
/// 在 `start_paused` 测试中与 `tokio::time::sleep` 使用同一时间源
pub struct TokioClock {
    origin: NaiveDateTime,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(origin: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self {
            origin,
            started: tokio::time::Instant::now(),
        })
    }
}

impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        self.origin + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }
}

/// 基于 MockDatabase 的会话
pub fn mock_session(mock: MockDatabase) -> SqlSession {
    SqlSession::new(mock.into_connection(), Duration::from_secs(5))
}
