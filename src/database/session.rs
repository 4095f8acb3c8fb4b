//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了SQL执行接口与数据库连接的获取/释放。
//!
//! 分区维护使用独立的单连接，不与应用的请求连接池共享，避免慢DDL占满请求容量。

use super::DbEngine;
use crate::error::{PartitionError, Result};
use crate::utils::redaction::redact_connection_string;
use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, Value,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// SQL执行会话
///
/// 每条语句都受语句超时约束，超时以 `PartitionError::Timeout` 返回
pub struct SqlSession {
    connection: DatabaseConnection,
    backend: DatabaseBackend,
    statement_timeout: Duration,
}

impl SqlSession {
    pub fn new(connection: DatabaseConnection, statement_timeout: Duration) -> Self {
        let backend = connection.get_database_backend();
        Self {
            connection,
            backend,
            statement_timeout,
        }
    }

    fn statement(&self, sql: &str, values: Vec<Value>) -> Statement {
        if values.is_empty() {
            Statement::from_string(self.backend, sql.to_string())
        } else {
            Statement::from_sql_and_values(self.backend, sql, values)
        }
    }

    /// 执行语句，返回受影响行数
    pub async fn execute(&self, sql: &str, values: Vec<Value>) -> Result<u64> {
        debug!("execute: {}", compact_sql(sql));
        let statement = self.statement(sql, values);
        match timeout(self.statement_timeout, self.connection.execute(statement)).await {
            Ok(Ok(result)) => Ok(result.rows_affected()),
            Ok(Err(e)) => Err(PartitionError::Database(e.to_string())),
            Err(_) => Err(PartitionError::Timeout(format!(
                "statement did not finish within {:?}: {}",
                self.statement_timeout,
                compact_sql(sql)
            ))),
        }
    }

    /// 执行查询，返回全部结果行
    pub async fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<QueryResult>> {
        debug!("query: {}", compact_sql(sql));
        let statement = self.statement(sql, values);
        match timeout(self.statement_timeout, self.connection.query_all(statement)).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(PartitionError::Database(e.to_string())),
            Err(_) => Err(PartitionError::Timeout(format!(
                "query did not finish within {:?}: {}",
                self.statement_timeout,
                compact_sql(sql)
            ))),
        }
    }

    pub fn into_connection(self) -> DatabaseConnection {
        self.connection
    }
}

/// 将多行SQL压缩为单行，便于日志输出
fn compact_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 连接获取器
///
/// 分离连接的建立与释放，使编排层可以在测试中替换为计数实现
#[async_trait]
pub trait Connector: Send + Sync {
    /// 建立新连接，失败即为致命错误
    async fn open(&self) -> Result<DatabaseConnection>;

    /// 关闭连接
    async fn close(&self, connection: DatabaseConnection) -> Result<()> {
        connection.close().await?;
        Ok(())
    }

    /// 用于日志的目标描述（不含口令）
    fn describe(&self) -> String;
}

/// 基于 sea-orm 的数据库连接获取器
pub struct DbConnector {
    engine: DbEngine,
    url: SecretString,
    connect_timeout: Duration,
}

impl DbConnector {
    pub fn new(engine: DbEngine, url: SecretString, connect_timeout: Duration) -> Self {
        Self {
            engine,
            url,
            connect_timeout,
        }
    }

    pub fn engine(&self) -> DbEngine {
        self.engine
    }
}

#[async_trait]
impl Connector for DbConnector {
    async fn open(&self) -> Result<DatabaseConnection> {
        let mut opt = ConnectOptions::new(self.url.expose_secret().to_string());
        opt.max_connections(1)
            .min_connections(0)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.connect_timeout)
            .sqlx_logging(false);

        let start = Instant::now();
        // 外层超时覆盖 DNS 解析等连接选项管不到的阶段
        let outer = self.connect_timeout + Duration::from_secs(5);
        let connection = match timeout(outer, Database::connect(opt)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(PartitionError::Connection(format!(
                    "Failed to connect to {} at {}: {}",
                    self.engine,
                    self.describe(),
                    e
                )));
            }
            Err(_) => {
                return Err(PartitionError::Connection(format!(
                    "Connection timeout: {} at {} not responding within {:?}",
                    self.engine,
                    self.describe(),
                    outer
                )));
            }
        };

        connection.ping().await.map_err(|e| {
            PartitionError::Connection(format!(
                "Connection health check failed for {}: {}",
                self.describe(),
                e
            ))
        })?;

        let elapsed = start.elapsed();
        info!("Connected to {} database in {:?}", self.engine, elapsed);
        if elapsed > Duration::from_secs(3) {
            warn!(
                "{} connection took longer than expected: {:?}",
                self.engine, elapsed
            );
        }

        Ok(connection)
    }

    fn describe(&self) -> String {
        redact_connection_string(self.url.expose_secret())
    }
}
