//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 数据库分区管理模块
//!
//! 提供MariaDB/MySQL范围分区与PostgreSQL声明式分区的按周分区功能

use crate::config::PartitionSettings;
use crate::error::{PartitionError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod connection_string;
pub mod mysql;
pub mod naming;
pub mod partition;
pub mod postgresql;
pub mod session;
pub mod week;

pub use connection_string::build_connection_url;
pub use mysql::MySqlPartitionBackend;
pub use naming::NamingScheme;
pub use partition::{CleanupSummary, PartitionBackend, RetentionPolicy};
pub use postgresql::PostgresPartitionBackend;
pub use session::{Connector, DbConnector, SqlSession};
pub use week::WeekKey;

/// 数据库引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    /// MariaDB / MySQL，使用 RANGE 分区
    MariaDb,
    /// PostgreSQL，使用声明式分区
    PostgreSql,
}

impl DbEngine {
    /// 配置文件中的节名
    pub fn as_str(&self) -> &'static str {
        match self {
            DbEngine::MariaDb => "mariadb",
            DbEngine::PostgreSql => "postgresql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DbEngine::MariaDb => 3306,
            DbEngine::PostgreSql => 5432,
        }
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbEngine {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mariadb" | "mysql" => Ok(DbEngine::MariaDb),
            "postgresql" | "postgres" | "pg" => Ok(DbEngine::PostgreSql),
            other => Err(PartitionError::Config(format!(
                "Unsupported database type '{}', expected mariadb or postgresql",
                other
            ))),
        }
    }
}

/// 分区边界
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionBoundary {
    /// `VALUES LESS THAN (value)`
    LessThan { value: i64 },
    /// `VALUES LESS THAN MAXVALUE`
    MaxValue,
    /// `FOR VALUES FROM (from) TO (to)`，to 为排他上界
    Range { from: NaiveDate, to: NaiveDate },
    /// PostgreSQL DEFAULT 分区
    Default,
    /// 无法解析的边界定义
    Unknown { raw: String },
}

impl PartitionBoundary {
    /// 分区所覆盖的最后一个ISO周，兜底分区与无法解析的边界返回 None
    pub fn last_week(&self) -> Option<WeekKey> {
        match self {
            PartitionBoundary::LessThan { value } => WeekKey::last_before_boundary(*value),
            PartitionBoundary::Range { from, to } => {
                let last_day = (*to - Duration::days(1)).max(*from);
                Some(WeekKey::of(last_day))
            }
            PartitionBoundary::MaxValue
            | PartitionBoundary::Default
            | PartitionBoundary::Unknown { .. } => None,
        }
    }

    /// 是否为接收所有剩余数据的兜底分区
    pub fn is_catch_all(&self) -> bool {
        matches!(self, PartitionBoundary::MaxValue | PartitionBoundary::Default)
    }
}

impl fmt::Display for PartitionBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionBoundary::LessThan { value } => write!(f, "< {}", value),
            PartitionBoundary::MaxValue => f.write_str("< MAXVALUE"),
            PartitionBoundary::Range { from, to } => write!(f, "[{}, {})", from, to),
            PartitionBoundary::Default => f.write_str("DEFAULT"),
            PartitionBoundary::Unknown { raw } => write!(f, "{}", raw),
        }
    }
}

/// 分区信息快照
///
/// 每次查询都整体替换，不会被原地修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionDescriptor {
    /// 分区名称
    pub name: String,
    /// 分区边界
    pub boundary: PartitionBoundary,
    /// 行数（引擎统计值，可能为估算）
    pub row_count: i64,
    /// 数据大小（字节）
    pub data_size_bytes: i64,
    /// 索引大小（字节）
    pub index_size_bytes: i64,
}

impl PartitionDescriptor {
    pub fn last_week(&self) -> Option<WeekKey> {
        self.boundary.last_week()
    }

    pub fn data_size_mb(&self) -> f64 {
        self.data_size_bytes as f64 / 1024.0 / 1024.0
    }
}

/// 根据引擎类型创建分区后端
///
/// 编排层只依赖 `PartitionBackend`，引擎差异全部在这里选定
pub fn create_backend(
    engine: DbEngine,
    settings: &PartitionSettings,
) -> Result<Arc<dyn PartitionBackend>> {
    match engine {
        DbEngine::MariaDb => Ok(Arc::new(MySqlPartitionBackend::new(
            &settings.table,
            settings.routines,
        )?)),
        DbEngine::PostgreSql => Ok(Arc::new(PostgresPartitionBackend::new(
            &settings.table,
            settings.routines,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_str() {
        assert_eq!("MariaDB".parse::<DbEngine>().unwrap(), DbEngine::MariaDb);
        assert_eq!("mysql".parse::<DbEngine>().unwrap(), DbEngine::MariaDb);
        assert_eq!("postgres".parse::<DbEngine>().unwrap(), DbEngine::PostgreSql);
        assert!("oracle".parse::<DbEngine>().is_err());
    }

    #[test]
    fn test_boundary_last_week() {
        let less_than = PartitionBoundary::LessThan { value: 202502 };
        assert_eq!(less_than.last_week(), Some(WeekKey::new(2025, 1).unwrap()));

        let range = PartitionBoundary::Range {
            from: NaiveDate::from_ymd_opt(2024, 12, 30).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
        };
        assert_eq!(range.last_week(), Some(WeekKey::new(2025, 1).unwrap()));

        assert_eq!(PartitionBoundary::MaxValue.last_week(), None);
        assert!(PartitionBoundary::Default.is_catch_all());
    }
}
