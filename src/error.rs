//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区管理系统的错误类型和处理机制。

use thiserror::Error;

/// 分区管理错误类型枚举
///
/// 连接类与配置类错误是致命的，其余错误只影响单个操作
#[derive(Error, Debug)]
pub enum PartitionError {
    /// 数据库连接失败（主机不可达、认证失败等）
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Sea-ORM数据库错误
    #[error("Sea-ORM error: {0}")]
    SeaOrm(#[from] sea_orm::DbErr),

    /// 语句执行失败
    #[error("Database error: {0}")]
    Database(String),

    /// 分区目录查询失败
    #[error("Partition inspection failed: {0}")]
    Inspection(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 尚未建立连接
    #[error("Not connected: call connect() before running partition operations")]
    NotConnected,

    /// 非法的ISO周
    #[error("Invalid ISO week: {year}-W{week:02}")]
    InvalidWeek { year: i32, week: u32 },

    /// 非法的SQL标识符
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML解析错误
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl PartitionError {
    /// 是否为致命错误（无法继续任何后续操作）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PartitionError::Connection(_) | PartitionError::Config(_) | PartitionError::TomlParse(_)
        )
    }
}

/// 分区操作结果类型别名
pub type Result<T> = std::result::Result<T, PartitionError>;
