//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区管理的配置结构和解析逻辑。

use crate::database::partition::RetentionPolicy;
use crate::database::DbEngine;
use crate::error::{PartitionError, Result};
use crate::scheduler::Schedule;
use chrono::Weekday;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

/// 默认配置文件路径（相对于工作目录）
pub const DEFAULT_CONFIG_PATH: &str = "config/database.toml";

/// 默认分区表
pub const DEFAULT_TABLE: &str = "check_server_log_dtl";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// MariaDB/MySQL 连接配置
    #[serde(default)]
    pub mariadb: Option<DbConfig>,
    /// PostgreSQL 连接配置
    #[serde(default)]
    pub postgresql: Option<DbConfig>,
    #[serde(default)]
    pub partition: PartitionSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// 数据库连接配置
#[derive(Deserialize, Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    /// 未设置时使用引擎默认端口
    #[serde(default)]
    pub port: Option<u16>,
    pub user: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    pub database: String,
}

/// 存储过程使用方式
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoutineMode {
    /// 调用数据库端存储过程/函数
    #[default]
    Procedure,
    /// 由本程序根据分区目录直接生成DDL
    Native,
}

/// 分区管理配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PartitionSettings {
    /// 分区表名
    pub table: String,
    /// 保留周数，不设置时必须由调用方显式给出
    pub retention_weeks: Option<u32>,
    /// 存储过程使用方式
    pub routines: RoutineMode,
    /// 单条语句超时（秒）
    pub statement_timeout_secs: u64,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            retention_weeks: None,
            routines: RoutineMode::Procedure,
            statement_timeout_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

/// 调度配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 每周添加下周分区
    pub weekly: WeeklyAt,
    /// 每天清理过期分区
    pub daily: DailyAt,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct WeeklyAt {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
}

impl Default for WeeklyAt {
    fn default() -> Self {
        // 每周一 02:00
        Self {
            weekday: Weekday::Mon,
            hour: 2,
            minute: 0,
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DailyAt {
    pub hour: u32,
    pub minute: u32,
}

impl Default for DailyAt {
    fn default() -> Self {
        // 每天 03:00
        Self { hour: 3, minute: 0 }
    }
}

impl SchedulerConfig {
    pub fn weekly_schedule(&self) -> Schedule {
        Schedule::Weekly {
            weekday: self.weekly.weekday,
            hour: self.weekly.hour,
            minute: self.weekly.minute,
        }
    }

    pub fn daily_schedule(&self) -> Schedule {
        Schedule::Daily {
            hour: self.daily.hour,
            minute: self.daily.minute,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从环境变量构建配置
    ///
    /// `DB_HOST`、`DB_PORT`、`DB_USER`、`DB_PASSWORD`、`DB_NAME` 填充所选引擎的连接配置，
    /// `PARTITION_TABLE`、`PARTITION_RETENTION_WEEKS` 填充分区配置
    pub fn from_env(engine: DbEngine) -> Result<Self> {
        let port = match std::env::var("DB_PORT") {
            Ok(raw) => Some(raw.parse::<u16>().map_err(|_| {
                PartitionError::Config(format!("DB_PORT '{}' is not a valid port", raw))
            })?),
            Err(_) => None,
        };

        let db = DbConfig {
            host: env_or("DB_HOST", "localhost"),
            port,
            user: env_or("DB_USER", "root"),
            password: std::env::var("DB_PASSWORD").ok().map(SecretString::from),
            database: env_or("DB_NAME", "client_util_app"),
        };

        let mut partition = PartitionSettings {
            table: env_or("PARTITION_TABLE", DEFAULT_TABLE),
            ..Default::default()
        };
        if let Ok(raw) = std::env::var("PARTITION_RETENTION_WEEKS") {
            partition.retention_weeks = Some(raw.parse::<u32>().map_err(|_| {
                PartitionError::Config(format!(
                    "PARTITION_RETENTION_WEEKS '{}' is not a valid number",
                    raw
                ))
            })?);
        }

        let mut config = Config {
            partition,
            ..Default::default()
        };
        match engine {
            DbEngine::MariaDb => config.mariadb = Some(db),
            DbEngine::PostgreSql => config.postgresql = Some(db),
        }
        Ok(config)
    }

    /// 加载配置
    ///
    /// 显式指定的文件必须存在；未指定时使用默认路径，默认文件不存在则回退到环境变量
    pub fn load(path: Option<&Path>, engine: DbEngine) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::from_env(engine)?
                }
            }
        };

        config.validate().map_err(PartitionError::Config)?;
        Ok(config)
    }

    /// 取出指定引擎的连接配置
    pub fn db_config(&self, engine: DbEngine) -> Result<&DbConfig> {
        let section = match engine {
            DbEngine::MariaDb => self.mariadb.as_ref(),
            DbEngine::PostgreSql => self.postgresql.as_ref(),
        };
        section.ok_or_else(|| {
            PartitionError::Config(format!(
                "Missing [{}] section in configuration",
                engine.as_str()
            ))
        })
    }

    /// 解析保留策略：显式参数优先，其次是配置，二者都没有则报错
    pub fn retention(&self, explicit: Option<u32>) -> Result<RetentionPolicy> {
        let keep_weeks = explicit.or(self.partition.retention_weeks).ok_or_else(|| {
            PartitionError::Config(
                "Retention is not configured: pass keep-weeks explicitly or set partition.retention_weeks"
                    .to_string(),
            )
        })?;
        RetentionPolicy::new(keep_weeks)
    }

    /// 验证配置
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, db) in [("mariadb", &self.mariadb), ("postgresql", &self.postgresql)] {
            let Some(db) = db else { continue };
            if db.host.trim().is_empty() {
                return Err(format!("[{}] host cannot be empty", name));
            }
            if db.user.trim().is_empty() {
                return Err(format!("[{}] user cannot be empty", name));
            }
            if db.database.trim().is_empty() {
                return Err(format!("[{}] database cannot be empty", name));
            }
            if db.port == Some(0) {
                return Err(format!("[{}] port cannot be zero", name));
            }
        }

        let partition = &self.partition;
        crate::database::naming::validate_identifier(&partition.table)
            .map_err(|e| format!("partition.table: {}", e))?;

        if partition.retention_weeks == Some(0) {
            return Err("partition.retention_weeks must be at least 1".to_string());
        }

        if !(1..=3600).contains(&partition.statement_timeout_secs) {
            return Err("partition.statement_timeout_secs must be between 1 and 3600".to_string());
        }

        if !(1..=3600).contains(&partition.connect_timeout_secs) {
            return Err("partition.connect_timeout_secs must be between 1 and 3600".to_string());
        }

        let weekly = &self.scheduler.weekly;
        let daily = &self.scheduler.daily;
        if weekly.hour > 23 || daily.hour > 23 {
            return Err("scheduler hour must be between 0 and 23".to_string());
        }
        if weekly.minute > 59 || daily.minute > 59 {
            return Err("scheduler minute must be between 0 and 59".to_string());
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
