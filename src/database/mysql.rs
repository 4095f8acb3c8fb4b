//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了MariaDB/MySQL范围分区后端的实现。
//!
//! 分区表以 `YEARWEEK(col, 3)`（即 `year * 100 + week`）作为 RANGE 分区键，
//! 每个周分区的上界为该周边界值加一。

use crate::config::RoutineMode;
use crate::error::{PartitionError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::QueryResult;
use tracing::{debug, info, warn};

use super::naming::{quote_mysql, validate_identifier, NamingScheme};
use super::partition::{CleanupSummary, PartitionBackend, RetentionPolicy};
use super::session::SqlSession;
use super::week::WeekKey;
use super::{DbEngine, PartitionBoundary, PartitionDescriptor};

/// 数据库端清理存储过程
pub const DROP_OLD_PARTITIONS_PROCEDURE: &str = "DropOldPartitions";

const PARTITION_INFO_SQL: &str = "SELECT
        CAST(PARTITION_NAME AS CHAR) AS partition_name,
        CAST(PARTITION_DESCRIPTION AS CHAR) AS partition_description,
        CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED) AS row_count,
        CAST(COALESCE(DATA_LENGTH, 0) AS SIGNED) AS data_length,
        CAST(COALESCE(INDEX_LENGTH, 0) AS SIGNED) AS index_length
     FROM INFORMATION_SCHEMA.PARTITIONS
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND PARTITION_NAME IS NOT NULL
     ORDER BY PARTITION_ORDINAL_POSITION";

/// MariaDB/MySQL 范围分区后端
pub struct MySqlPartitionBackend {
    table: String,
    routines: RoutineMode,
    naming: NamingScheme,
}

impl MySqlPartitionBackend {
    pub fn new(table: &str, routines: RoutineMode) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            routines,
            naming: NamingScheme::Range,
        })
    }

    /// 追加周分区的DDL
    pub fn add_partition_sql(&self, week: WeekKey) -> String {
        format!(
            "ALTER TABLE {} ADD PARTITION (PARTITION {} VALUES LESS THAN ({}))",
            quote_mysql(&self.table),
            quote_mysql(&self.naming.partition_name(week)),
            week.next_boundary()
        )
    }

    /// 存在 MAXVALUE 兜底分区时无法直接追加，需要拆分兜底分区
    pub fn reorganize_sql(&self, week: WeekKey, catch_all: &str) -> String {
        format!(
            "ALTER TABLE {} REORGANIZE PARTITION {} INTO (PARTITION {} VALUES LESS THAN ({}), PARTITION {} VALUES LESS THAN MAXVALUE)",
            quote_mysql(&self.table),
            quote_mysql(catch_all),
            quote_mysql(&self.naming.partition_name(week)),
            week.next_boundary(),
            quote_mysql(catch_all)
        )
    }

    /// 一次删除多个分区的DDL
    pub fn drop_partitions_sql(&self, names: &[&str]) -> String {
        let list = names
            .iter()
            .map(|name| quote_mysql(name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "ALTER TABLE {} DROP PARTITION {}",
            quote_mysql(&self.table),
            list
        )
    }

    fn parse_row(row: &QueryResult) -> Result<PartitionDescriptor> {
        let name: String = row.try_get("", "partition_name")?;
        let description: Option<String> = row.try_get("", "partition_description")?;
        let row_count: i64 = row.try_get("", "row_count")?;
        let data_size_bytes: i64 = row.try_get("", "data_length")?;
        let index_size_bytes: i64 = row.try_get("", "index_length")?;

        Ok(PartitionDescriptor {
            name,
            boundary: parse_description(description.as_deref()),
            row_count,
            data_size_bytes,
            index_size_bytes,
        })
    }
}

/// 解析 `PARTITION_DESCRIPTION`（RANGE 分区的 LESS THAN 值）
pub fn parse_description(description: Option<&str>) -> PartitionBoundary {
    match description.map(str::trim) {
        Some(d) if d.eq_ignore_ascii_case("MAXVALUE") => PartitionBoundary::MaxValue,
        Some(d) => match d.parse::<i64>() {
            Ok(value) => PartitionBoundary::LessThan { value },
            Err(_) => PartitionBoundary::Unknown { raw: d.to_string() },
        },
        None => PartitionBoundary::Unknown { raw: String::new() },
    }
}

#[async_trait]
impl PartitionBackend for MySqlPartitionBackend {
    fn engine(&self) -> DbEngine {
        DbEngine::MariaDb
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn add_weekly_partition(&self, session: &SqlSession, week: WeekKey) -> Result<String> {
        let partition_name = self.naming.partition_name(week);
        validate_identifier(&partition_name)?;

        let existing = self.get_partition_info(session).await?;
        let catch_all = existing
            .iter()
            .find(|p| p.boundary == PartitionBoundary::MaxValue);

        let sql = match catch_all {
            Some(target) => {
                validate_identifier(&target.name)?;
                debug!(
                    "Reorganizing catch-all partition {} to insert {}",
                    target.name, partition_name
                );
                self.reorganize_sql(week, &target.name)
            }
            None => self.add_partition_sql(week),
        };

        // 边界重复时由引擎报错，错误原样返回给调用方
        session.execute(&sql, vec![]).await?;

        info!(
            "Partition {} added to {} (LESS THAN {})",
            partition_name,
            self.table,
            week.next_boundary()
        );
        Ok(partition_name)
    }

    async fn drop_old_partitions(
        &self,
        session: &SqlSession,
        policy: RetentionPolicy,
        today: NaiveDate,
    ) -> Result<CleanupSummary> {
        let cutoff = policy.cutoff(today);

        match self.routines {
            RoutineMode::Procedure => {
                let keep_weeks = i32::try_from(policy.keep_weeks()).map_err(|_| {
                    PartitionError::Config(format!(
                        "keep_weeks {} out of range",
                        policy.keep_weeks()
                    ))
                })?;
                let sql = format!("CALL {}(?)", DROP_OLD_PARTITIONS_PROCEDURE);
                session.execute(&sql, vec![keep_weeks.into()]).await?;
                info!(
                    "Old partitions dropped by {} (keeping {} weeks)",
                    DROP_OLD_PARTITIONS_PROCEDURE,
                    policy.keep_weeks()
                );
                Ok(CleanupSummary {
                    keep_weeks: policy.keep_weeks(),
                    cutoff,
                    dropped: Vec::new(),
                    delegated: true,
                })
            }
            RoutineMode::Native => {
                let partitions = self.get_partition_info(session).await?;
                let expired: Vec<&str> = policy
                    .select_expired(&partitions, today)
                    .into_iter()
                    .map(|p| p.name.as_str())
                    .collect();

                if expired.is_empty() {
                    debug!("No partitions of {} older than {}", self.table, cutoff);
                } else {
                    for name in &expired {
                        validate_identifier(name)?;
                    }
                    if expired.len() == partitions.len() {
                        // 范围分区表不能删除最后一个分区
                        warn!(
                            "All {} partitions of {} are expired; dropping them will fail",
                            expired.len(),
                            self.table
                        );
                    }
                    session
                        .execute(&self.drop_partitions_sql(&expired), vec![])
                        .await?;
                    info!(
                        "Dropped {} partitions of {} older than {}: {:?}",
                        expired.len(),
                        self.table,
                        cutoff,
                        expired
                    );
                }

                Ok(CleanupSummary {
                    keep_weeks: policy.keep_weeks(),
                    cutoff,
                    dropped: expired.into_iter().map(str::to_string).collect(),
                    delegated: false,
                })
            }
        }
    }

    async fn get_partition_info(&self, session: &SqlSession) -> Result<Vec<PartitionDescriptor>> {
        let rows = session
            .query(PARTITION_INFO_SQL, vec![self.table.clone().into()])
            .await?;
        debug!("get_partition_info found {} rows", rows.len());

        rows.iter().map(Self::parse_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MySqlPartitionBackend {
        MySqlPartitionBackend::new("check_server_log_dtl", RoutineMode::Procedure).unwrap()
    }

    #[test]
    fn test_add_partition_sql() {
        let week = WeekKey::new(2025, 1).unwrap();
        assert_eq!(
            backend().add_partition_sql(week),
            "ALTER TABLE `check_server_log_dtl` ADD PARTITION (PARTITION `p202501` VALUES LESS THAN (202502))"
        );
    }

    #[test]
    fn test_reorganize_sql_keeps_catch_all() {
        let week = WeekKey::new(2024, 52).unwrap();
        let sql = backend().reorganize_sql(week, "p_future");
        assert!(sql.contains("REORGANIZE PARTITION `p_future`"));
        assert!(sql.contains("PARTITION `p202452` VALUES LESS THAN (202453)"));
        assert!(sql.ends_with("PARTITION `p_future` VALUES LESS THAN MAXVALUE)"));
    }

    #[test]
    fn test_drop_partitions_sql() {
        assert_eq!(
            backend().drop_partitions_sql(&["p202449", "p202450"]),
            "ALTER TABLE `check_server_log_dtl` DROP PARTITION `p202449`, `p202450`"
        );
    }

    #[test]
    fn test_parse_description() {
        assert_eq!(
            parse_description(Some("202502")),
            PartitionBoundary::LessThan { value: 202502 }
        );
        assert_eq!(parse_description(Some("MAXVALUE")), PartitionBoundary::MaxValue);
        assert!(matches!(
            parse_description(Some("TO_DAYS('2025-01-01')")),
            PartitionBoundary::Unknown { .. }
        ));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        assert!(MySqlPartitionBackend::new("logs`; DROP TABLE x", RoutineMode::Native).is_err());
    }
}
