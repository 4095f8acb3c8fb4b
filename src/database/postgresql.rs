//! PostgreSQL声明式分区后端实现

use crate::config::RoutineMode;
use crate::error::{PartitionError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::QueryResult;
use tracing::{debug, info};

use super::naming::{quote_postgres, validate_identifier, NamingScheme};
use super::partition::{CleanupSummary, PartitionBackend, RetentionPolicy};
use super::session::SqlSession;
use super::week::WeekKey;
use super::{DbEngine, PartitionBoundary, PartitionDescriptor};

/// 数据库端建分区函数，参数为目标日期，重复调用同一周不会产生重复分区
pub const CREATE_WEEKLY_PARTITION_FUNCTION: &str = "create_weekly_partition";
/// 数据库端清理函数，参数为保留周数
pub const DROP_OLD_PARTITIONS_FUNCTION: &str = "drop_old_partitions";

const PARTITION_INFO_SQL: &str = "SELECT
        child.relname::text AS partition_name,
        pg_get_expr(child.relpartbound, child.oid) AS partition_range,
        GREATEST(child.reltuples, 0)::bigint AS row_count,
        pg_relation_size(child.oid) AS data_length,
        pg_indexes_size(child.oid) AS index_length
     FROM pg_inherits
     JOIN pg_class parent ON pg_inherits.inhparent = parent.oid
     JOIN pg_class child ON pg_inherits.inhrelid = child.oid
     JOIN pg_namespace ns ON parent.relnamespace = ns.oid
     WHERE parent.relname = $1 AND ns.nspname = current_schema()
     ORDER BY child.relname";

lazy_static! {
    // FOR VALUES FROM ('2025-01-06') TO ('2025-01-13')，时间戳分区键会带时间部分
    static ref RANGE_BOUND: Regex = Regex::new(
        r"FROM\s*\('(\d{4}-\d{2}-\d{2})[^']*'\)\s*TO\s*\('(\d{4}-\d{2}-\d{2})[^']*'\)"
    )
    .expect("partition range pattern is valid");
}

/// PostgreSQL 声明式分区后端
pub struct PostgresPartitionBackend {
    table: String,
    routines: RoutineMode,
    naming: NamingScheme,
}

impl PostgresPartitionBackend {
    pub fn new(table: &str, routines: RoutineMode) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
            routines,
            naming: NamingScheme::Declarative {
                table: table.to_string(),
            },
        })
    }

    /// 创建周分区的DDL，`IF NOT EXISTS` 保证重复执行不产生重复分区
    pub fn create_partition_sql(&self, week: WeekKey) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} PARTITION OF {} FOR VALUES FROM ('{}') TO ('{}')",
            quote_postgres(&self.naming.partition_name(week)),
            quote_postgres(&self.table),
            week.monday().format("%Y-%m-%d"),
            week.next().monday().format("%Y-%m-%d")
        )
    }

    pub fn drop_partition_sql(&self, partition_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_postgres(partition_name))
    }

    fn parse_row(row: &QueryResult) -> Result<PartitionDescriptor> {
        let name: String = row.try_get("", "partition_name")?;
        let range: Option<String> = row.try_get("", "partition_range")?;
        let row_count: i64 = row.try_get("", "row_count")?;
        let data_size_bytes: i64 = row.try_get("", "data_length")?;
        let index_size_bytes: i64 = row.try_get("", "index_length")?;

        Ok(PartitionDescriptor {
            name,
            boundary: parse_partition_range(range.as_deref().unwrap_or_default()),
            row_count,
            data_size_bytes,
            index_size_bytes,
        })
    }

    fn keep_weeks_param(policy: RetentionPolicy) -> Result<i32> {
        i32::try_from(policy.keep_weeks()).map_err(|_| {
            PartitionError::Config(format!("keep_weeks {} out of range", policy.keep_weeks()))
        })
    }
}

/// 解析 `pg_get_expr(relpartbound)` 的输出
pub fn parse_partition_range(range: &str) -> PartitionBoundary {
    let trimmed = range.trim();
    if trimmed.eq_ignore_ascii_case("DEFAULT") {
        return PartitionBoundary::Default;
    }

    let parsed = RANGE_BOUND.captures(trimmed).and_then(|captures| {
        let from = NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()?;
        let to = NaiveDate::parse_from_str(captures.get(2)?.as_str(), "%Y-%m-%d").ok()?;
        Some(PartitionBoundary::Range { from, to })
    });

    parsed.unwrap_or_else(|| PartitionBoundary::Unknown {
        raw: trimmed.to_string(),
    })
}

#[async_trait]
impl PartitionBackend for PostgresPartitionBackend {
    fn engine(&self) -> DbEngine {
        DbEngine::PostgreSql
    }

    fn table(&self) -> &str {
        &self.table
    }

    /// 确保指定周的分区存在
    ///
    /// 存储过程模式下 `create_weekly_partition` 不返回分区名，返回值是按命名规则
    /// 推算的 `<表名>_<周一日期>`，与数据库端实际创建的名称是否一致取决于该函数的实现
    async fn add_weekly_partition(&self, session: &SqlSession, week: WeekKey) -> Result<String> {
        let partition_name = self.naming.partition_name(week);
        validate_identifier(&partition_name)?;
        let target_date = week.monday();

        match self.routines {
            RoutineMode::Procedure => {
                let sql = format!(
                    "SELECT {}(CAST($1 AS DATE))",
                    CREATE_WEEKLY_PARTITION_FUNCTION
                );
                session
                    .execute(&sql, vec![target_date.format("%Y-%m-%d").to_string().into()])
                    .await?;
            }
            RoutineMode::Native => {
                session
                    .execute(&self.create_partition_sql(week), vec![])
                    .await?;
            }
        }

        info!(
            "Weekly partition {} ensured for {} (target date {})",
            partition_name, self.table, target_date
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
                let sql = format!("SELECT {}($1)", DROP_OLD_PARTITIONS_FUNCTION);
                session
                    .execute(&sql, vec![Self::keep_weeks_param(policy)?.into()])
                    .await?;
                info!(
                    "Old partitions dropped by {} (keeping {} weeks)",
                    DROP_OLD_PARTITIONS_FUNCTION,
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
                let expired = policy.select_expired(&partitions, today);

                let mut dropped = Vec::with_capacity(expired.len());
                for partition in expired {
                    validate_identifier(&partition.name)?;
                    session
                        .execute(&self.drop_partition_sql(&partition.name), vec![])
                        .await?;
                    debug!("Dropped partition {}", partition.name);
                    dropped.push(partition.name.clone());
                }

                info!(
                    "Dropped {} partitions of {} older than {}",
                    dropped.len(),
                    self.table,
                    cutoff
                );
                Ok(CleanupSummary {
                    keep_weeks: policy.keep_weeks(),
                    cutoff,
                    dropped,
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

    #[test]
    fn test_create_partition_sql_spans_one_week() {
        let backend =
            PostgresPartitionBackend::new("check_server_log_dtl", RoutineMode::Native).unwrap();
        let week = WeekKey::new(2025, 1).unwrap();
        assert_eq!(
            backend.create_partition_sql(week),
            "CREATE TABLE IF NOT EXISTS \"check_server_log_dtl_20241230\" PARTITION OF \"check_server_log_dtl\" FOR VALUES FROM ('2024-12-30') TO ('2025-01-06')"
        );
    }

    #[test]
    fn test_parse_partition_range() {
        assert_eq!(
            parse_partition_range("FOR VALUES FROM ('2025-01-06') TO ('2025-01-13')"),
            PartitionBoundary::Range {
                from: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
                to: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            }
        );
        assert_eq!(
            parse_partition_range(
                "FOR VALUES FROM ('2025-01-06 00:00:00+00') TO ('2025-01-13 00:00:00+00')"
            ),
            PartitionBoundary::Range {
                from: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
                to: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            }
        );
        assert_eq!(parse_partition_range("DEFAULT"), PartitionBoundary::Default);
        assert!(matches!(
            parse_partition_range("FOR VALUES FROM (MINVALUE) TO ('2025-01-01')"),
            PartitionBoundary::Unknown { .. }
        ));
    }
}
