//! 分区后端trait定义

use crate::error::{PartitionError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use super::session::SqlSession;
use super::week::WeekKey;
use super::{DbEngine, PartitionDescriptor};

/// 保留策略
///
/// 保留最近 `keep_weeks` 个周分区；最后覆盖周严格早于 `今天 - keep_weeks 周`
/// 所在周的分区才可删除，因此当前周与未来周的分区永远不会被选中
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    keep_weeks: u32,
}

impl RetentionPolicy {
    pub fn new(keep_weeks: u32) -> Result<Self> {
        if keep_weeks == 0 {
            return Err(PartitionError::Config(
                "retention keep_weeks must be at least 1".to_string(),
            ));
        }
        Ok(Self { keep_weeks })
    }

    pub fn keep_weeks(&self) -> u32 {
        self.keep_weeks
    }

    /// 截止周：早于此周的分区过期
    pub fn cutoff(&self, today: NaiveDate) -> WeekKey {
        WeekKey::of(today).add_weeks(-i64::from(self.keep_weeks))
    }

    pub fn is_expired(&self, partition: &PartitionDescriptor, today: NaiveDate) -> bool {
        let cutoff = self.cutoff(today);
        partition.last_week().is_some_and(|week| week < cutoff)
    }

    /// 按目录顺序返回过期分区
    pub fn select_expired<'a>(
        &self,
        partitions: &'a [PartitionDescriptor],
        today: NaiveDate,
    ) -> Vec<&'a PartitionDescriptor> {
        partitions
            .iter()
            .filter(|p| self.is_expired(p, today))
            .collect()
    }
}

/// 清理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub keep_weeks: u32,
    /// 截止周（早于此周的分区被删除）
    pub cutoff: WeekKey,
    /// 本进程删除的分区；委托存储过程时为空
    pub dropped: Vec<String>,
    /// 是否委托给数据库端存储过程执行
    pub delegated: bool,
}

/// 分区后端trait
///
/// 两种引擎实现相同的生命周期契约。所有方法都以 `Err` 值返回引擎错误，
/// 由编排层决定是否继续后续步骤。
#[async_trait]
pub trait PartitionBackend: Send + Sync {
    fn engine(&self) -> DbEngine;

    /// 受管理的分区表
    fn table(&self) -> &str;

    /// 为指定周添加分区，返回分区名称
    async fn add_weekly_partition(&self, session: &SqlSession, week: WeekKey) -> Result<String>;

    /// 删除超出保留窗口的分区
    async fn drop_old_partitions(
        &self,
        session: &SqlSession,
        policy: RetentionPolicy,
        today: NaiveDate,
    ) -> Result<CleanupSummary>;

    /// 查询分区元数据（只读）
    async fn get_partition_info(&self, session: &SqlSession) -> Result<Vec<PartitionDescriptor>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{NamingScheme, PartitionBoundary};

    fn partition_for(week: WeekKey) -> PartitionDescriptor {
        PartitionDescriptor {
            name: NamingScheme::Range.partition_name(week),
            boundary: PartitionBoundary::LessThan {
                value: week.next_boundary(),
            },
            row_count: 0,
            data_size_bytes: 0,
            index_size_bytes: 0,
        }
    }

    #[test]
    fn test_keep_two_weeks_drops_three_oldest() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        let current = WeekKey::of(today);
        let partitions: Vec<_> = (0..=5)
            .rev()
            .map(|back| partition_for(current.add_weeks(-back)))
            .collect();

        let policy = RetentionPolicy::new(2).unwrap();
        let expired: Vec<_> = policy
            .select_expired(&partitions, today)
            .into_iter()
            .map(|p| p.name.clone())
            .collect();

        assert_eq!(expired, vec!["p202449", "p202450", "p202451"]);
    }

    #[test]
    fn test_never_expires_current_future_or_catch_all() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 18).unwrap();
        let current = WeekKey::of(today);
        let policy = RetentionPolicy::new(1).unwrap();

        assert!(!policy.is_expired(&partition_for(current), today));
        assert!(!policy.is_expired(&partition_for(current.next()), today));
        assert!(!policy.is_expired(&partition_for(current.previous()), today));
        assert!(policy.is_expired(&partition_for(current.add_weeks(-2)), today));

        let catch_all = PartitionDescriptor {
            name: "p_future".to_string(),
            boundary: PartitionBoundary::MaxValue,
            row_count: 0,
            data_size_bytes: 0,
            index_size_bytes: 0,
        };
        assert!(!policy.is_expired(&catch_all, today));
    }

    #[test]
    fn test_zero_retention_rejected() {
        assert!(RetentionPolicy::new(0).is_err());
    }
}
