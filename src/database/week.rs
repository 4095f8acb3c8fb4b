//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! ISO-8601 周键
//!
//! 一个周由包含该周星期四的年份（周所属年）和周序号唯一确定。
//! 因此12月末的日期可能属于下一年的第1周，1月初的日期可能属于上一年的第52/53周。

use crate::error::{PartitionError, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO-8601 周键
///
/// 字段顺序即比较顺序：按 `(year, week)` 字典序比较，与分区边界值的顺序一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    year: i32,
    week: u32,
}

impl WeekKey {
    /// 创建周键，校验周序号在该年的ISO周范围内
    pub fn new(year: i32, week: u32) -> Result<Self> {
        if week == 0 || week > weeks_in_year(year) {
            return Err(PartitionError::InvalidWeek { year, week });
        }
        Ok(Self { year, week })
    }

    /// 计算日期所属的ISO周
    pub fn of(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn week(&self) -> u32 {
        self.week
    }

    /// 该周星期一
    pub fn monday(&self) -> NaiveDate {
        // new()/of() 已保证 (year, week) 合法
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    /// 偏移若干周（可为负）
    pub fn add_weeks(&self, weeks: i64) -> Self {
        Self::of(self.monday() + Duration::weeks(weeks))
    }

    pub fn next(&self) -> Self {
        self.add_weeks(1)
    }

    pub fn previous(&self) -> Self {
        self.add_weeks(-1)
    }

    /// 范围分区的边界值：`year * 100 + week`
    pub fn boundary_value(&self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.week)
    }

    /// 新分区的排他上界：`boundary_value + 1`
    pub fn next_boundary(&self) -> i64 {
        self.boundary_value() + 1
    }

    /// 从边界值还原周键
    pub fn from_boundary_value(value: i64) -> Result<Self> {
        let week = value.rem_euclid(100) as u32;
        let year = i32::try_from(value.div_euclid(100))
            .map_err(|_| PartitionError::InvalidWeek { year: 0, week })?;
        Self::new(year, week)
    }

    /// `VALUES LESS THAN (bound)` 所覆盖的最后一周
    ///
    /// 边界值编码在年内不连续（202453 之后是 202501），
    /// 低于本年第1周的值归入上一年最后一周，超出本年周数的值归入本年最后一周。
    pub fn last_before_boundary(bound: i64) -> Option<Self> {
        let year = i32::try_from(bound.div_euclid(100)).ok()?;
        let week = bound.rem_euclid(100) as u32;
        if week <= 1 {
            let prev_year = year.checked_sub(1)?;
            return Self::new(prev_year, weeks_in_year(prev_year)).ok();
        }
        let last = weeks_in_year(year);
        Self::new(year, (week - 1).min(last)).ok()
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// 某年的ISO周数（52或53）
///
/// 12月28日总是落在该年的最后一个ISO周内
pub fn weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(52)
}
