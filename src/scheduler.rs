//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区维护的定时调度器。
//!
//! 每周任务添加下周分区，每天任务清理过期分区。每次执行都新建管理器并使用独立连接，
//! 两个任务共享同一把执行锁，不会并发对同一张表执行DDL。

use crate::config::SchedulerConfig;
use crate::database::{CleanupSummary, RetentionPolicy};
use crate::error::Result;
use crate::manager::PartitionManagerFactory;
use crate::metrics::GLOBAL_METRICS;
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// 触发时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// 每周指定星期几的固定时间
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    /// 每天固定时间
    Daily { hour: u32, minute: u32 },
}

impl Schedule {
    fn time_of_day(&self) -> NaiveTime {
        let (hour, minute) = match *self {
            Schedule::Weekly { hour, minute, .. } => (hour, minute),
            Schedule::Daily { hour, minute } => (hour, minute),
        };
        NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or_default()
    }

    /// 计算严格晚于 `now` 的下一次触发时间
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let time = self.time_of_day();
        match *self {
            Schedule::Daily { .. } => {
                let candidate = now.date().and_time(time);
                if candidate > now {
                    candidate
                } else {
                    candidate + ChronoDuration::days(1)
                }
            }
            Schedule::Weekly { weekday, .. } => {
                let today = now.date().weekday().num_days_from_monday() as i64;
                let target = weekday.num_days_from_monday() as i64;
                let days_ahead = (target - today).rem_euclid(7);
                let candidate = (now.date() + ChronoDuration::days(days_ahead)).and_time(time);
                if candidate > now {
                    candidate
                } else {
                    candidate + ChronoDuration::days(7)
                }
            }
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.time_of_day().format("%H:%M");
        match self {
            Schedule::Weekly { weekday, .. } => write!(f, "every {} at {}", weekday, time),
            Schedule::Daily { .. } => write!(f, "every day at {}", time),
        }
    }
}

/// 调度时钟
///
/// 返回用于计算触发时间的本地时间
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 系统本地时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 调度任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// 添加下周分区
    WeeklyAdd,
    /// 清理过期分区
    DailyCleanup,
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::WeeklyAdd => "weekly_add",
            Job::DailyCleanup => "daily_cleanup",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SchedulerInner {
    factory: PartitionManagerFactory,
    retention: RetentionPolicy,
    weekly: Schedule,
    daily: Schedule,
    clock: Arc<dyn Clock>,
    /// 两个任务共用的执行锁
    run_lock: tokio::sync::Mutex<()>,
    token: Mutex<CancellationToken>,
    handles: Mutex<Vec<(Job, JoinHandle<()>)>>,
}

impl SchedulerInner {
    fn schedule_for(&self, job: Job) -> Schedule {
        match job {
            Job::WeeklyAdd => self.weekly,
            Job::DailyCleanup => self.daily,
        }
    }

    async fn execute<T, Fut>(&self, job: Job, work: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("partition_job", job = job.as_str(), run_id = %run_id);

        async {
            let _running = self.run_lock.lock().await;
            info!("Scheduled {} run started", job);
            let result = work.await;
            match &result {
                Ok(_) => info!("Scheduled {} run finished", job),
                Err(e) => error!("Scheduled {} run failed: {}", job, e),
            }
            GLOBAL_METRICS.record_scheduler_run(job.as_str(), result.is_ok());
            result
        }
        .instrument(span)
        .await
    }

    async fn run_weekly(&self) -> Result<String> {
        let manager = self.factory.create();
        self.execute(Job::WeeklyAdd, async {
            manager
                .with_session(|m| Box::pin(m.auto_manage_partitions()))
                .await
        })
        .await
    }

    async fn run_daily(&self) -> Result<CleanupSummary> {
        let manager = self.factory.create();
        let policy = self.retention;
        self.execute(Job::DailyCleanup, async {
            manager
                .with_session(move |m| Box::pin(m.drop_old_partitions(policy)))
                .await
        })
        .await
    }

    async fn run(&self, job: Job) {
        // 失败已在 execute 中记录，下一次触发照常进行
        let _ = match job {
            Job::WeeklyAdd => self.run_weekly().await.map(|_| ()),
            Job::DailyCleanup => self.run_daily().await.map(|_| ()),
        };
    }
}

/// 分区调度器
///
/// 克隆得到的句柄共享同一组后台任务
#[derive(Clone)]
pub struct PartitionScheduler {
    inner: Arc<SchedulerInner>,
}

impl PartitionScheduler {
    pub fn new(
        factory: PartitionManagerFactory,
        retention: RetentionPolicy,
        config: &SchedulerConfig,
    ) -> Self {
        Self::with_schedules(
            factory,
            retention,
            config.weekly_schedule(),
            config.daily_schedule(),
        )
    }

    pub fn with_schedules(
        factory: PartitionManagerFactory,
        retention: RetentionPolicy,
        weekly: Schedule,
        daily: Schedule,
    ) -> Self {
        Self::with_clock(factory, retention, weekly, daily, Arc::new(SystemClock))
    }

    /// 使用指定时钟计算触发时间
    pub fn with_clock(
        factory: PartitionManagerFactory,
        retention: RetentionPolicy,
        weekly: Schedule,
        daily: Schedule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                factory,
                retention,
                weekly,
                daily,
                clock,
                run_lock: tokio::sync::Mutex::new(()),
                token: Mutex::new(CancellationToken::new()),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    fn handles(&self) -> MutexGuard<'_, Vec<(Job, JoinHandle<()>)>> {
        self.inner
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 当前的取消令牌；上一轮已停止时换新令牌
    fn active_token(&self) -> CancellationToken {
        let mut token = self
            .inner
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }

    /// 启动每周与每日两个任务
    pub fn start(&self) {
        self.start_weekly_scheduler();
        self.start_daily_scheduler();
    }

    /// 启动每周添加分区任务，已在运行时返回 false
    pub fn start_weekly_scheduler(&self) -> bool {
        self.spawn(Job::WeeklyAdd)
    }

    /// 启动每日清理任务，已在运行时返回 false
    pub fn start_daily_scheduler(&self) -> bool {
        self.spawn(Job::DailyCleanup)
    }

    fn spawn(&self, job: Job) -> bool {
        let token = self.active_token();
        let mut handles = self.handles();
        handles.retain(|(_, handle)| !handle.is_finished());
        if handles.iter().any(|(running, _)| *running == job) {
            warn!("{} scheduler is already running", job);
            return false;
        }

        let inner = self.inner.clone();
        let schedule = inner.schedule_for(job);
        let handle = tokio::spawn(async move {
            info!("{} scheduler started ({})", job, schedule);
            loop {
                let now = inner.clock.now();
                let next = schedule.next_after(now);
                let wait = (next - now).to_std().unwrap_or_default();
                info!("Next {} run at {}", job, next);

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }

                // 执行期间不响应取消，DDL 不会被中途打断
                if AssertUnwindSafe(inner.run(job)).catch_unwind().await.is_err() {
                    GLOBAL_METRICS.record_scheduler_run(job.as_str(), false);
                    error!("Scheduled {} run panicked, waiting for the next trigger", job);
                }
            }
            info!("{} scheduler stopped", job);
        });

        handles.push((job, handle));
        true
    }

    /// 立即执行一次每周任务
    pub async fn run_weekly_now(&self) -> Result<String> {
        self.inner.run_weekly().await
    }

    /// 立即执行一次每日任务
    pub async fn run_daily_now(&self) -> Result<CleanupSummary> {
        self.inner.run_daily().await
    }

    /// 取消后续触发，正在执行的任务会继续完成
    pub fn stop(&self) {
        self.inner
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
        info!("Partition scheduler stop requested");
    }

    /// 停止并等待所有后台任务退出
    pub async fn shutdown(&self) {
        self.stop();
        let handles = std::mem::take(&mut *self.handles());
        for (job, handle) in handles {
            if let Err(e) = handle.await {
                warn!("{} scheduler task ended abnormally: {}", job, e);
            }
        }
        info!("Partition scheduler shut down");
    }

    pub fn is_running(&self) -> bool {
        let cancelled = self
            .inner
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_cancelled();
        !cancelled && self.handles().iter().any(|(_, handle)| !handle.is_finished())
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.inner.retention
    }
}
