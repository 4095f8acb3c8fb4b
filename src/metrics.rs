//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区维护操作的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{span, Level};

/// 指标收集器
///
/// 进程内累积计数，用于日志输出与测试断言
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 操作总数
    /// key: "engine:op:result"
    pub operations_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时
    /// key: "engine:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
    /// 调度任务执行次数
    /// key: "job:result"
    pub scheduler_runs: Arc<Mutex<HashMap<String, u64>>>,
    /// 最近一次查询到的分区数
    pub partition_count: Arc<Mutex<HashMap<String, usize>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

impl Metrics {
    /// 记录分区操作
    ///
    /// # 参数
    ///
    /// * `engine` - 数据库引擎（mariadb/postgresql）
    /// * `op` - 操作类型（add/cleanup/info/check）
    /// * `success` - 是否成功
    pub fn record_operation(&self, engine: &str, op: &str, success: bool) {
        let result = result_label(success);
        let span = span!(Level::DEBUG, "partition_operation", engine, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", engine, op, result);
        if let Ok(mut map) = self.operations_total.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    /// 记录操作耗时
    pub fn record_duration(&self, engine: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", engine, op);
        if let Ok(mut map) = self.operation_duration.lock() {
            let entry = map.entry(key).or_insert((0.0, 0));
            entry.0 += duration_secs;
            entry.1 += 1;
        }
    }

    /// 记录调度任务执行结果
    pub fn record_scheduler_run(&self, job: &str, success: bool) {
        let key = format!("{}:{}", job, result_label(success));
        if let Ok(mut map) = self.scheduler_runs.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    pub fn set_partition_count(&self, table: &str, count: usize) {
        if let Ok(mut map) = self.partition_count.lock() {
            map.insert(table.to_string(), count);
        }
    }

    /// 操作计数快照
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.operations_total
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    pub fn operation_count(&self, engine: &str, op: &str, success: bool) -> u64 {
        let key = format!("{}:{}:{}", engine, op, result_label(success));
        self.operations_total
            .lock()
            .ok()
            .and_then(|map| map.get(&key).copied())
            .unwrap_or(0)
    }

    pub fn scheduler_run_count(&self, job: &str, success: bool) -> u64 {
        let key = format!("{}:{}", job, result_label(success));
        self.scheduler_runs
            .lock()
            .ok()
            .and_then(|map| map.get(&key).copied())
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为文本，每行一个样本
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    let mut ops: Vec<_> = metrics.snapshot().into_iter().collect();
    ops.sort();
    for (k, v) in ops {
        output.push_str(&format!(
            "partition_operations_total{{labels=\"{}\"}} {}\n",
            k, v
        ));
    }
    if let Ok(dur) = metrics.operation_duration.lock() {
        for (k, (total, count)) in dur.iter() {
            if let Some((engine, op)) = k.split_once(':') {
                output.push_str(&format!(
                    "partition_operation_duration_seconds_sum{{engine=\"{}\", operation=\"{}\"}} {}\n",
                    engine, op, total
                ));
                output.push_str(&format!(
                    "partition_operation_duration_seconds_count{{engine=\"{}\", operation=\"{}\"}} {}\n",
                    engine, op, count
                ));
            }
        }
    }
    if let Ok(runs) = metrics.scheduler_runs.lock() {
        for (k, v) in runs.iter() {
            output.push_str(&format!(
                "partition_scheduler_runs_total{{labels=\"{}\"}} {}\n",
                k, v
            ));
        }
    }
    if let Ok(counts) = metrics.partition_count.lock() {
        for (k, v) in counts.iter() {
            output.push_str(&format!("partition_count{{table=\"{}\"}} {}\n", k, v));
        }
    }
    output
}
