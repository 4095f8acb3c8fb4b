//! weekpart - 按周分区的表生命周期管理
//!
//! 为MariaDB/MySQL范围分区表和PostgreSQL声明式分区表提供
//! 周分区的添加、查询、过期清理，以及定时调度执行。

#![doc(html_root_url = "https://docs.rs/weekpart/0.1.0")]

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod scheduler;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use config::Config;
pub use database::{
    DbEngine, PartitionBackend, PartitionBoundary, PartitionDescriptor, RetentionPolicy, WeekKey,
};
pub use error::{PartitionError, Result};
pub use manager::{CheckReport, PartitionManager, PartitionManagerFactory, StepOutcome};
pub use scheduler::{PartitionScheduler, Schedule};

/// weekpart 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
