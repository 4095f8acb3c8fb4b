//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use crate::database::DbEngine;
use crate::telemetry::init_tracing;
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod partition;
mod schedule;

#[derive(Parser, Debug)]
#[command(name = "manage-partitions")]
#[command(author, version, about = "Weekly table partition maintenance", long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        long = "db-type",
        value_enum,
        global = true,
        default_value_t = DbTypeArg::Mariadb,
        help = "Database engine to manage"
    )]
    pub db_type: DbTypeArg,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbTypeArg {
    Mariadb,
    Postgresql,
}

impl From<DbTypeArg> for DbEngine {
    fn from(arg: DbTypeArg) -> Self {
        match arg {
            DbTypeArg::Mariadb => DbEngine::MariaDb,
            DbTypeArg::Postgresql => DbEngine::PostgreSql,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "init", about = "Check partitions and repair them (cleanup + add next week)")]
    Init(CheckArgs),

    #[command(name = "add", about = "Add the partition for an ISO week")]
    Add(AddArgs),

    #[command(name = "cleanup", about = "Drop partitions older than the retention window")]
    Cleanup(CleanupArgs),

    #[command(name = "info", about = "List partitions with row counts and sizes")]
    Info,

    #[command(name = "check", about = "Check partitions and repair them (cleanup + add next week)")]
    Check(CheckArgs),

    #[command(name = "schedule", about = "Run the partition scheduler")]
    Schedule(ScheduleArgs),
}

#[derive(Parser, Debug)]
pub struct AddArgs {
    #[arg(help = "ISO week-numbering year")]
    pub year: i32,

    #[arg(help = "ISO week number (1-53)")]
    pub week: u32,
}

#[derive(Parser, Debug)]
pub struct CleanupArgs {
    #[arg(help = "Number of most recent weeks to keep")]
    pub keep_weeks: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[arg(long = "keep-weeks", help = "Number of most recent weeks to keep")]
    pub keep_weeks: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    pub command: ScheduleCommand,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    #[command(name = "start", about = "Run weekly/daily partition jobs until interrupted")]
    Start {
        #[arg(long, help = "Run both jobs once immediately")]
        run_now: bool,

        #[arg(long = "keep-weeks", help = "Number of most recent weeks to keep")]
        keep_weeks: Option<u32>,
    },

    #[command(name = "stop", about = "Explain how to stop a running scheduler")]
    Stop,
}

/// 解析参数；帮助与版本信息正常退出，参数错误以状态码 1 退出
fn parse_args() -> Option<Cli> {
    match Cli::try_parse() {
        Ok(cli) => Some(cli),
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                let _ = e.print();
                None
            }
            _ => {
                let _ = e.print();
                std::process::exit(1);
            }
        },
    }
}

pub async fn run() -> Result<()> {
    let Some(cli) = parse_args() else {
        return Ok(());
    };

    let default_filter = match cli.command {
        Commands::Schedule(_) => "info",
        _ => "warn",
    };
    init_tracing("manage-partitions", default_filter);

    let engine = DbEngine::from(cli.db_type);
    let load_config = || {
        Config::load(cli.config.as_deref(), engine).context("Failed to load configuration")
    };

    match &cli.command {
        Commands::Init(args) => partition::check(&load_config()?, engine, args, cli.json, true).await,
        Commands::Add(args) => partition::add(load_config, engine, args, cli.json).await,
        Commands::Cleanup(args) => partition::cleanup(&load_config()?, engine, args, cli.json).await,
        Commands::Info => partition::info(&load_config()?, engine, cli.json).await,
        Commands::Check(args) => {
            partition::check(&load_config()?, engine, args, cli.json, false).await
        }
        Commands::Schedule(args) => match &args.command {
            ScheduleCommand::Start {
                run_now,
                keep_weeks,
            } => schedule::start(&load_config()?, engine, *keep_weeks, *run_now).await,
            ScheduleCommand::Stop => {
                schedule::stop();
                Ok(())
            }
        },
    }
}
