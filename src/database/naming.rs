//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分区命名规则与SQL标识符的校验、转义工具。

use super::week::WeekKey;
use crate::error::{PartitionError, Result};

/// PostgreSQL 标识符上限为63字节，MySQL为64，取较小值
pub const MAX_IDENTIFIER_LEN: usize = 63;

const DATE_SUFFIX_FORMAT: &str = "%Y%m%d";

/// 分区命名规则
///
/// 两种规则在数十年范围内都是单射的：不同的周不会得到相同的分区名
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingScheme {
    /// 范围分区：`p` + 年 + 两位周号，例如 `p202501`
    Range,
    /// 声明式分区：`<表名>_<周一日期>`，例如 `check_server_log_dtl_20241230`
    Declarative { table: String },
}

impl NamingScheme {
    /// 生成分区名称
    pub fn partition_name(&self, week: WeekKey) -> String {
        match self {
            NamingScheme::Range => format!("p{:04}{:02}", week.year(), week.week()),
            NamingScheme::Declarative { table } => {
                format!("{}_{}", table, week.monday().format(DATE_SUFFIX_FORMAT))
            }
        }
    }

}

/// 验证 SQL 标识符是否安全（防止 SQL 注入）
///
/// 标识符只能包含ASCII字母、数字、下划线，且必须以字母或下划线开头
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(PartitionError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(PartitionError::InvalidIdentifier(format!(
            "'{}' exceeds maximum length of {} characters",
            identifier, MAX_IDENTIFIER_LEN
        )));
    }

    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(PartitionError::InvalidIdentifier(format!(
            "'{}': only alphanumeric characters and underscores are allowed",
            identifier
        )));
    }

    let first_char = identifier.chars().next().unwrap_or('0');
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(PartitionError::InvalidIdentifier(format!(
            "'{}': must start with a letter or underscore",
            identifier
        )));
    }

    let reserved_keywords = [
        "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TABLE", "INDEX",
        "WHERE", "FROM", "JOIN", "UNION", "OR", "AND", "NOT", "NULL", "TRUE", "FALSE", "IS", "IN",
        "LIKE", "BETWEEN", "ORDER", "BY", "GROUP", "HAVING", "LIMIT", "OFFSET", "PARTITION",
        "MAXVALUE", "DEFAULT",
    ];

    let upper_identifier = identifier.to_uppercase();
    if reserved_keywords.contains(&upper_identifier.as_str()) {
        return Err(PartitionError::InvalidIdentifier(format!(
            "'{}': reserved keyword",
            identifier
        )));
    }

    Ok(())
}

/// 转义 MySQL 标识符（反引号）
pub fn quote_mysql(identifier: &str) -> String {
    format!("`{}`", identifier)
}

/// 转义 PostgreSQL 标识符（双引号）
pub fn quote_postgres(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}
