//! 连接字符串构建模块
//!
//! 由配置中的 host/port/user/password/database 组装 sqlx 可识别的连接串。

use super::DbEngine;
use crate::config::DbConfig;
use secrecy::{ExposeSecret, SecretString};

/// MariaDB 连接使用的字符集参数
const MYSQL_CHARSET_PARAMS: &str = "charset=utf8mb4&collation=utf8mb4_unicode_ci";

/// 构建连接串
///
/// 结果含口令，因此以 `SecretString` 返回；写日志前需经过脱敏
pub fn build_connection_url(engine: DbEngine, config: &DbConfig) -> SecretString {
    let scheme = match engine {
        DbEngine::MariaDb => "mysql",
        DbEngine::PostgreSql => "postgres",
    };
    let port = config.port.unwrap_or_else(|| engine.default_port());

    let credentials = match &config.password {
        Some(password) if !password.expose_secret().is_empty() => format!(
            "{}:{}",
            encode_component(&config.user),
            encode_component(password.expose_secret())
        ),
        _ => encode_component(&config.user),
    };

    let mut url = format!(
        "{}://{}@{}:{}/{}",
        scheme,
        credentials,
        config.host,
        port,
        encode_component(&config.database)
    );
    if engine == DbEngine::MariaDb {
        url.push('?');
        url.push_str(MYSQL_CHARSET_PARAMS);
    }

    SecretString::from(url)
}

/// 百分号编码，保留 RFC 3986 非保留字符
fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
