//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块

pub mod redaction;
