//! 配置模块，负责从JSON加载过滤键声明
//!
//! ```json
//! {
//!   "placeholder": "numbered",
//!   "profile": "unified",
//!   "timestamp_format": "%Y-%m-%d %H:%M:%S",
//!   "keys": [
//!     { "name": "age", "type": "integer", "column": "employees.age" },
//!     { "name": "role", "type": "string" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ast::ScalarType;
use crate::parser::{FilterParser, GrammarProfile, TimestampFormat};
use crate::sql_compiler::{PlaceholderStyle, SqlCompiler};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// 单个键的声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub scalar: ScalarType,
    /// 键对应的列名，缺省时使用键名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl KeyConfig {
    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// 一个过滤入口的键声明及渲染选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub placeholder: PlaceholderStyle,
    #[serde(default)]
    pub profile: GrammarProfile,
    /// chrono `strftime` 格式，缺省为 RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
    /// 按声明顺序排列的键
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

impl FilterConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_json_str(&content)?;
        tracing::debug!(path = %path.display(), keys = config.keys.len(), "Loaded filter config");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// 创建声明了全部配置键的语法分析器
    pub fn parser(&self) -> FilterParser {
        let format = match &self.timestamp_format {
            Some(pattern) => TimestampFormat::Pattern(pattern.clone()),
            None => TimestampFormat::Rfc3339,
        };

        let mut parser = FilterParser::new()
            .with_timestamp_format(format)
            .with_profile(self.profile);
        for key in &self.keys {
            parser.add_key(key.name.clone(), key.scalar);
        }
        parser
    }

    /// 键名到列名的映射
    pub fn column_mapping(&self) -> HashMap<String, String> {
        self.keys
            .iter()
            .map(|key| (key.name.clone(), key.column().to_string()))
            .collect()
    }

    pub fn compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.placeholder).with_columns(self.column_mapping())
    }
}
