//! 查询过滤语言
//!
//! 将 `salary=gt!1000.0|lt!10000.0` 这类URL查询值解析为定型规则，
//! 并渲染为参数化的 SQL `WHERE` 子句。
//!
//! ```text
//! raw value ─▶ lexer ─▶ tokens ─▶ parser ─▶ Filter ─▶ sql_compiler ─▶ WhereClause
//! ```

pub mod ast;
pub mod config;
pub mod filter;
pub mod lexer;
pub mod parser;
pub mod sql_compiler;
pub mod token;

pub use ast::{Comparator, Rule, ScalarType};
pub use config::{ConfigError, FilterConfig, KeyConfig};
pub use filter::{Filter, FilterKey, Primitive, StoredRule, Timestamp};
pub use parser::{FilterParser, GrammarProfile, ParseError, QuerySource, TimestampFormat};
pub use sql_compiler::{
    CompileError, PlaceholderStyle, SortOrder, SqlBuilder, SqlCompiler, WhereClause,
};
