//! 过滤值的语法分析器，校验语法并构建规则
//!
//! ## 解析流程图
//!
//! ```text
//! FilterParser::parse(source)
//!   └─ 遍历 source 中存在的已声明 (键, 类型)
//!        └─ parse_key()
//!             ├─ tokenize(raw)
//!             ├─ 0 或 1 个 token → 以 token 文本构建 Equals 规则
//!             └─ 否则追加 End 并运行状态机：
//!
//!                 start ──Identifier──▶ Identifier ──Mark──▶ Mark ──Value──▶ Value
//!                                           ▲                                 │ │ │
//!                                           └───────────Bar◀──────────────────┘ │ │
//!                                                       Comma (仅列表)     ◀────┘ │
//!                                                       End ◀─────────────────────┘
//! ```
//!
//! `Bar` 和 `End` 结束当前分组：分组内的字面值按键的类型解码，
//! 作为一条规则追加到过滤器。
//!
//! ## 示例
//!
//! ```text
//! name=roberto                 name Equals ["roberto"]
//! salary=gt!1000.0|lt!10000.0  salary GreaterThan [1000.0], LessThan [10000.0]
//! role=eq!Programmer,Tester    role Equals ["Programmer", "Tester"]
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use thiserror::Error;

use crate::ast::{Comparator, ScalarType};
use crate::filter::{Filter, Primitive, Timestamp};
use crate::lexer::tokenize;
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("key `{key}`: expected {expected}, found {found} at byte {}", .span.start)]
    UnexpectedToken {
        key: String,
        expected: &'static str,
        found: String,
        span: Span,
    },

    #[error("key `{key}`: expected valid comparator, got `{found}`")]
    InvalidComparator { key: String, found: String, span: Span },

    #[error("key `{key}`: comma is only supported on the {allowed} comparator, found after `{}`", .comparator.keyword())]
    CommaNotAllowed {
        key: String,
        comparator: Comparator,
        allowed: &'static str,
        span: Span,
    },

    #[error("key `{key}`: value `{value}` is an invalid {target}")]
    Conversion {
        key: String,
        value: String,
        target: String,
    },
}

/// 时间戳字面值的解码方式
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    #[default]
    Rfc3339,
    /// chrono `strftime` 格式，不含时区偏移的格式按 UTC 解析
    Pattern(String),
}

impl TimestampFormat {
    pub fn parse(&self, raw: &str) -> Option<Timestamp> {
        match self {
            TimestampFormat::Rfc3339 => DateTime::parse_from_rfc3339(raw).ok(),
            TimestampFormat::Pattern(pattern) => DateTime::parse_from_str(raw, pattern)
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(raw, pattern)
                        .ok()
                        .map(|naive| naive.and_utc().fixed_offset())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, pattern)
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc().fixed_offset())
                }),
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampFormat::Rfc3339 => f.write_str("RFC 3339"),
            TimestampFormat::Pattern(pattern) => write!(f, "`{pattern}`"),
        }
    }
}

/// 哪些比较运算符接受逗号分隔的列表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarProfile {
    /// `eq` 和 `is` 都接受列表
    #[default]
    Unified,
    /// 只有 `is` 接受列表，`eq` 只能单值
    StrictIs,
}

impl GrammarProfile {
    pub fn accepts_list(self, comparator: Comparator) -> bool {
        match self {
            GrammarProfile::Unified => comparator.is_membership(),
            GrammarProfile::StrictIs => comparator == Comparator::Is,
        }
    }

    fn list_comparators(self) -> &'static str {
        match self {
            GrammarProfile::Unified => "`eq`/`is`",
            GrammarProfile::StrictIs => "`is`",
        }
    }
}

/// 语法分析器读取原始过滤值的键值输入
pub trait QuerySource {
    fn lookup(&self, key: &str) -> Option<&str>;
}

impl<K, V, S> QuerySource for HashMap<K, V, S>
where
    K: Borrow<str> + Hash + Eq,
    V: AsRef<str>,
    S: BuildHasher,
{
    fn lookup(&self, key: &str) -> Option<&str> {
        self.get(key).map(AsRef::as_ref)
    }
}

impl<K, V> QuerySource for BTreeMap<K, V>
where
    K: Borrow<str> + Ord,
    V: AsRef<str>,
{
    fn lookup(&self, key: &str) -> Option<&str> {
        self.get(key).map(AsRef::as_ref)
    }
}

/// 按原始顺序排列的键值对，同名键取第一次出现的值
impl<K: AsRef<str>, V: AsRef<str>> QuerySource for [(K, V)] {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v.as_ref())
    }
}

impl<K: AsRef<str>, V: AsRef<str>, const N: usize> QuerySource for [(K, V); N] {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.as_slice().lookup(key)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> QuerySource for Vec<(K, V)> {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.as_slice().lookup(key)
    }
}

/// 将字面值解码为可存储的标量类型
trait Decode: Primitive + Sized {
    fn decode(raw: &str, format: &TimestampFormat) -> Option<Self>;

    fn target(_format: &TimestampFormat) -> String {
        Self::SCALAR.to_string()
    }
}

impl Decode for i64 {
    fn decode(raw: &str, _: &TimestampFormat) -> Option<Self> {
        raw.parse().ok()
    }
}

impl Decode for u64 {
    fn decode(raw: &str, _: &TimestampFormat) -> Option<Self> {
        raw.parse().ok()
    }
}

impl Decode for f64 {
    fn decode(raw: &str, _: &TimestampFormat) -> Option<Self> {
        raw.parse().ok()
    }
}

impl Decode for String {
    fn decode(raw: &str, _: &TimestampFormat) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl Decode for Timestamp {
    fn decode(raw: &str, format: &TimestampFormat) -> Option<Self> {
        format.parse(raw)
    }

    fn target(format: &TimestampFormat) -> String {
        format!("{format} timestamp")
    }
}

/// 已声明的键及其取值的解码方式
///
/// 同一个语法分析器可重复用于任意多次输入。
#[derive(Debug, Clone, Default)]
pub struct FilterParser {
    keys: Vec<(String, ScalarType)>,
    timestamp_format: TimestampFormat,
    profile: GrammarProfile,
}

impl FilterParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn with_profile(mut self, profile: GrammarProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn add_key(&mut self, key: impl Into<String>, scalar: ScalarType) -> &mut Self {
        self.keys.push((key.into(), scalar));
        self
    }

    pub fn add_int(&mut self, key: impl Into<String>) -> &mut Self {
        self.add_key(key, ScalarType::Integer)
    }

    pub fn add_uint(&mut self, key: impl Into<String>) -> &mut Self {
        self.add_key(key, ScalarType::UnsignedInteger)
    }

    pub fn add_float(&mut self, key: impl Into<String>) -> &mut Self {
        self.add_key(key, ScalarType::Float)
    }

    pub fn add_string(&mut self, key: impl Into<String>) -> &mut Self {
        self.add_key(key, ScalarType::String)
    }

    pub fn add_timestamp(&mut self, key: impl Into<String>) -> &mut Self {
        self.add_key(key, ScalarType::Timestamp)
    }

    /// 按声明顺序返回已声明的键
    pub fn keys(&self) -> &[(String, ScalarType)] {
        &self.keys
    }

    pub fn timestamp_format(&self) -> &TimestampFormat {
        &self.timestamp_format
    }

    pub fn profile(&self) -> GrammarProfile {
        self.profile
    }

    /// 将 `source` 中存在的已声明键解析为新的过滤器
    ///
    /// 忽略未声明的键，遇到第一个错误即终止整个解析。
    pub fn parse<S: QuerySource + ?Sized>(&self, source: &S) -> Result<Filter, ParseError> {
        let mut filter = Filter::new();
        for (key, scalar) in &self.keys {
            let Some(raw) = source.lookup(key) else {
                continue;
            };
            self.parse_key(key, *scalar, raw, &mut filter)?;
        }

        tracing::debug!(keys = filter.len(), "Parsed filter");
        Ok(filter)
    }

    /// 解析单个原始值，并将规则追加到 `filter` 的 `key` 下
    pub fn parse_key(
        &self,
        key: &str,
        scalar: ScalarType,
        raw: &str,
        filter: &mut Filter,
    ) -> Result<(), ParseError> {
        let mut tokens = tokenize(raw);
        tracing::trace!(key, ?tokens, "Tokenized filter value");

        // 简写形式 `key=value`
        if tokens.len() <= 1 {
            let text = tokens.first().map(|t| t.text.as_ref()).unwrap_or_default();
            return self.commit(key, scalar, Comparator::Equals, &[text], filter);
        }

        tokens.push(Token::end(raw.len()));
        self.build_rules(key, scalar, &tokens, filter)
    }

    fn build_rules(
        &self,
        key: &str,
        scalar: ScalarType,
        tokens: &[Token<'_>],
        filter: &mut Filter,
    ) -> Result<(), ParseError> {
        let mut last: Option<TokenKind> = None;
        let mut comparator = Comparator::Equals;
        let mut literals: Vec<&str> = Vec::new();

        for token in tokens {
            let valid = match token.kind {
                TokenKind::Identifier => matches!(last, None | Some(TokenKind::Bar)),
                TokenKind::Mark => last == Some(TokenKind::Identifier),
                TokenKind::Value => matches!(last, Some(TokenKind::Mark | TokenKind::Comma)),
                TokenKind::Comma | TokenKind::Bar | TokenKind::End => {
                    last == Some(TokenKind::Value)
                }
            };
            if !valid {
                return Err(ParseError::UnexpectedToken {
                    key: key.to_string(),
                    expected: expected_after(last),
                    found: describe(token),
                    span: token.span,
                });
            }

            match token.kind {
                TokenKind::Identifier => {
                    comparator = Comparator::from_keyword(&token.text).ok_or_else(|| {
                        ParseError::InvalidComparator {
                            key: key.to_string(),
                            found: token.text.to_string(),
                            span: token.span,
                        }
                    })?;
                }
                TokenKind::Comma if !self.profile.accepts_list(comparator) => {
                    return Err(ParseError::CommaNotAllowed {
                        key: key.to_string(),
                        comparator,
                        allowed: self.profile.list_comparators(),
                        span: token.span,
                    });
                }
                TokenKind::Value => literals.push(&token.text),
                TokenKind::Bar | TokenKind::End => {
                    self.commit(key, scalar, comparator, &literals, filter)?;
                    literals.clear();
                }
                _ => {}
            }
            last = Some(token.kind);
        }

        Ok(())
    }

    /// 解码一组字面值并存为一条规则
    fn commit(
        &self,
        key: &str,
        scalar: ScalarType,
        comparator: Comparator,
        literals: &[&str],
        filter: &mut Filter,
    ) -> Result<(), ParseError> {
        match scalar {
            ScalarType::Integer => self.push::<i64>(key, comparator, literals, filter),
            ScalarType::UnsignedInteger => self.push::<u64>(key, comparator, literals, filter),
            ScalarType::Float => self.push::<f64>(key, comparator, literals, filter),
            ScalarType::String => self.push::<String>(key, comparator, literals, filter),
            ScalarType::Timestamp => self.push::<Timestamp>(key, comparator, literals, filter),
        }
    }

    fn push<T: Decode>(
        &self,
        key: &str,
        comparator: Comparator,
        literals: &[&str],
        filter: &mut Filter,
    ) -> Result<(), ParseError> {
        let values = literals
            .iter()
            .map(|raw| {
                T::decode(raw, &self.timestamp_format).ok_or_else(|| ParseError::Conversion {
                    key: key.to_string(),
                    value: raw.to_string(),
                    target: T::target(&self.timestamp_format),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::trace!(key, %comparator, count = values.len(), "Appending rule");
        filter.add(key, values, comparator);
        Ok(())
    }
}

/// 上一个token之后语法允许出现的内容
fn expected_after(last: Option<TokenKind>) -> &'static str {
    match last {
        None | Some(TokenKind::Bar) => "comparator",
        Some(TokenKind::Identifier) => "`!`",
        Some(TokenKind::Mark) | Some(TokenKind::Comma) => "value",
        Some(TokenKind::Value) => "`,`, `|` or end of input",
        Some(TokenKind::End) => "nothing",
    }
}

fn describe(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::End => TokenKind::End.to_string(),
        kind => format!("{kind} `{}`", token.text),
    }
}
