//! 语法分析器、过滤器存储和SQL编译器共用的基础类型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 键的标量类型，字面值按此类型解码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Integer,         // i64
    UnsignedInteger, // u64
    Float,           // f64
    String,
    Timestamp, // DateTime<FixedOffset>
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Integer => "integer",
            ScalarType::UnsignedInteger => "unsigned integer",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// 规则对其取值应用的比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Equals,         // eq
    LessThan,       // lt
    GreaterThan,    // gt
    LessOrEqual,    // le
    GreaterOrEqual, // ge
    Like,           // like, lk
    Is,             // is
}

impl Comparator {
    /// 解析过滤值中书写的比较关键字
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "eq" => Some(Comparator::Equals),
            "lt" => Some(Comparator::LessThan),
            "gt" => Some(Comparator::GreaterThan),
            "le" => Some(Comparator::LessOrEqual),
            "ge" => Some(Comparator::GreaterOrEqual),
            "like" | "lk" => Some(Comparator::Like),
            "is" => Some(Comparator::Is),
            _ => None,
        }
    }

    /// 该比较运算符的规范关键字
    pub fn keyword(self) -> &'static str {
        match self {
            Comparator::Equals => "eq",
            Comparator::LessThan => "lt",
            Comparator::GreaterThan => "gt",
            Comparator::LessOrEqual => "le",
            Comparator::GreaterOrEqual => "ge",
            Comparator::Like => "like",
            Comparator::Is => "is",
        }
    }

    /// 只有相等和成员比较可以携带多个值
    pub fn is_membership(self) -> bool {
        matches!(self, Comparator::Equals | Comparator::Is)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Comparator::Equals => "Equals",
            Comparator::LessThan => "LessThan",
            Comparator::GreaterThan => "GreaterThan",
            Comparator::LessOrEqual => "LessOrEqual",
            Comparator::GreaterOrEqual => "GreaterOrEqual",
            Comparator::Like => "Like",
            Comparator::Is => "Is",
        };
        f.write_str(name)
    }
}

/// 解码后的规则：一个比较运算符及其取值
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<T> {
    pub comparator: Comparator,
    pub values: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_resolve() {
        assert_eq!(Comparator::from_keyword("eq"), Some(Comparator::Equals));
        assert_eq!(Comparator::from_keyword("ge"), Some(Comparator::GreaterOrEqual));
        assert_eq!(Comparator::from_keyword("like"), Some(Comparator::Like));
        assert_eq!(Comparator::from_keyword("lk"), Some(Comparator::Like));
        assert_eq!(Comparator::from_keyword("is"), Some(Comparator::Is));
        assert_eq!(Comparator::from_keyword("EQ"), None);
        assert_eq!(Comparator::from_keyword("ne"), None);
    }

    #[test]
    fn test_keyword_round_trip() {
        for comparator in [
            Comparator::Equals,
            Comparator::LessThan,
            Comparator::GreaterThan,
            Comparator::LessOrEqual,
            Comparator::GreaterOrEqual,
            Comparator::Like,
            Comparator::Is,
        ] {
            assert_eq!(Comparator::from_keyword(comparator.keyword()), Some(comparator));
        }
    }

    #[test]
    fn test_scalar_type_serde_names() {
        let ty: ScalarType = serde_json::from_str(r#""unsigned_integer""#).unwrap();
        assert_eq!(ty, ScalarType::UnsignedInteger);
        assert_eq!(serde_json::to_string(&ScalarType::Timestamp).unwrap(), r#""timestamp""#);
    }
}
