//! 解析后规则的按列存储
//!
//! 每种标量类型的取值存放在各自只追加的数组中。每个键持有有序的规则列表，
//! 规则通过索引区间引用其在数组中的取值，不为单条规则装箱或复制取值。

use chrono::{DateTime, FixedOffset};
use std::ops::Range;

use crate::ast::{Comparator, Rule, ScalarType};

/// [`ScalarType::Timestamp`] 键使用的时间戳类型
pub type Timestamp = DateTime<FixedOffset>;

/// 存储形式的规则：比较运算符及其取值的索引区间
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRule {
    pub comparator: Comparator,
    pub indices: Range<usize>,
}

/// 具名、定型的键，累积其规则
#[derive(Debug, Clone, PartialEq)]
pub struct FilterKey {
    name: String,
    scalar: ScalarType,
    rules: Vec<StoredRule>,
}

impl FilterKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    pub fn rules(&self) -> &[StoredRule] {
        &self.rules
    }
}

/// 键及其规则，以及规则所索引的各类型取值数组
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    keys: Vec<FilterKey>,

    integers: Vec<i64>,
    unsigned: Vec<u64>,
    floats: Vec<f64>,
    strings: Vec<String>,
    timestamps: Vec<Timestamp>,
}

mod sealed {
    pub trait Sealed {}
}

/// 过滤器可存储的取值类型，每个实现对应一个数组
pub trait Primitive: Clone + sealed::Sealed {
    const SCALAR: ScalarType;

    #[doc(hidden)]
    fn arena(filter: &Filter) -> &[Self];

    #[doc(hidden)]
    fn arena_mut(filter: &mut Filter) -> &mut Vec<Self>;
}

macro_rules! primitive {
    ($ty:ty, $scalar:ident, $field:ident) => {
        impl sealed::Sealed for $ty {}

        impl Primitive for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;

            fn arena(filter: &Filter) -> &[Self] {
                &filter.$field
            }

            fn arena_mut(filter: &mut Filter) -> &mut Vec<Self> {
                &mut filter.$field
            }
        }
    };
}

primitive!(i64, Integer, integers);
primitive!(u64, UnsignedInteger, unsigned);
primitive!(f64, Float, floats);
primitive!(String, String, strings);
primitive!(Timestamp, Timestamp, timestamps);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将 `values` 追加到 `T` 数组，并记为 `key` 的一条规则
    ///
    /// 键不存在时以类型 `T` 创建。向已有键追加其他类型的取值属于调用方错误，
    /// 规则会索引到错误的数组。
    pub fn add<T: Primitive>(
        &mut self,
        key: &str,
        values: impl IntoIterator<Item = T>,
        comparator: Comparator,
    ) {
        let arena = T::arena_mut(self);
        let start = arena.len();
        arena.extend(values);
        let rule = StoredRule {
            comparator,
            indices: start..arena.len(),
        };

        match self.keys.iter_mut().find(|k| k.name == key) {
            Some(existing) => {
                debug_assert_eq!(
                    existing.scalar,
                    T::SCALAR,
                    "key `{key}` was declared as {}",
                    existing.scalar
                );
                existing.rules.push(rule);
            }
            None => self.keys.push(FilterKey {
                name: key.to_string(),
                scalar: T::SCALAR,
                rules: vec![rule],
            }),
        }
    }

    /// 返回 `key` 按 `T` 解码的规则
    ///
    /// 未知键或类型不符的键返回空列表。
    pub fn get<T: Primitive>(&self, key: &str) -> Vec<Rule<T>> {
        let Some(key) = self.key(key).filter(|k| k.scalar == T::SCALAR) else {
            return Vec::new();
        };

        key.rules
            .iter()
            .map(|rule| Rule {
                comparator: rule.comparator,
                values: self.values::<T>(rule).map(<[T]>::to_vec).unwrap_or_default(),
            })
            .collect()
    }

    /// 返回规则引用的取值切片，区间超出本过滤器的 `T` 数组时返回 `None`
    pub fn values<T: Primitive>(&self, rule: &StoredRule) -> Option<&[T]> {
        T::arena(self).get(rule.indices.clone())
    }

    pub fn key(&self, name: &str) -> Option<&FilterKey> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// 按首次添加顺序返回键
    pub fn keys(&self) -> impl Iterator<Item = &FilterKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut filter = Filter::new();
        filter.add("age", [22i64], Comparator::GreaterThan);
        filter.add("name", ["John".to_string()], Comparator::Like);

        let age = filter.get::<i64>("age");
        assert_eq!(
            age,
            vec![Rule {
                comparator: Comparator::GreaterThan,
                values: vec![22]
            }]
        );

        let name = filter.get::<String>("name");
        assert_eq!(name.len(), 1);
        assert_eq!(name[0].comparator, Comparator::Like);
        assert_eq!(name[0].values, vec!["John".to_string()]);
    }

    #[test]
    fn test_rules_accumulate_in_order() {
        let mut filter = Filter::new();
        filter.add("age", [20i64], Comparator::GreaterThan);
        filter.add("age", [60i64], Comparator::LessThan);

        let rules = filter.get::<i64>("age");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].comparator, Comparator::GreaterThan);
        assert_eq!(rules[0].values, vec![20]);
        assert_eq!(rules[1].comparator, Comparator::LessThan);
        assert_eq!(rules[1].values, vec![60]);
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_type_mismatch_and_unknown_key_are_empty() {
        let mut filter = Filter::new();
        filter.add("salary", [3000.0f64], Comparator::LessOrEqual);

        assert!(filter.get::<i64>("salary").is_empty());
        assert!(filter.get::<f64>("missing").is_empty());
        assert_eq!(filter.get::<f64>("salary")[0].values, vec![3000.0]);
    }

    #[test]
    fn test_indices_stay_valid_across_keys() {
        let mut filter = Filter::new();
        filter.add("role", ["a".to_string(), "b".to_string()], Comparator::Equals);
        filter.add("views", [1u64], Comparator::GreaterThan);
        filter.add("name", ["c".to_string()], Comparator::Like);
        filter.add("role", ["d".to_string()], Comparator::Is);
        filter.add("views", [5u64, 6, 7], Comparator::Equals);

        for key in filter.keys() {
            for rule in key.rules() {
                let len = match key.scalar_type() {
                    ScalarType::String => filter.strings.len(),
                    ScalarType::UnsignedInteger => filter.unsigned.len(),
                    _ => unreachable!(),
                };
                assert!(rule.indices.end <= len);
            }
        }

        let role = filter.get::<String>("role");
        assert_eq!(role[0].values, vec!["a", "b"]);
        assert_eq!(role[1].values, vec!["d"]);
        assert_eq!(filter.key("role").unwrap().rules()[1].indices, 3..4);
        assert_eq!(filter.get::<u64>("views")[1].values, vec![5, 6, 7]);
    }

    #[test]
    fn test_values_of_foreign_rule() {
        let mut large = Filter::new();
        large.add("id", [1i64, 2, 3, 4], Comparator::Equals);
        let mut small = Filter::new();
        small.add("id", [9i64], Comparator::Equals);

        let rule = &large.key("id").unwrap().rules()[0];
        assert_eq!(large.values::<i64>(rule), Some(&[1i64, 2, 3, 4][..]));
        assert_eq!(small.values::<i64>(rule), None);
        assert_eq!(small.values::<String>(rule), None);
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let mut filter = Filter::new();
        filter.add("b", [1i64], Comparator::Equals);
        filter.add("a", [2i64], Comparator::Equals);
        filter.add("b", [3i64], Comparator::Equals);

        let names: Vec<_> = filter.keys().map(FilterKey::name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_timestamps() {
        let at = DateTime::parse_from_rfc3339("2023-05-02T09:34:01Z").unwrap();
        let mut filter = Filter::new();
        filter.add("employed_since", [at], Comparator::GreaterOrEqual);

        let rules = filter.get::<Timestamp>("employed_since");
        assert_eq!(rules[0].values[0], at);
        assert_eq!(filter.key("employed_since").unwrap().scalar_type(), ScalarType::Timestamp);
    }
}
