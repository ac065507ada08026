//! SQL编译器，将 [`Filter`] 编译为参数化的 WHERE 子句
//!
//! 按存储顺序遍历键、按插入顺序遍历规则，每条规则生成一个布尔表达式，
//! 全部以 `AND` 连接。`render` 输出带 `?` 或 `$n` 占位符的文本，
//! `to_condition` 则将相同的谓词构建为 sea-query [`Condition`]。

use sea_query::{BinOper, Condition, Expr, Iden, SimpleExpr, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::ast::{Comparator, ScalarType};
use crate::filter::{Filter, FilterKey, Primitive, StoredRule, Timestamp};

/// 参数占位符语法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// 每个参数使用 `?`（MySQL、SQLite）
    #[default]
    Positional,
    /// `$1`、`$2`……在整个子句内连续编号（PostgreSQL）
    Numbered,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("column mapping is not set")]
    MissingColumnMapping,

    #[error("key `{key}`: {comparator} takes exactly one value, got {count}")]
    MultipleValues {
        key: String,
        comparator: Comparator,
        count: usize,
    },

    #[error("key `{key}`: {comparator} rule has no values")]
    EmptyRule { key: String, comparator: Comparator },
}

/// 列名标识符包装器
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        // 写入查询缓冲区不会失败
        let _ = s.write_str(&self.0);
    }
}

/// 渲染后的 WHERE 子句及其占位符对应的参数
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    /// `WHERE ...`，没有已映射键的规则时为空
    pub sql: String,
    pub params: Vec<Value>,
}

/// 可作为数据库参数传递的规则取值
trait SqlParam: Primitive {
    fn to_value(&self) -> Value;

    /// `LIKE` 使用的前缀匹配模式
    fn like_pattern(&self) -> String;
}

macro_rules! sql_param {
    ($($ty:ty),*) => {
        $(
            impl SqlParam for $ty {
                fn to_value(&self) -> Value {
                    self.clone().into()
                }

                fn like_pattern(&self) -> String {
                    format!("{self}%")
                }
            }
        )*
    };
}

sql_param!(i64, u64, String);

impl SqlParam for f64 {
    fn to_value(&self) -> Value {
        (*self).into()
    }

    // `Debug` 格式保留整数值的小数部分（`1000.0`）
    fn like_pattern(&self) -> String {
        format!("{self:?}%")
    }
}

impl SqlParam for Timestamp {
    fn to_value(&self) -> Value {
        (*self).into()
    }

    fn like_pattern(&self) -> String {
        format!("{}%", self.to_rfc3339())
    }
}

/// 已解析到列的单条规则，待渲染
struct Predicate<'f> {
    column: &'f str,
    comparator: Comparator,
    values: Vec<Value>,
}

/// 按键到列的映射渲染过滤器的SQL编译器
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    placeholder: PlaceholderStyle,
    /// 过滤键到列名的映射，未映射的键被跳过
    columns: Option<HashMap<String, String>>,
}

impl SqlCompiler {
    pub fn new(placeholder: PlaceholderStyle) -> Self {
        Self {
            placeholder,
            columns: None,
        }
    }

    pub fn with_columns(mut self, columns: HashMap<String, String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// 设置键到列的映射
    pub fn set_column_mapping(&mut self, columns: HashMap<String, String>) {
        self.columns = Some(columns);
    }

    pub fn placeholder(&self) -> PlaceholderStyle {
        self.placeholder
    }

    /// 将过滤器渲染为 `WHERE ...`，编号占位符从 `$1` 开始
    pub fn render(&self, filter: &Filter) -> Result<WhereClause, CompileError> {
        let predicates = self.predicates(filter)?;
        let mut sql = String::new();
        let mut params: Vec<Value> = Vec::new();

        for (i, predicate) in predicates.into_iter().enumerate() {
            sql.push_str(if i == 0 { "WHERE " } else { " AND " });
            sql.push_str(predicate.column);

            let next = params.len() + 1;
            if predicate.comparator.is_membership() && predicate.values.len() > 1 {
                sql.push_str(" IN (");
                for j in 0..predicate.values.len() {
                    if j > 0 {
                        sql.push(',');
                    }
                    self.push_placeholder(&mut sql, next + j);
                }
                sql.push(')');
            } else {
                sql.push(' ');
                sql.push_str(sql_operator(predicate.comparator));
                sql.push(' ');
                self.push_placeholder(&mut sql, next);
            }
            params.extend(predicate.values);
        }

        tracing::debug!(params = params.len(), "Rendered where clause");
        Ok(WhereClause { sql, params })
    }

    /// 将过滤器构建为 sea-query 条件，所有规则以 AND 连接
    pub fn to_condition(&self, filter: &Filter) -> Result<Condition, CompileError> {
        let mut condition = Condition::all();
        for predicate in self.predicates(filter)? {
            condition = condition.add(compile_predicate(predicate));
        }
        Ok(condition)
    }

    fn push_placeholder(&self, sql: &mut String, index: usize) {
        match self.placeholder {
            PlaceholderStyle::Positional => sql.push('?'),
            PlaceholderStyle::Numbered => {
                sql.push('$');
                sql.push_str(&index.to_string());
            }
        }
    }

    fn predicates<'f>(&'f self, filter: &'f Filter) -> Result<Vec<Predicate<'f>>, CompileError> {
        let columns = self
            .columns
            .as_ref()
            .ok_or(CompileError::MissingColumnMapping)?;

        let mut predicates = Vec::new();
        for key in filter.keys() {
            let Some(column) = columns.get(key.name()) else {
                continue;
            };

            for rule in key.rules() {
                let values = match key.scalar_type() {
                    ScalarType::Integer => params::<i64>(filter, rule),
                    ScalarType::UnsignedInteger => params::<u64>(filter, rule),
                    ScalarType::Float => params::<f64>(filter, rule),
                    ScalarType::String => params::<String>(filter, rule),
                    ScalarType::Timestamp => params::<Timestamp>(filter, rule),
                };
                check_arity(key, rule.comparator, values.len())?;

                predicates.push(Predicate {
                    column,
                    comparator: rule.comparator,
                    values,
                });
            }
        }
        Ok(predicates)
    }
}

fn params<T: SqlParam>(filter: &Filter, rule: &StoredRule) -> Vec<Value> {
    let values = filter.values::<T>(rule).unwrap_or_default();
    if rule.comparator == Comparator::Like {
        values.iter().map(|v| Value::from(v.like_pattern())).collect()
    } else {
        values.iter().map(SqlParam::to_value).collect()
    }
}

fn check_arity(key: &FilterKey, comparator: Comparator, count: usize) -> Result<(), CompileError> {
    if count == 0 {
        return Err(CompileError::EmptyRule {
            key: key.name().to_string(),
            comparator,
        });
    }
    if count > 1 && !comparator.is_membership() {
        return Err(CompileError::MultipleValues {
            key: key.name().to_string(),
            comparator,
            count,
        });
    }
    Ok(())
}

fn sql_operator(comparator: Comparator) -> &'static str {
    match comparator {
        Comparator::Equals | Comparator::Is => "=",
        Comparator::LessThan => "<",
        Comparator::GreaterThan => ">",
        Comparator::LessOrEqual => "<=",
        Comparator::GreaterOrEqual => ">=",
        Comparator::Like => "LIKE",
    }
}

fn compile_predicate(predicate: Predicate<'_>) -> SimpleExpr {
    let col = Expr::col(ColumnName(predicate.column.to_string()));
    let mut values = predicate.values;

    if predicate.comparator.is_membership() && values.len() > 1 {
        return col.is_in(values);
    }

    // 收集谓词时已校验取值个数
    let value = values.swap_remove(0);
    match predicate.comparator {
        Comparator::Equals | Comparator::Is => col.eq(value),
        Comparator::LessThan => col.lt(value),
        Comparator::GreaterThan => col.gt(value),
        Comparator::LessOrEqual => col.lte(value),
        Comparator::GreaterOrEqual => col.gte(value),
        Comparator::Like => col.binary(BinOper::Like, value),
    }
}

/// [`SqlBuilder::order`] 的排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// 围绕渲染后的过滤器构建完整语句，每行一个子句
///
/// 按方法调用顺序写入子句，不校验子句顺序。
pub struct SqlBuilder<'c> {
    compiler: &'c SqlCompiler,
    segments: Vec<String>,
    params: Vec<Value>,
}

impl<'c> SqlBuilder<'c> {
    pub fn new(compiler: &'c SqlCompiler) -> Self {
        Self {
            compiler,
            segments: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn with(&mut self, name: &str, statement: &str) -> &mut Self {
        self.segments.push(format!("WITH {name} AS ({statement})"));
        self
    }

    /// `SELECT columns FROM table`，未指定列时选择 `*`
    pub fn select(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        let columns = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        self.segments.push(format!("SELECT {columns} FROM {table}"));
        self
    }

    pub fn join(&mut self, table: &str, condition: &str) -> &mut Self {
        self.segments.push(format!("JOIN {table} ON {condition}"));
        self
    }

    /// 追加过滤器的 WHERE 子句（存在谓词时）
    pub fn filter(&mut self, filter: &Filter) -> Result<&mut Self, CompileError> {
        let clause = self.compiler.render(filter)?;
        if !clause.sql.is_empty() {
            self.segments.push(clause.sql);
        }
        self.params.extend(clause.params);
        Ok(self)
    }

    pub fn order(&mut self, order: SortOrder, columns: &[&str]) -> &mut Self {
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        self.segments
            .push(format!("ORDER BY {} {direction}", columns.join(", ")));
        self
    }

    /// 按 `limit` 分页，页码从 0 开始
    pub fn page(&mut self, limit: u64, page: u64) -> &mut Self {
        let offset = page.saturating_mul(limit);
        self.segments.push(format!("LIMIT {limit} OFFSET {offset}"));
        self
    }

    pub fn build(&self) -> (String, Vec<Value>) {
        (self.segments.join("\n"), self.params.clone())
    }
}
