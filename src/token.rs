//! 过滤语言的token定义

use std::borrow::Cow;
use std::fmt;

/// token 是语言的基本单元，具有特定的类型和位置
///
/// `text` 已去除转义，仅当片段不含反斜杠时借用输入。
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: Cow<'a, str>,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: impl Into<Cow<'a, str>>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// 语法分析时追加在最后一个token之后的结束标记
    pub fn end(at: usize) -> Self {
        Self::new(TokenKind::End, "", Span::new(at, at))
    }
}

/// token的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Mark,       // !
    Bar,        // |
    Comma,      // ,
    Identifier, // eq, lt, gt, le, ge, like, lk, is
    Value,
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Mark => "`!`",
            TokenKind::Bar => "`|`",
            TokenKind::Comma => "`,`",
            TokenKind::Identifier => "comparator",
            TokenKind::Value => "value",
            TokenKind::End => "end of input",
        };
        f.write_str(name)
    }
}

/// 表示源文本中的一个区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// 起始字节偏移
    pub start: usize,
    /// 结束字节偏移
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
