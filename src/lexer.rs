//! 过滤值的词法分析器
//!
//! 在输入上滑动窗口，每次扩展一个字符，直到窗口为 `!`、比较关键字，
//! 或以未转义的 `|`/`,` 结尾。输入结束时剩余的窗口即为最后一个值。

use std::borrow::Cow;

use crate::ast::Comparator;
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 当前窗口的起始位置（字节索引）
    start: usize,
    /// 当前窗口的结束位置（字节索引）
    position: usize,
    /// 遇到 `!` 置位，遇到 `|` 清除；置位期间关键字按普通文本处理
    after_mark: bool,
    /// 窗口末尾连续反斜杠的个数
    escapes: usize,
    /// 紧随其结束的值之后输出的分隔符
    pending: Option<Token<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            start: 0,
            position: 0,
            after_mark: false,
            escapes: 0,
            pending: None,
        }
    }

    /// 窗口末尾推进一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.input[self.position..].chars().next()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn window(&self) -> &'a str {
        &self.input[self.start..self.position]
    }

    /// 将整个窗口输出为一个token，并在其后开始新窗口
    fn emit_window(&mut self, kind: TokenKind) -> Token<'a> {
        let token = Token::new(kind, self.window(), Span::new(self.start, self.position));
        self.start = self.position;
        self.escapes = 0;
        token
    }

    fn value(&self, start: usize, end: usize) -> Token<'a> {
        Token::new(
            TokenKind::Value,
            unescape(&self.input[start..end]),
            Span::new(start, end),
        )
    }

    /// 在窗口末尾的分隔符处拆分
    fn emit_delimited(&mut self, kind: TokenKind) -> Token<'a> {
        let delimiter_start = self.position - 1;
        let delimiter = Token::new(
            kind,
            &self.input[delimiter_start..self.position],
            Span::new(delimiter_start, self.position),
        );
        let value = (delimiter_start > self.start).then(|| self.value(self.start, delimiter_start));
        self.start = self.position;

        match value {
            Some(value) => {
                self.pending = Some(delimiter);
                value
            }
            None => delimiter,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }

        while let Some(c) = self.bump() {
            let window = self.window();
            if window == "!" {
                self.after_mark = true;
                return Some(self.emit_window(TokenKind::Mark));
            }
            if !self.after_mark && Comparator::from_keyword(window).is_some() {
                return Some(self.emit_window(TokenKind::Identifier));
            }

            let escaped = self.escapes % 2 == 1;
            self.escapes = if c == '\\' { self.escapes + 1 } else { 0 };
            if escaped {
                continue;
            }

            match c {
                '|' => {
                    self.after_mark = false;
                    return Some(self.emit_delimited(TokenKind::Bar));
                }
                ',' => return Some(self.emit_delimited(TokenKind::Comma)),
                _ => {}
            }
        }

        // 剩余窗口为最后一个值
        if self.start < self.input.len() {
            let token = self.value(self.start, self.input.len());
            self.start = self.input.len();
            return Some(token);
        }
        None
    }
}

/// 对整个过滤值进行分词
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// 去除转义反斜杠。`\\` 合并为一个反斜杠，末尾单独的反斜杠被丢弃
fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
