//! Tokens and a tokenizer for assembly source lines.
//!
//! Comments and labels are split off before a line reaches the lexer, so the lexer only sees
//! a mnemonic or directive followed by its arguments. The same lexer compiles the operand
//! syntax of [addressing modes](crate::instruction::AddressingMode) into [TemplateItem]s,
//! which lets the assembler match operands token by token.

use logos::{Lexer, Logos};

use std::fmt;

/// Enumeration of all tokens of an assembly statement.
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
pub enum Token<'a> {
    /// Errorneous token that could not be interpreted as any of the other variants.
    #[error]
    #[regex(r"[ \t\r\f]+", logos::skip)]
    Error,

    /// A mnemonic, register, label, number or `label+offset` expression.
    #[regex("-?[A-Za-z0-9_]+([+-][A-Za-z0-9_]+)?", Lexer::slice)]
    Word(&'a str),

    /// A quoted string, quotes included. `''` inside the quotes is an escaped quote, and
    /// `'''` on its own is the quote character.
    #[token("'", quoted)]
    Str(&'a str),

    /// Token (`#`) marking an immediate operand.
    #[token("#")]
    Hash,

    /// Token (`,`) separating arguments or parts of an operand (eg. `10,X`).
    #[token(",")]
    Comma,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    /// Token (`[`) opening an allocation count (eg. `DAB [10]`).
    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,
}

impl<'a> Token<'a> {
    /// The source text of the token.
    pub fn text(&self) -> &'a str {
        match self {
            Token::Error => "",
            Token::Word(text) | Token::Str(text) => text,
            Token::Hash => "#",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::LBracket => "[",
            Token::RBracket => "]",
        }
    }
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Whether the byte following `'''` ends it, making it the quote character rather than a
/// string that starts with an escaped quote.
pub(crate) fn ends_char(next: Option<&u8>) -> bool {
    match next {
        Some(byte) => !byte.is_ascii_alphanumeric() && *byte != b'\'',
        None => true,
    }
}

/// Lexes a quoted string after its opening quote.
fn quoted<'a>(lexer: &mut Lexer<'a, Token<'a>>) -> Option<&'a str> {
    let rest = lexer.remainder().as_bytes();

    if rest.starts_with(b"''") && ends_char(rest.get(2)) {
        lexer.bump(2);
        return Some(lexer.slice());
    }

    let mut i = 0;

    while i < rest.len() {
        match (rest[i], rest.get(i + 1)) {
            (b'\'', Some(&b'\'')) => i += 2,
            (b'\'', _) => {
                lexer.bump(i + 1);
                return Some(lexer.slice());
            }
            _ => i += 1,
        }
    }

    None
}

/// Splits a statement into tokens.
///
/// # Errors
/// Returns the text of the first character sequence that is not a token.
pub fn lex(input: &str) -> Result<Vec<Token>, &str> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();

    while let Some(token) = lexer.next() {
        if token == Token::Error {
            return Err(&input[lexer.span().start..]);
        }

        tokens.push(token);
    }

    Ok(tokens)
}

/// Returns the text of a quoted string with the quotes removed and escapes resolved.
pub fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('\'')
        .and_then(|text| text.strip_suffix('\''))
        .unwrap_or(text);

    inner.replace("''", "'")
}

/// One element of the operand syntax of an addressing mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateItem {
    /// A value, written `a` in the syntax.
    Value,

    /// A register name, written `r` in the syntax.
    Register,

    /// Text that has to appear as is, compared case-insensitively.
    Literal(&'static str),
}

/// Compiles an addressing mode syntax such as `a,X` or `(a(r))` into template items.
pub fn template(syntax: &'static str) -> Vec<TemplateItem> {
    let mut lexer = Token::lexer(syntax);
    let mut items = Vec::new();

    while let Some(token) = lexer.next() {
        let item = match token {
            Token::Word("a") => TemplateItem::Value,
            Token::Word("r") => TemplateItem::Register,
            Token::Error => panic!("invalid addressing mode syntax {:?}", syntax),
            _ => TemplateItem::Literal(lexer.slice()),
        };

        items.push(item);
    }

    items
}
