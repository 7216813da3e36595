// Tue Oct 13 2026 - Alex

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: i32,
    pub column: i32,
    /// A line terminator separates this token from the previous one.
    pub newline_before: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Identifier(String),

    Var,
    Let,
    Const,
    Function,
    If,
    Else,
    While,
    For,
    In,
    Return,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    Finally,
    New,
    Typeof,
    Instanceof,
    Delete,
    Void,
    This,
    Null,
    True,
    False,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqualEqual,
    EqualEqualEqual,
    BangEqual,
    BangEqualEqual,
    Bang,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    AndAnd,
    PipePipe,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Question,

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,

    Eof,
}

impl TokenKind {
    /// Identifier-like spelling, used where keywords are valid property names.
    pub fn word(&self) -> Option<&str> {
        let word = match self {
            TokenKind::Identifier(name) => return Some(name),
            TokenKind::Var => "var",
            TokenKind::Let => "let",
            TokenKind::Const => "const",
            TokenKind::Function => "function",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Return => "return",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Throw => "throw",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Finally => "finally",
            TokenKind::New => "new",
            TokenKind::Typeof => "typeof",
            TokenKind::Instanceof => "instanceof",
            TokenKind::Delete => "delete",
            TokenKind::Void => "void",
            TokenKind::This => "this",
            TokenKind::Null => "null",
            TokenKind::True => "true",
            TokenKind::False => "false",
            _ => return None,
        };
        Some(word)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::String(s) => write!(f, "string '{}'", s),
            TokenKind::Identifier(name) => write!(f, "identifier '{}'", name),
            TokenKind::Eof => write!(f, "end of input"),
            other => match other.word() {
                Some(word) => write!(f, "'{}'", word),
                None => write!(f, "'{}'", punctuator(other)),
            },
        }
    }
}

fn punctuator(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::PlusPlus => "++",
        TokenKind::MinusMinus => "--",
        TokenKind::Assign => "=",
        TokenKind::PlusAssign => "+=",
        TokenKind::MinusAssign => "-=",
        TokenKind::StarAssign => "*=",
        TokenKind::SlashAssign => "/=",
        TokenKind::PercentAssign => "%=",
        TokenKind::EqualEqual => "==",
        TokenKind::EqualEqualEqual => "===",
        TokenKind::BangEqual => "!=",
        TokenKind::BangEqualEqual => "!==",
        TokenKind::Bang => "!",
        TokenKind::Less => "<",
        TokenKind::Greater => ">",
        TokenKind::LessEqual => "<=",
        TokenKind::GreaterEqual => ">=",
        TokenKind::AndAnd => "&&",
        TokenKind::PipePipe => "||",
        TokenKind::Ampersand => "&",
        TokenKind::Pipe => "|",
        TokenKind::Caret => "^",
        TokenKind::Tilde => "~",
        TokenKind::ShiftLeft => "<<",
        TokenKind::ShiftRight => ">>",
        TokenKind::UnsignedShiftRight => ">>>",
        TokenKind::Question => "?",
        TokenKind::LeftParen => "(",
        TokenKind::RightParen => ")",
        TokenKind::LeftBrace => "{",
        TokenKind::RightBrace => "}",
        TokenKind::LeftBracket => "[",
        TokenKind::RightBracket => "]",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Colon => ":",
        TokenKind::Semicolon => ";",
        _ => "?",
    }
}

/// Position-tagged syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxErrorInfo {
    pub message: String,
    pub line: i32,
    pub column: i32,
}

impl SyntaxErrorInfo {
    pub fn new(message: impl Into<String>, line: i32, column: i32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SyntaxErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

impl std::error::Error for SyntaxErrorInfo {}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: i32,
    column: i32,
    newline_before: bool,
    tokens: Vec<Token>,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxErrorInfo> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
        newline_before: false,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.newline_before = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, line: i32, column: i32) {
        self.tokens.push(Token {
            kind,
            line,
            column,
            newline_before: self.newline_before,
        });
        self.newline_before = false;
    }

    fn run(&mut self) -> Result<(), SyntaxErrorInfo> {
        while let Some(&c) = self.chars.peek() {
            let (line, column) = (self.line, self.column);

            match c {
                ' ' | '\t' | '\r' | '\n' | '\u{feff}' | '\u{a0}' => {
                    self.bump();
                }

                '/' => {
                    self.bump();
                    if self.eat('/') {
                        while let Some(&ch) = self.chars.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else if self.eat('*') {
                        let mut closed = false;
                        while let Some(ch) = self.bump() {
                            if ch == '*' && self.eat('/') {
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(SyntaxErrorInfo::new("Unterminated comment", line, column));
                        }
                    } else if self.eat('=') {
                        self.push(TokenKind::SlashAssign, line, column);
                    } else {
                        self.push(TokenKind::Slash, line, column);
                    }
                }

                '"' | '\'' => {
                    let newline_before = self.newline_before;
                    let value = self.string(c, line, column)?;
                    self.newline_before = newline_before;
                    self.push(TokenKind::String(value), line, column);
                }

                '0'..='9' => {
                    let value = self.number(line, column)?;
                    self.push(TokenKind::Number(value), line, column);
                }

                '.' => {
                    self.bump();
                    if matches!(self.chars.peek(), Some(ch) if ch.is_ascii_digit()) {
                        let mut text = String::from("0.");
                        while let Some(&ch) = self.chars.peek() {
                            if !ch.is_ascii_digit() {
                                break;
                            }
                            text.push(ch);
                            self.bump();
                        }
                        let value = text.parse::<f64>().unwrap_or(f64::NAN);
                        self.push(TokenKind::Number(value), line, column);
                    } else {
                        self.push(TokenKind::Dot, line, column);
                    }
                }

                c if c.is_alphabetic() || c == '_' || c == '$' => {
                    let mut ident = String::new();
                    while let Some(&ch) = self.chars.peek() {
                        if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                            ident.push(ch);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let kind = keyword(&ident).unwrap_or(TokenKind::Identifier(ident));
                    self.push(kind, line, column);
                }

                _ => {
                    self.bump();
                    let kind = self.operator(c, line, column)?;
                    self.push(kind, line, column);
                }
            }
        }

        let (line, column) = (self.line, self.column);
        self.push(TokenKind::Eof, line, column);
        Ok(())
    }

    fn string(&mut self, quote: char, line: i32, column: i32) -> Result<String, SyntaxErrorInfo> {
        self.bump();
        let mut s = String::new();
        loop {
            let ch = match self.bump() {
                Some(ch) => ch,
                None => return Err(SyntaxErrorInfo::new("Unterminated string literal", line, column)),
            };
            if ch == quote {
                return Ok(s);
            }
            if ch == '\n' {
                return Err(SyntaxErrorInfo::new("Unterminated string literal", line, column));
            }
            if ch != '\\' {
                s.push(ch);
                continue;
            }
            match self.bump() {
                Some('n') => s.push('\n'),
                Some('r') => s.push('\r'),
                Some('t') => s.push('\t'),
                Some('b') => s.push('\u{8}'),
                Some('f') => s.push('\u{c}'),
                Some('v') => s.push('\u{b}'),
                Some('0') => s.push('\0'),
                Some('x') => {
                    let code = self.hex_digits(2, line, column)?;
                    s.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
                Some('u') => {
                    let code = self.hex_digits(4, line, column)?;
                    s.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
                Some('\n') => {}
                Some(other) => s.push(other),
                None => return Err(SyntaxErrorInfo::new("Unterminated string literal", line, column)),
            }
        }
    }

    fn hex_digits(&mut self, count: usize, line: i32, column: i32) -> Result<u32, SyntaxErrorInfo> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .bump()
                .and_then(|ch| ch.to_digit(16))
                .ok_or_else(|| SyntaxErrorInfo::new("Invalid escape sequence", line, column))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn number(&mut self, line: i32, column: i32) -> Result<f64, SyntaxErrorInfo> {
        let mut text = String::new();

        if self.chars.peek() == Some(&'0') {
            self.bump();
            if self.eat('x') || self.eat('X') {
                while let Some(&ch) = self.chars.peek() {
                    if !ch.is_ascii_hexdigit() {
                        break;
                    }
                    text.push(ch);
                    self.bump();
                }
                return u64::from_str_radix(&text, 16)
                    .map(|v| v as f64)
                    .map_err(|_| SyntaxErrorInfo::new("Invalid hexadecimal literal", line, column));
            }
            text.push('0');
        }

        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else if ch == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                text.push(ch);
                self.bump();
            } else if (ch == 'e' || ch == 'E') && !seen_exp {
                seen_exp = true;
                text.push('e');
                self.bump();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.bump();
                    }
                }
            } else {
                break;
            }
        }

        if matches!(self.chars.peek(), Some(ch) if ch.is_alphabetic() || *ch == '_') {
            return Err(SyntaxErrorInfo::new("Identifier starts immediately after numeric literal", line, column));
        }

        text.parse::<f64>()
            .map_err(|_| SyntaxErrorInfo::new(format!("Invalid numeric literal '{}'", text), line, column))
    }

    fn operator(&mut self, c: char, line: i32, column: i32) -> Result<TokenKind, SyntaxErrorInfo> {
        let kind = match c {
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '%' => {
                if self.eat('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqualEqualEqual
                    } else {
                        TokenKind::EqualEqual
                    }
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::BangEqualEqual
                    } else {
                        TokenKind::BangEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else if self.eat('<') {
                    TokenKind::ShiftLeft
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else if self.eat('>') {
                    if self.eat('>') {
                        TokenKind::UnsignedShiftRight
                    } else {
                        TokenKind::ShiftRight
                    }
                } else {
                    TokenKind::Greater
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else {
                    TokenKind::Ampersand
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            _ => {
                return Err(SyntaxErrorInfo::new(format!("Unexpected character '{}'", c), line, column));
            }
        };
        Ok(kind)
    }
}

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "var" => TokenKind::Var,
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "function" => TokenKind::Function,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "throw" => TokenKind::Throw,
        "try" => TokenKind::Try,
        "catch" => TokenKind::Catch,
        "finally" => TokenKind::Finally,
        "new" => TokenKind::New,
        "typeof" => TokenKind::Typeof,
        "instanceof" => TokenKind::Instanceof,
        "delete" => TokenKind::Delete,
        "void" => TokenKind::Void,
        "this" => TokenKind::This,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        assert_eq!(
            kinds("var x = 42;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier("x".to_string()),
                TokenKind::Assign,
                TokenKind::Number(42.0),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("a === b !== c >>> 1"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::EqualEqualEqual,
                TokenKind::Identifier("b".to_string()),
                TokenKind::BangEqualEqual,
                TokenKind::Identifier("c".to_string()),
                TokenKind::UnsignedShiftRight,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds("0x1F 1.5e2 .5 'a\\nb'"),
            vec![
                TokenKind::Number(31.0),
                TokenKind::Number(150.0),
                TokenKind::Number(0.5),
                TokenKind::String("a\nb".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_newline_tracking() {
        let tokens = tokenize("a\n// comment\nb").unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("var s = 'open").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("Unterminated"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.column, 3);
    }
}
