use phf::phf_map;

pub(super) static KEYWORDS: phf::Map<&str, TokenKind> = phf_map! {
    "int" => TokenKind::Int,
    "bool" => TokenKind::Bool,
    "void" => TokenKind::Void,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "return" => TokenKind::Return,
};

pub(super) static TWO_SYMBOLS_TOKENS: phf::Map<&str, TokenKind> = phf_map! {
    "==" => TokenKind::DoubleEqual,
    "!=" => TokenKind::NotEqual,
    "<=" => TokenKind::LessEqual,
    ">=" => TokenKind::GreaterEqual,
    "&&" => TokenKind::DoubleAmpersand,
    "||" => TokenKind::DoublePipe,
};

pub(super) static ONE_SYMBOL_TOKENS: phf::Map<char, TokenKind> = phf_map! {
    '+' => TokenKind::Plus,
    '-' => TokenKind::Minus,
    '*' => TokenKind::Star,
    '/' => TokenKind::Slash,
    '<' => TokenKind::LessThan,
    '>' => TokenKind::GreaterThan,
    '=' => TokenKind::Equal,
    '!' => TokenKind::Not,
    '(' => TokenKind::OpenParen,
    ')' => TokenKind::CloseParen,
    '{' => TokenKind::OpenCurlyBrace,
    '}' => TokenKind::CloseCurlyBrace,
    ',' => TokenKind::Comma,
    ';' => TokenKind::SemiColon,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Num(i64),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,

    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    DoubleEqual,
    NotEqual,

    DoubleAmpersand,
    DoublePipe,
    Not,

    Equal,
    OpenParen,
    CloseParen,
    OpenCurlyBrace,
    CloseCurlyBrace,
    Comma,
    SemiColon,

    Int,
    Bool,
    Void,
    True,
    False,
    If,
    Else,
    While,
    Return,
}

/// 1-based location of a token in the source. Synthesized nodes use `0:0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}
