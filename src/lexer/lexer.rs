use log::trace;
use thiserror::Error;

use super::{
    token::{KEYWORDS, ONE_SYMBOL_TOKENS, TWO_SYMBOLS_TOKENS},
    Position, TokenKind,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

#[derive(Debug, PartialEq, Error)]
pub enum LexError {
    #[error("{pos}: can't tokenize '{found}'")]
    UnexpectedChar { found: char, pos: Position },
    #[error("{pos}: integer literal '{literal}' is out of range")]
    NumberOutOfRange { literal: String, pos: Position },
}

#[derive(Debug)]
pub struct Lexer {
    tokens: Vec<Token>,
    index: usize,
    line: usize,
    line_start: usize,
}

impl Lexer {
    fn new() -> Self {
        Self {
            tokens: vec![],
            index: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.index - self.line_start + 1)
    }

    fn new_token(&mut self, kind: TokenKind, len: usize) {
        let pos = self.position();
        self.tokens.push(Token { kind, pos });
        self.index += len;
    }

    fn newline(&mut self) {
        self.index += 1;
        self.line += 1;
        self.line_start = self.index;
    }

    fn parse_number(&mut self, chars: &[char]) -> Result<(), LexError> {
        let s: String = chars.iter().take_while(|c| c.is_ascii_digit()).collect();
        let value = s.parse().map_err(|_| LexError::NumberOutOfRange {
            literal: s.clone(),
            pos: self.position(),
        })?;
        self.new_token(TokenKind::Num(value), s.len());
        Ok(())
    }

    fn parse_identifier(&mut self, chars: &[char]) {
        let s: String = chars
            .iter()
            .take_while(|&&c| c.is_ascii_alphanumeric() || c == '_')
            .collect();

        let len = s.len();
        if let Some(kind) = KEYWORDS.get(s.as_str()) {
            self.new_token(kind.clone(), len);
        } else {
            self.new_token(TokenKind::Ident(s), len);
        }
    }

    fn skip_line_comment(&mut self, chars: &[char]) {
        while self.index < chars.len() && chars[self.index] != '\n' {
            self.index += 1;
        }
    }

    fn _tokenize(&mut self, s: &str) -> Result<(), LexError> {
        let chars: Vec<_> = s.chars().collect();

        while self.index < chars.len() {
            let c = chars[self.index];
            let c2 = chars[self.index..].iter().take(2).collect::<String>();

            if c == '\n' {
                self.newline();
            } else if c.is_whitespace() {
                self.index += 1;
            } else if c2 == "//" {
                self.skip_line_comment(&chars);
            } else if c.is_ascii_digit() {
                self.parse_number(&chars[self.index..])?;
            } else if c.is_ascii_alphabetic() || c == '_' {
                self.parse_identifier(&chars[self.index..]);
            } else if let Some(kind) = TWO_SYMBOLS_TOKENS.get(c2.as_str()) {
                self.new_token(kind.clone(), 2);
            } else if let Some(kind) = ONE_SYMBOL_TOKENS.get(&c) {
                self.new_token(kind.clone(), 1);
            } else {
                return Err(LexError::UnexpectedChar {
                    found: c,
                    pos: self.position(),
                });
            }
        }

        Ok(())
    }

    pub fn tokenize(s: &str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::new();
        lexer._tokenize(s)?;
        trace!("tokenized {} token(s)", lexer.tokens.len());

        Ok(lexer.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_symbols() {
        assert_eq!(
            kinds("bool ok; ok = !(a <= 3) && true;"),
            vec![
                TokenKind::Bool,
                TokenKind::Ident("ok".to_string()),
                TokenKind::SemiColon,
                TokenKind::Ident("ok".to_string()),
                TokenKind::Equal,
                TokenKind::Not,
                TokenKind::OpenParen,
                TokenKind::Ident("a".to_string()),
                TokenKind::LessEqual,
                TokenKind::Num(3),
                TokenKind::CloseParen,
                TokenKind::DoubleAmpersand,
                TokenKind::True,
                TokenKind::SemiColon,
            ]
        );
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = Lexer::tokenize("int x;\n  // comment\n  x = 1;").unwrap();
        assert_eq!(tokens[1].pos, Position::new(1, 5));
        assert_eq!(tokens[3].pos, Position::new(3, 3));
        assert_eq!(tokens[5].kind, TokenKind::Num(1));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = Lexer::tokenize("x = 1 # 2;").unwrap_err();
        assert_eq!(
            err,
            LexError::UnexpectedChar {
                found: '#',
                pos: Position::new(1, 7)
            }
        );
    }
}
