use log::debug;
use thiserror::Error;

use crate::analyzer::Ty;
use crate::lexer::{Position, Token, TokenKind};

use super::{
    BinOpKind, CmpOpKind, Expr, FunctionDecl, MainFunction, Param, Program, Stmt, VarDecl,
};

#[derive(Debug, PartialEq, Error)]
pub enum ParseError {
    #[error("{pos}: unexpected token {found:?} (was expecting {expected})")]
    UnexpectedToken {
        found: TokenKind,
        expected: String,
        pos: Position,
    },
    #[error("expected {expected}, however reached the end of input")]
    UnexpectedEof { expected: String },
    #[error("program has no main function")]
    MissingMain,
}

type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    pub fn parse(&mut self) -> ParseResult<Program> {
        self.parse_program()
    }

    fn is_eof(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.index + offset).map(|t| &t.kind)
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.peek() != Some(kind) {
            return false;
        }
        self.index += 1;
        true
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        match self.tokens.get(self.index) {
            Some(t) => ParseError::UnexpectedToken {
                found: t.kind.clone(),
                expected: expected.into(),
                pos: t.pos,
            },
            None => ParseError::UnexpectedEof {
                expected: expected.into(),
            },
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.consume(kind) {
            Ok(())
        } else {
            Err(self.unexpected(format!("{:?}", kind)))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<(String, Position)> {
        if let Some(Token {
            kind: TokenKind::Ident(name),
            pos,
        }) = self.tokens.get(self.index)
        {
            let ident = (name.clone(), *pos);
            self.index += 1;
            return Ok(ident);
        }
        Err(self.unexpected("Ident"))
    }

    fn parse_type(&mut self) -> Option<Ty> {
        if self.consume(&TokenKind::Int) {
            Some(Ty::Int)
        } else if self.consume(&TokenKind::Bool) {
            Some(Ty::Bool)
        } else if self.consume(&TokenKind::Void) {
            Some(Ty::Void)
        } else {
            None
        }
    }

    fn expect_type(&mut self) -> ParseResult<Ty> {
        self.parse_type()
            .ok_or_else(|| self.unexpected("a type (int, bool or void)"))
    }

    /// program = func* main
    fn parse_program(&mut self) -> ParseResult<Program> {
        let mut functions = vec![];

        while !self.is_eof() {
            let return_type = self.expect_type()?;
            if self.peek() == Some(&TokenKind::Ident("main".to_string())) {
                self.index += 1;
                let main = self.parse_main()?;
                if !self.is_eof() {
                    return Err(self.unexpected("end of input after main"));
                }
                debug!("parsed {} function(s) plus main", functions.len());
                return Ok(Program {
                    return_type,
                    functions,
                    main,
                });
            }
            functions.push(self.parse_func(return_type)?);
        }

        Err(ParseError::MissingMain)
    }

    /// main = type "main" "(" ")" "{" decl* stmt* "}"
    fn parse_main(&mut self) -> ParseResult<MainFunction> {
        self.expect(&TokenKind::OpenParen)?;
        self.expect(&TokenKind::CloseParen)?;
        let (locals, body) = self.parse_func_body()?;
        Ok(MainFunction { locals, body })
    }

    /// func = type ident "(" params ")" "{" decl* stmt* "}"
    fn parse_func(&mut self, return_type: Ty) -> ParseResult<FunctionDecl> {
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        let (locals, body) = self.parse_func_body()?;

        Ok(FunctionDecl {
            return_type,
            name,
            params,
            locals,
            body,
        })
    }

    /// params = "(" (type ident ("," type ident)*)? ")"
    fn parse_params(&mut self) -> ParseResult<Vec<Param>> {
        let mut params = vec![];
        self.expect(&TokenKind::OpenParen)?;

        if !self.consume(&TokenKind::CloseParen) {
            loop {
                let ty = self.expect_type()?;
                let (name, pos) = self.expect_ident()?;
                params.push(Param { ty, name, pos });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::CloseParen)?;
        }

        Ok(params)
    }

    /// Leading declarations become the function's locals, the rest is body.
    fn parse_func_body(&mut self) -> ParseResult<(Vec<VarDecl>, Vec<Stmt>)> {
        self.expect(&TokenKind::OpenCurlyBrace)?;

        let mut locals = vec![];
        while let Some(decl) = self.parse_declaration()? {
            locals.push(decl);
        }

        let mut body = vec![];
        while !self.consume(&TokenKind::CloseCurlyBrace) {
            body.push(self.parse_stmt()?);
        }

        Ok((locals, body))
    }

    /// decl = type ident ";"
    fn parse_declaration(&mut self) -> ParseResult<Option<VarDecl>> {
        let Some(ty) = self.parse_type() else {
            return Ok(None);
        };
        let (name, pos) = self.expect_ident()?;
        self.expect(&TokenKind::SemiColon)?;
        Ok(Some(VarDecl { ty, name, pos }))
    }

    /// block = "{" stmt* "}"
    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::OpenCurlyBrace)?;
        let mut stmts = vec![];
        while !self.consume(&TokenKind::CloseCurlyBrace) {
            if self.is_eof() {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    /// stmt = decl
    ///      | ident "=" expr ";"
    ///      | "if" "(" expr ")" block ("else" block)?
    ///      | "while" "(" expr ")" block
    ///      | "return" expr? ";"
    ///      | expr ";"
    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        if let Some(decl) = self.parse_declaration()? {
            return Ok(Stmt::VarDecl(decl));
        }

        if self.consume(&TokenKind::If) {
            self.expect(&TokenKind::OpenParen)?;
            let cond = self.parse_expr()?;
            self.expect(&TokenKind::CloseParen)?;
            let then_block = self.parse_block()?;
            let else_block = if self.consume(&TokenKind::Else) {
                Some(self.parse_block()?)
            } else {
                None
            };
            Ok(Stmt::If {
                cond,
                then_block,
                else_block,
            })
        } else if self.consume(&TokenKind::While) {
            self.expect(&TokenKind::OpenParen)?;
            let cond = self.parse_expr()?;
            self.expect(&TokenKind::CloseParen)?;
            let body = self.parse_block()?;
            Ok(Stmt::While { cond, body })
        } else if self.consume(&TokenKind::Return) {
            if self.consume(&TokenKind::SemiColon) {
                return Ok(Stmt::Return(None));
            }
            let expr = self.parse_expr()?;
            self.expect(&TokenKind::SemiColon)?;
            Ok(Stmt::Return(Some(expr)))
        } else if matches!(self.peek(), Some(TokenKind::Ident(_)))
            && self.peek_at(1) == Some(&TokenKind::Equal)
        {
            let (name, _) = self.expect_ident()?;
            self.expect(&TokenKind::Equal)?;
            let expr = self.parse_expr()?;
            self.expect(&TokenKind::SemiColon)?;
            Ok(Stmt::Assignment { name, expr })
        } else {
            let expr = self.parse_expr()?;
            self.expect(&TokenKind::SemiColon)?;
            Ok(Stmt::Expression(expr))
        }
    }

    /// expr = or
    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    /// or = and ("||" and)*
    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut node = self.parse_and()?;
        while self.consume(&TokenKind::DoublePipe) {
            node = Expr::or(node, self.parse_and()?);
        }
        Ok(node)
    }

    /// and = equality ("&&" equality)*
    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut node = self.parse_equality()?;
        while self.consume(&TokenKind::DoubleAmpersand) {
            node = Expr::and(node, self.parse_equality()?);
        }
        Ok(node)
    }

    /// equality = relational ("==" relational | "!=" relational)*
    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut node = self.parse_relational()?;

        loop {
            let op = if self.consume(&TokenKind::DoubleEqual) {
                CmpOpKind::Equal
            } else if self.consume(&TokenKind::NotEqual) {
                CmpOpKind::NotEqual
            } else {
                return Ok(node);
            };
            node = Expr::compare(node, op, self.parse_relational()?);
        }
    }

    /// relational = add ("<" add | "<=" add | ">" add | ">=" add)*
    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut node = self.parse_add()?;

        loop {
            let op = if self.consume(&TokenKind::LessThan) {
                CmpOpKind::LessThan
            } else if self.consume(&TokenKind::LessEqual) {
                CmpOpKind::LessEqual
            } else if self.consume(&TokenKind::GreaterThan) {
                CmpOpKind::GreaterThan
            } else if self.consume(&TokenKind::GreaterEqual) {
                CmpOpKind::GreaterEqual
            } else {
                return Ok(node);
            };
            node = Expr::compare(node, op, self.parse_add()?);
        }
    }

    /// add = mul ("+" mul | "-" mul)*
    fn parse_add(&mut self) -> ParseResult<Expr> {
        let mut node = self.parse_mul()?;

        loop {
            let op = if self.consume(&TokenKind::Plus) {
                BinOpKind::Add
            } else if self.consume(&TokenKind::Minus) {
                BinOpKind::Sub
            } else {
                return Ok(node);
            };
            node = Expr::binary(node, op, self.parse_mul()?);
        }
    }

    /// mul = unary ("*" unary | "/" unary)*
    fn parse_mul(&mut self) -> ParseResult<Expr> {
        let mut node = self.parse_unary()?;

        loop {
            let op = if self.consume(&TokenKind::Star) {
                BinOpKind::Mul
            } else if self.consume(&TokenKind::Slash) {
                BinOpKind::Div
            } else {
                return Ok(node);
            };
            node = Expr::binary(node, op, self.parse_unary()?);
        }
    }

    /// unary = "!" unary
    ///       | "-" unary
    ///       | "+" unary
    ///       | primary
    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.consume(&TokenKind::Not) {
            Ok(Expr::not(self.parse_unary()?))
        } else if self.consume(&TokenKind::Minus) {
            Ok(Expr::binary(
                Expr::Number(0),
                BinOpKind::Sub,
                self.parse_unary()?,
            ))
        } else if self.consume(&TokenKind::Plus) {
            self.parse_unary()
        } else {
            self.parse_primary()
        }
    }

    /// primary = num
    ///         | "true" | "false"
    ///         | ident ("(" (expr ("," expr)*)? ")")?
    ///         | "(" expr ")"
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().cloned() {
            Some(TokenKind::OpenParen) => {
                self.index += 1;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::CloseParen)?;
                Ok(expr)
            }
            Some(TokenKind::Num(num)) => {
                self.index += 1;
                Ok(Expr::Number(num))
            }
            Some(TokenKind::True) => {
                self.index += 1;
                Ok(Expr::Boolean(true))
            }
            Some(TokenKind::False) => {
                self.index += 1;
                Ok(Expr::Boolean(false))
            }
            Some(TokenKind::Ident(name)) => {
                self.index += 1;
                self.parse_ident(name)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_ident(&mut self, name: String) -> ParseResult<Expr> {
        if !self.consume(&TokenKind::OpenParen) {
            return Ok(Expr::Variable(name));
        }

        let mut args = vec![];
        if !self.consume(&TokenKind::CloseParen) {
            args.push(self.parse_expr()?);
            while self.consume(&TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
            self.expect(&TokenKind::CloseParen)?;
        }
        Ok(Expr::FunctionCall { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> ParseResult<Program> {
        Parser::new(Lexer::tokenize(input).unwrap()).parse()
    }

    #[test]
    fn splits_locals_from_body() {
        let program = parse("int main() { int x; bool b; x = 1; int y; return x; }").unwrap();
        assert_eq!(program.return_type, Ty::Int);
        assert_eq!(program.main.locals.len(), 2);
        assert_eq!(program.main.body.len(), 3);
        assert!(matches!(program.main.body[1], Stmt::VarDecl(ref d) if d.name == "y"));
        assert_eq!(program.main.frame_slots(), 3);
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let program = parse("int main() { return 10 - 4 - 3; }").unwrap();
        let expected = Expr::binary(
            Expr::binary(Expr::Number(10), BinOpKind::Sub, Expr::Number(4)),
            BinOpKind::Sub,
            Expr::Number(3),
        );
        assert_eq!(program.main.body[0], Stmt::Return(Some(expected)));
    }

    #[test]
    fn logical_precedence() {
        let program = parse("int main() { return a || b && !c; }").unwrap();
        let expected = Expr::or(
            Expr::var("a"),
            Expr::and(Expr::var("b"), Expr::not(Expr::var("c"))),
        );
        assert_eq!(program.main.body[0], Stmt::Return(Some(expected)));
    }

    #[test]
    fn functions_before_main() {
        let program = parse(
            "int add(int a, int b) { return a + b; }
             void main() { add(1, 2); }",
        )
        .unwrap();
        assert_eq!(program.return_type, Ty::Void);
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].params.len(), 2);
        assert_eq!(
            program.main.body[0],
            Stmt::Expression(Expr::call("add", vec![Expr::Number(1), Expr::Number(2)]))
        );
    }

    #[test]
    fn missing_main_is_an_error() {
        assert_eq!(
            parse("int f() { return 1; }"),
            Err(ParseError::MissingMain)
        );
    }

    #[test]
    fn reports_unexpected_token() {
        let err = parse("int main() { x = ; }").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken {
                found: TokenKind::SemiColon,
                ..
            }
        ));
    }
}
