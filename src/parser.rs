use crate::alg::Expr;
use crate::diagnostic::Diagnostic;
use crate::lexer::Lexer;
use crate::span::{Span, Spanned};
use crate::token::Token;
use crate::value::Const;

/// Parse an expression in the arithmetic surface syntax.
///
/// Precedence, loosest to tightest: `+`/`-` (left-associative), `*`
/// (left-associative), `^` (right-associative), then literals, names, and
/// parenthesized groups. The printer emits fully parenthesized text, so
/// `parse(render(e)) == e` for every expression.
pub fn parse_expr(source: &str) -> Result<Expr, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse()
}

pub(crate) struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Spanned<Token>>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn parse(mut self) -> Result<Expr, Vec<Diagnostic>> {
        let expr = self.parse_addsub().map_err(|d| vec![d])?;
        if self.current() != &Token::Eof {
            return Err(vec![Diagnostic::error(
                format!("expected end of input, found `{}`", self.current()),
                self.current_span(),
            )]);
        }
        Ok(expr)
    }

    fn parse_addsub(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_mul()?;
        loop {
            match self.current() {
                Token::Plus => {
                    self.advance();
                    let rhs = self.parse_mul()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                Token::Minus => {
                    self.advance();
                    let rhs = self.parse_mul()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_pow()?;
        while self.current() == &Token::Star {
            self.advance();
            let rhs = self.parse_pow()?;
            lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_pow(&mut self) -> Result<Expr, Diagnostic> {
        let base = self.parse_primary()?;
        if self.current() == &Token::Caret {
            self.advance();
            // Right-associative: `2 ^ 3 ^ 4` is `2 ^ (3 ^ 4)`.
            let exponent = self.parse_pow()?;
            return Ok(Expr::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let span = self.current_span();
        match self.current().clone() {
            Token::Int(value) => {
                self.advance();
                Ok(Expr::Literal(Const::Int(value)))
            }
            Token::Float(value) => {
                self.advance();
                Ok(Expr::Literal(Const::Float(value)))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            Token::Minus => {
                // Negative literals only; there is no general unary minus.
                self.advance();
                match self.current().clone() {
                    Token::Int(value) => {
                        self.advance();
                        Ok(Expr::Literal(Const::Int(-value)))
                    }
                    Token::Float(value) => {
                        self.advance();
                        Ok(Expr::Literal(Const::Float(-value)))
                    }
                    other => Err(Diagnostic::error(
                        format!("expected a number after `-`, found `{other}`"),
                        self.current_span(),
                    )),
                }
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_addsub()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(Diagnostic::error(
                format!("expected an expression, found `{other}`"),
                span,
            )
            .with_help("expressions are numbers, names, and `+ - * ^` combinations")),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), Diagnostic> {
        if self.current() == &token {
            self.advance();
            Ok(())
        } else {
            Err(Diagnostic::error(
                format!("expected `{token}`, found `{}`", self.current()),
                self.current_span(),
            ))
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }
}
