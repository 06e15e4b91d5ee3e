use crate::diagnostic::Diagnostic;
use crate::span::{Span, Spanned};
use crate::token::Token;

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Token>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Token::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Token> {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= self.source.len() {
                return self.make(Token::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            if ch.is_ascii_digit() {
                return self.scan_number(start);
            }
            if is_ident_start(ch) {
                return self.scan_ident(start);
            }

            self.pos += 1;
            let symbol = match ch {
                b'+' => Some(Token::Plus),
                b'-' => Some(Token::Minus),
                b'*' => Some(Token::Star),
                b'^' => Some(Token::Caret),
                b'(' => Some(Token::LParen),
                b')' => Some(Token::RParen),
                _ => None,
            };
            match symbol {
                Some(tok) => return self.make(tok, start, self.pos),
                None => {
                    self.diagnostics.push(Diagnostic::error(
                        format!("unexpected character `{}`", ch as char),
                        Span::new(start as u32, self.pos as u32),
                    ));
                    // Skip it and keep lexing so later errors surface too.
                }
            }
        }
    }

    fn scan_number(&mut self, start: usize) -> Spanned<Token> {
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }

        let mut is_float = false;
        if self.pos + 1 < self.source.len()
            && self.source[self.pos] == b'.'
            && self.source[self.pos + 1].is_ascii_digit()
        {
            is_float = true;
            self.pos += 1;
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.pos < self.source.len() && matches!(self.source[self.pos], b'e' | b'E') {
            let mut lookahead = self.pos + 1;
            if lookahead < self.source.len() && matches!(self.source[lookahead], b'+' | b'-') {
                lookahead += 1;
            }
            if lookahead < self.source.len() && self.source[lookahead].is_ascii_digit() {
                is_float = true;
                self.pos = lookahead;
                while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("numeric characters are ascii")
            .to_string();
        if is_float {
            match text.parse::<f64>() {
                Ok(value) => self.make(Token::Float(value), start, self.pos),
                Err(_) => self.number_error(&text, start),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.make(Token::Int(value), start, self.pos),
                Err(_) => self.number_error(&text, start),
            }
        }
    }

    fn number_error(&mut self, text: &str, start: usize) -> Spanned<Token> {
        self.diagnostics.push(Diagnostic::error(
            format!("numeric literal `{text}` is out of range"),
            Span::new(start as u32, self.pos as u32),
        ));
        self.make(Token::Int(0), start, self.pos)
    }

    fn scan_ident(&mut self, start: usize) -> Spanned<Token> {
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("identifier characters are ascii")
            .to_string();
        self.make(Token::Ident(text), start, self.pos)
    }

    fn make(&self, token: Token, start: usize, end: usize) -> Spanned<Token> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        let (tokens, diagnostics) = Lexer::new(source).tokenize();
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        tokens.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex("42"), vec![Token::Int(42), Token::Eof]);
        assert_eq!(lex("2.5"), vec![Token::Float(2.5), Token::Eof]);
        assert_eq!(lex("1e3"), vec![Token::Float(1000.0), Token::Eof]);
    }

    #[test]
    fn test_expression() {
        assert_eq!(
            lex("(x + 2) * 3"),
            vec![
                Token::LParen,
                Token::Ident("x".to_string()),
                Token::Plus,
                Token::Int(2),
                Token::RParen,
                Token::Star,
                Token::Int(3),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character_is_reported() {
        let (tokens, diagnostics) = Lexer::new("1 ? 2").tokenize();
        assert_eq!(diagnostics.len(), 1);
        let kinds: Vec<Token> = tokens.into_iter().map(|t| t.node).collect();
        assert_eq!(kinds, vec![Token::Int(1), Token::Int(2), Token::Eof]);
    }

    #[test]
    fn test_spans() {
        let (tokens, _) = Lexer::new("ab + 1").tokenize();
        assert_eq!(tokens[0].span, Span::new(0, 2));
        assert_eq!(tokens[1].span, Span::new(3, 4));
        assert_eq!(tokens[2].span, Span::new(5, 6));
    }
}
