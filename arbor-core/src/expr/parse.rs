//! Expression parser.
//!
//! A small hand-written tokenizer plus a precedence-climbing parser. Template
//! parsing proper happens elsewhere; this only covers the expression language
//! used inside bindings:
//!
//! - accessors: `a.b`, `a[0]`, `a["key"]`, `a[i]`, `a[b.c]`
//! - literals: numbers, `'single'` / `"double"` strings, `true`, `false`, `null`
//! - unary `!` and `-`, binary arithmetic / comparison / logical operators
//! - `cond ? a : b` and parentheses

use crate::error::ExprError;

use super::{BinaryOp, Expr, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Punct(&'static str),
}

/// Punctuation, longest first so `===` wins over `==`.
const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", ".", "[", "]", "(", ")", "?", ":", "!",
    "+", "-", "*", "/", "%", "<", ">",
];

/// Operator precedence levels (higher binds tighter).
fn precedence(token: &Token) -> Option<(u8, BinaryOp)> {
    let Token::Punct(p) = token else {
        return None;
    };
    let entry = match *p {
        "||" => (1, BinaryOp::Or),
        "&&" => (2, BinaryOp::And),
        "==" => (3, BinaryOp::Eq),
        "!=" => (3, BinaryOp::NotEq),
        "===" => (3, BinaryOp::StrictEq),
        "!==" => (3, BinaryOp::StrictNotEq),
        "<" => (4, BinaryOp::Lt),
        ">" => (4, BinaryOp::Gt),
        "<=" => (4, BinaryOp::LtEq),
        ">=" => (4, BinaryOp::GtEq),
        "+" => (5, BinaryOp::Add),
        "-" => (5, BinaryOp::Sub),
        "*" => (6, BinaryOp::Mul),
        "/" => (6, BinaryOp::Div),
        "%" => (6, BinaryOp::Mod),
        _ => return None,
    };
    Some(entry)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

/// Parse an expression.
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Parse an expression that must be an accessor path (a write target).
pub fn parse_accessor(input: &str) -> Result<Expr, ExprError> {
    match parse_expr(input)? {
        expr @ Expr::Accessor(_) => Ok(expr),
        _ => Err(ExprError::Parse {
            input: input.to_string(),
            position: 0,
            message: "expected an accessor path".to_string(),
        }),
    }
}

/// Parse interpolated text such as `Hello {{name}}!`.
pub fn parse_text(input: &str) -> Result<Expr, ExprError> {
    let mut parts = Vec::new();
    let mut rest = input;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            return Err(ExprError::Parse {
                input: input.to_string(),
                position: offset + open,
                message: "unterminated interpolation".to_string(),
            });
        };
        if open > 0 {
            parts.push(Expr::String(rest[..open].to_string()));
        }
        let source = &rest[open + 2..open + 2 + close];
        let expr = parse_expr(source.trim()).map_err(|err| match err {
            ExprError::Parse {
                position, message, ..
            } => ExprError::Parse {
                input: input.to_string(),
                position: offset + open + 2 + position,
                message,
            },
        })?;
        parts.push(expr);

        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    if !rest.is_empty() {
        parts.push(Expr::String(rest.to_string()));
    }
    Ok(Expr::Text(parts))
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |position: usize, message: &str| ExprError::Parse {
        input: input.to_string(),
        position,
        message: message.to_string(),
    };

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_digit()
                    || (bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)))
            {
                i += 1;
            }
            let number = input[start..i]
                .parse()
                .map_err(|_| error(start, "invalid number"))?;
            tokens.push((Token::Number(number), start));
        } else if c == b'\'' || c == b'"' {
            let start = i;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(ch) = input[i..].chars().next() else {
                    return Err(error(start, "unterminated string"));
                };
                i += ch.len_utf8();
                match ch {
                    '\\' => {
                        let Some(escaped) = input[i..].chars().next() else {
                            return Err(error(start, "unterminated string"));
                        };
                        i += escaped.len_utf8();
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                    ch if ch as u32 == u32::from(c) => break,
                    ch => value.push(ch),
                }
            }
            tokens.push((Token::Str(value), start));
        } else if c.is_ascii_alphabetic() || c == b'_' || c == b'$' || !c.is_ascii() {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric()
                    || bytes[i] == b'_'
                    || bytes[i] == b'$'
                    || !bytes[i].is_ascii())
            {
                i += 1;
            }
            tokens.push((Token::Ident(input[start..i].to_string()), start));
        } else if let Some(p) = PUNCTUATION.iter().find(|p| input[i..].starts_with(**p)) {
            tokens.push((Token::Punct(*p), i));
            i += p.len();
        } else {
            return Err(error(i, "unexpected character"));
        }
    }
    Ok(tokens)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input.len(), |(_, position)| *position)
    }

    fn error(&self, message: &str) -> ExprError {
        ExprError::Parse {
            input: self.input.to_string(),
            position: self.position(),
            message: message.to_string(),
        }
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), ExprError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{punct}`")))
        }
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        let cond = self.binary(1)?;
        if self.eat("?") {
            let then = self.expression()?;
            self.expect(":")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        while let Some((level, op)) = self.peek().and_then(precedence) {
            if level < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.binary(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat("-") {
            return Ok(match self.unary()? {
                Expr::Number(n) => Expr::Number(-n),
                other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of input"));
        };
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::String(s))
            }
            Token::Ident(name) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" | "undefined" => Ok(Expr::Null),
                    _ => self.accessor(name),
                }
            }
            Token::Punct("(") => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct(_) => Err(self.error("unexpected token")),
        }
    }

    fn accessor(&mut self, root: String) -> Result<Expr, ExprError> {
        let mut paths = vec![Expr::String(root)];
        loop {
            if self.eat(".") {
                match self.peek().cloned() {
                    Some(Token::Ident(name)) => {
                        self.pos += 1;
                        paths.push(Expr::String(name));
                    }
                    Some(Token::Number(n)) if n.fract() == 0.0 => {
                        self.pos += 1;
                        paths.push(Expr::Number(n));
                    }
                    _ => return Err(self.error("expected property name after `.`")),
                }
            } else if self.eat("[") {
                let segment = self.expression()?;
                self.expect("]")?;
                paths.push(segment);
            } else {
                return Ok(Expr::Accessor(paths));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Expr {
        Expr::String(v.to_string())
    }

    #[test]
    fn parses_accessor_segments() {
        let expr = parse_expr("list[2].name['x'][i.j]").unwrap();
        assert_eq!(
            expr,
            Expr::Accessor(vec![
                s("list"),
                Expr::Number(2.0),
                s("name"),
                s("x"),
                Expr::Accessor(vec![s("i"), s("j")]),
            ])
        );
    }

    #[test]
    fn respects_precedence() {
        let expr = parse_expr("a || b && c == 1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "(a || (b && (c == (1 + (2 * 3)))))");
    }

    #[test]
    fn parses_conditional_and_unary() {
        let expr = parse_expr("!done ? -1 : (n - 1)").unwrap();
        assert_eq!(expr.to_string(), "(!done ? -1 : (n - 1))");
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse_expr("a.[1]"),
            Err(ExprError::Parse { position: 2, .. })
        ));
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("'open").is_err());
        assert!(parse_accessor("1 + 2").is_err());
    }

    #[test]
    fn parses_interpolated_text() {
        let expr = parse_text("Hi {{ user.name }}, you have {{count}}").unwrap();
        assert_eq!(
            expr,
            Expr::Text(vec![
                s("Hi "),
                Expr::Accessor(vec![s("user"), s("name")]),
                s(", you have "),
                Expr::Accessor(vec![s("count")]),
            ])
        );
        assert!(parse_text("broken {{ x").is_err());
    }
}
