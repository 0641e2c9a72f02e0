//! Infix to postfix translation.
//!
//! Precedence, tightest first: unary `-`/`!`, `^` (right-associative), `* /`, `+ -`,
//! comparisons, `&&`, `||`. `f(a, b)` becomes `a b f`.

use crate::error::EvalError;

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Number(String),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 15] = [
    "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "^", "<", ">", "!", "=",
];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@')
}

fn lex(text: &str) -> Result<Vec<Tok>, EvalError> {
    let err = |message: String| EvalError::Infix {
        expression: text.to_string(),
        message,
    };
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string".into())),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') if i + 1 < chars.len() => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&other) => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                out.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let number: String = chars[start..i].iter().collect();
                if number.parse::<f64>().is_err() {
                    return Err(err(format!("bad number `{number}`")));
                }
                out.push(Tok::Number(number));
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                out.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| err(format!("unexpected character `{c}`")))?;
                if *op == "=" {
                    return Err(err("`=` is not an operator (use `==`)".into()));
                }
                i += op.chars().count();
                out.push(Tok::Op(op));
            }
        }
    }
    Ok(out)
}

struct Parser<'a> {
    text: &'a str,
    toks: Vec<Tok>,
    pos: usize,
    out: Vec<String>,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::Infix {
            expression: self.text.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Tok::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<(), EvalError>,
    ) -> Result<(), EvalError> {
        next(self)?;
        while let Some(op) = self.eat_op(ops) {
            next(self)?;
            self.out.push(op.to_string());
        }
        Ok(())
    }

    fn or(&mut self) -> Result<(), EvalError> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<(), EvalError> {
        self.binary_level(&["&&"], Self::comparison)
    }

    fn comparison(&mut self) -> Result<(), EvalError> {
        self.binary_level(&["<", "<=", ">", ">=", "==", "!="], Self::additive)
    }

    fn additive(&mut self) -> Result<(), EvalError> {
        self.binary_level(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<(), EvalError> {
        self.binary_level(&["*", "/"], Self::power)
    }

    fn power(&mut self) -> Result<(), EvalError> {
        self.unary()?;
        if self.eat_op(&["^"]).is_some() {
            self.power()?;
            self.out.push("pow".to_string());
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), EvalError> {
        match self.eat_op(&["-", "!", "+"]) {
            Some("-") => {
                self.unary()?;
                self.out.push("chs".to_string());
                Ok(())
            }
            Some("!") => {
                self.unary()?;
                self.out.push("!".to_string());
                Ok(())
            }
            Some(_) => self.unary(),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<(), EvalError> {
        let tok = self
            .toks
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match tok {
            Tok::Number(n) => self.out.push(n),
            Tok::Str(s) => self.out.push(quote(&s)),
            Tok::Ident(name) => {
                if self.peek() == Some(&Tok::LParen) {
                    self.pos += 1;
                    if self.peek() == Some(&Tok::RParen) {
                        self.pos += 1;
                    } else {
                        loop {
                            self.or()?;
                            match self.toks.get(self.pos) {
                                Some(Tok::Comma) => self.pos += 1,
                                Some(Tok::RParen) => {
                                    self.pos += 1;
                                    break;
                                }
                                _ => return Err(self.error(format!("expected `,` or `)` in call to `{name}`"))),
                            }
                        }
                    }
                }
                self.out.push(name);
            }
            Tok::LParen => {
                self.or()?;
                if self.toks.get(self.pos) != Some(&Tok::RParen) {
                    return Err(self.error("missing `)`"));
                }
                self.pos += 1;
            }
            other => return Err(self.error(format!("unexpected {other:?}"))),
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Translate an infix expression into whitespace-separated postfix text.
pub fn infix_to_postfix(text: &str) -> Result<String, EvalError> {
    let toks = lex(text)?;
    if toks.is_empty() {
        return Err(EvalError::Infix {
            expression: text.to_string(),
            message: "empty expression".into(),
        });
    }
    let mut parser = Parser {
        text,
        toks,
        pos: 0,
        out: Vec::new(),
    };
    parser.or()?;
    if parser.pos != parser.toks.len() {
        return Err(parser.error(format!("unexpected {:?}", parser.toks[parser.pos])));
    }
    Ok(parser.out.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(infix_to_postfix("1 + 2 * 3").unwrap(), "1 2 3 * +");
        assert_eq!(infix_to_postfix("(1 + 2) * 3").unwrap(), "1 2 + 3 *");
        assert_eq!(infix_to_postfix("2 ^ 3 ^ 2").unwrap(), "2 3 2 pow pow");
        assert_eq!(infix_to_postfix("-x ^ 2").unwrap(), "x chs 2 pow");
        assert_eq!(infix_to_postfix("a - b - c").unwrap(), "a b - c -");
        assert_eq!(
            infix_to_postfix("x < 1 || y >= 2 && !z").unwrap(),
            "x 1 < y 2 >= z ! && ||"
        );
    }

    #[test]
    fn calls_and_strings() {
        assert_eq!(infix_to_postfix("atan2(x, y + 1)").unwrap(), "x y 1 + atan2");
        assert_eq!(infix_to_postfix("pi()").unwrap(), "pi");
        assert_eq!(infix_to_postfix("1.5e-3*Q").unwrap(), "1.5e-3 Q *");
        assert_eq!(infix_to_postfix(r#"strlen("a b")"#).unwrap(), r#""a b" strlen"#);
    }

    #[test]
    fn malformed_input_is_rejected() {
        for text in ["", "1 +", "(1", "1 2", "f(1,", "a = b", "1 # 2"] {
            assert!(
                matches!(infix_to_postfix(text), Err(EvalError::Infix { .. })),
                "{text}"
            );
        }
    }
}
