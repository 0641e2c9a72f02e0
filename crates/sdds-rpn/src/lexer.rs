use crate::error::EvalError;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Word(String),
}

/// Split RPN text into tokens.
///
/// Tokens are whitespace-separated. A token starting with `"` runs to the next unescaped
/// `"` and may contain whitespace; `\"`, `\\`, `\n` and `\t` are recognized inside it.
pub fn tokenize(text: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut s = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some(other) => s.push(other),
                        None => break,
                    },
                    other => s.push(other),
                }
            }
            if !closed {
                return Err(EvalError::UnterminatedString(text.to_string()));
            }
            tokens.push(Token::Str(s));
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            word.push(c);
            chars.next();
        }
        tokens.push(classify(word));
    }
    Ok(tokens)
}

fn classify(word: String) -> Token {
    let numeric_start = word
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'));
    if numeric_start && word.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(v) = word.parse::<f64>() {
            return Token::Number(v);
        }
    }
    Token::Word(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn words_numbers_and_strings() {
        let tokens = tokenize(r#"1.5e3 -2 x "a \"b\" c" sto +"#).expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Number(1500.0),
                Token::Number(-2.0),
                Token::Word("x".into()),
                Token::Str(r#"a "b" c"#.into()),
                Token::Word("sto".into()),
                Token::Word("+".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(
            tokenize(r#""abc"#),
            Err(EvalError::UnterminatedString(_))
        ));
    }
}
