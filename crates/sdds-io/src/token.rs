use std::borrow::Cow;

/// Quote `text` if it would not survive whitespace tokenization on its own.
///
/// Quoted tokens escape `"` and `\`; control bytes become three-digit octal escapes.
pub fn quote(text: &str) -> Cow<'_, str> {
    let plain = !text.is_empty()
        && !text.starts_with('!')
        && text
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '"' && c != '\\');
    if plain {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() && (c as u32) < 0o400 => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    Cow::Owned(out)
}

/// Split a data line into tokens, honoring double quotes and backslash escapes.
///
/// Returns `Err` with a message for an unterminated quote.
pub fn split_tokens(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => unescape(&mut chars, &mut token),
                    c => token.push(c),
                }
            }
            if !closed {
                return Err(format!("unterminated quoted string in `{line}`"));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                chars.next();
                if c == '\\' {
                    unescape(&mut chars, &mut token);
                } else {
                    token.push(c);
                }
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}

fn unescape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    let Some(&first) = chars.peek() else {
        out.push('\\');
        return;
    };
    if first.is_digit(8) {
        let mut code = 0u32;
        for _ in 0..3 {
            match chars.peek().and_then(|c| c.to_digit(8)) {
                Some(d) => {
                    code = code * 8 + d;
                    chars.next();
                }
                None => break,
            }
        }
        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
        return;
    }
    chars.next();
    out.push(match first {
        'n' => '\n',
        't' => '\t',
        other => other,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn quoting_is_minimal() {
        assert_eq!(quote("abc"), "abc");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("a b"), "\"a b\"");
        assert_eq!(quote("say \"hi\""), r#""say \"hi\"""#);
        assert_eq!(quote("!bang"), "\"!bang\"");
        assert_eq!(quote("\0"), r#""\000""#);
    }

    #[test]
    fn tokens_unescape() {
        assert_eq!(
            split_tokens(r#"1 "a b" "" "q\"x" \101"#).expect("tokens"),
            vec!["1", "a b", "", "q\"x", "A"]
        );
        assert!(split_tokens("\"open").is_err());
    }
}
