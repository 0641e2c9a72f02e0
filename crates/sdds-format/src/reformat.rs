use crate::printf::{sprintf, Arg, FormatError};

pub const DEFAULT_STRING_FORMAT: &str = "%s";
pub const DEFAULT_DOUBLE_FORMAT: &str = "%21.15e";
pub const DEFAULT_LONG_FORMAT: &str = "%ld";

/// Re-render each whitespace-separated token of `text`.
///
/// Integer tokens go through `long_fmt`, other numeric tokens through `double_fmt`, and
/// everything else through `string_fmt`. Pieces are joined with single spaces.
pub fn reformat_tokens(
    text: &str,
    string_fmt: Option<&str>,
    double_fmt: Option<&str>,
    long_fmt: Option<&str>,
) -> Result<String, FormatError> {
    let string_fmt = string_fmt.unwrap_or(DEFAULT_STRING_FORMAT);
    let double_fmt = double_fmt.unwrap_or(DEFAULT_DOUBLE_FORMAT);
    let long_fmt = long_fmt.unwrap_or(DEFAULT_LONG_FORMAT);

    let mut pieces = Vec::new();
    for token in text.split_whitespace() {
        let piece = if let Ok(v) = token.parse::<i64>() {
            sprintf(long_fmt, &[Arg::Int(v)])?
        } else if let Some(v) = parse_float_token(token) {
            sprintf(double_fmt, &[Arg::Float(v)])?
        } else {
            sprintf(string_fmt, &[Arg::Str(token)])?
        };
        pieces.push(piece);
    }
    Ok(pieces.join(" "))
}

fn parse_float_token(token: &str) -> Option<f64> {
    // Rust also accepts "inf"/"nan"; only digit-bearing tokens count as numbers here.
    if !token.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tokens_are_classified() {
        let out = reformat_tokens("run 12 2.5", Some("<%s>"), Some("%.2f"), Some("%04ld"))
            .expect("reformat");
        assert_eq!(out, "<run> 0012 2.50");
    }

    #[test]
    fn defaults_apply() {
        let out = reformat_tokens("  7   x ", None, None, None).expect("reformat");
        assert_eq!(out, "7 x");
        let out = reformat_tokens("0.5", None, None, None).expect("reformat");
        assert_eq!(out, "5.000000000000000e-01");
    }
}
