//! Command-line text handling: SDDS-style option spellings, comma lists and `key=value`
//! qualifiers.

use std::ffi::OsString;

use sdds_engine::ProcessError;

/// Rewrite `-name[=value]` (and `--Name`) to `--name[=value]` with a lowercase name.
///
/// Bare `-`, positional arguments and everything after `--` pass through unchanged.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut options_done = false;
    for (i, arg) in args.into_iter().enumerate() {
        if i == 0 || options_done {
            out.push(arg);
            continue;
        }
        let Some(text) = arg.to_str() else {
            out.push(arg);
            continue;
        };
        if text == "--" {
            options_done = true;
            out.push(arg);
            continue;
        }
        let body = text.strip_prefix("--").or_else(|| text.strip_prefix('-'));
        match body {
            Some(body) if body.starts_with(|c: char| c.is_ascii_alphabetic()) => {
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value)),
                    None => (body, None),
                };
                let mut normalized = format!("--{}", name.to_ascii_lowercase());
                if let Some(value) = value {
                    normalized.push('=');
                    normalized.push_str(value);
                }
                out.push(normalized.into());
            }
            _ => out.push(arg),
        }
    }
    out
}

/// Split an option value on commas. Double quotes group (and are removed); `\,` is a literal
/// comma.
pub fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            '\\' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

/// Resolve `word` against `keywords`: case-insensitive, exact or unique prefix.
pub fn match_keyword<'k>(word: &str, keywords: &[&'k str]) -> Option<&'k str> {
    let lower = word.to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    if let Some(exact) = keywords.iter().find(|k| k.eq_ignore_ascii_case(&lower)) {
        return Some(exact);
    }
    let mut candidates = keywords
        .iter()
        .filter(|k| k.to_ascii_lowercase().starts_with(&lower));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// A `key=value` or bare-flag qualifier, with the key resolved to its canonical spelling.
#[derive(Debug, PartialEq, Eq)]
pub struct Qualifier<'k> {
    pub key: &'k str,
    pub value: Option<String>,
}

/// Parse `items` as qualifiers drawn from `keywords`.
pub fn qualifiers<'k>(
    option: &str,
    items: &[String],
    keywords: &[&'k str],
) -> Result<Vec<Qualifier<'k>>, ProcessError> {
    items
        .iter()
        .map(|item| {
            let (key, value) = match item.split_once('=') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (item.as_str(), None),
            };
            let key = match_keyword(key, keywords).ok_or_else(|| {
                ProcessError::Usage(format!("-{option}: unknown qualifier `{item}`"))
            })?;
            Ok(Qualifier { key, value })
        })
        .collect()
}

impl Qualifier<'_> {
    /// The value of a qualifier that requires one.
    pub fn required(&self, option: &str) -> Result<&str, ProcessError> {
        self.value
            .as_deref()
            .ok_or_else(|| ProcessError::Usage(format!("-{option}: `{}` needs a value", self.key)))
    }

    pub fn number(&self, option: &str) -> Result<f64, ProcessError> {
        let text = self.required(option)?;
        text.trim().parse().map_err(|_| {
            ProcessError::Usage(format!("-{option}: `{}={text}` is not a number", self.key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn single_dash_options_become_long_options() {
        assert_eq!(
            normalize_args(os(&[
                "sddsprocess",
                "in.sdds",
                "-define=column,Y,X 2 *",
                "-majorOrder=row",
                "--Verbose",
                "-",
                "-1",
            ])),
            os(&[
                "sddsprocess",
                "in.sdds",
                "--define=column,Y,X 2 *",
                "--majororder=row",
                "--verbose",
                "-",
                "-1",
            ])
        );
    }

    #[test]
    fn values_after_double_dash_are_left_alone() {
        assert_eq!(
            normalize_args(os(&["p", "--", "-odd-name.sdds"])),
            os(&["p", "--", "-odd-name.sdds"])
        );
    }

    #[test]
    fn lists_honor_quotes_and_escaped_commas() {
        assert_eq!(
            split_list(r#"column,label,"%s, %s",a\,b,c"#),
            ["column", "label", "%s, %s", "a,b", "c"]
        );
        assert_eq!(split_list(""), [""]);
        assert_eq!(split_list("a,,b"), ["a", "", "b"]);
    }

    #[test]
    fn keywords_accept_unique_prefixes() {
        let keys = ["functionOf", "factor", "fhead", "ftail"];
        assert_eq!(match_keyword("FUNC", &keys), Some("functionOf"));
        assert_eq!(match_keyword("fa", &keys), Some("factor"));
        assert_eq!(match_keyword("f", &keys), None);
        assert_eq!(match_keyword("fhead", &keys), Some("fhead"));
    }

    #[test]
    fn qualifiers_resolve_keys() {
        let items = vec!["weight=w".to_string(), "pos".to_string()];
        let parsed = qualifiers("process", &items, &["weightBy", "position"]).expect("qualifiers");
        assert_eq!(
            parsed,
            [
                Qualifier {
                    key: "weightBy",
                    value: Some("w".into())
                },
                Qualifier {
                    key: "position",
                    value: None
                },
            ]
        );
        let bad = vec!["bogus=1".to_string()];
        assert!(matches!(
            qualifiers("process", &bad, &["weightBy"]),
            Err(ProcessError::Usage(_))
        ));
    }
}
