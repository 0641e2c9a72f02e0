use thiserror::Error;

/// One converted field produced by [`sscanf`].
#[derive(Clone, Debug, PartialEq)]
pub enum Scanned {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Char(u8),
}

impl Scanned {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scanned::Int(v) => Some(*v as f64),
            Scanned::UInt(v) => Some(*v as f64),
            Scanned::Float(v) => Some(*v),
            Scanned::Char(c) => Some(*c as f64),
            Scanned::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Scanned::Int(v) => v.to_string(),
            Scanned::UInt(v) => v.to_string(),
            Scanned::Float(v) => v.to_string(),
            Scanned::Char(c) => (c as char).to_string(),
            Scanned::Str(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("invalid conversion `{spec}` in scan format `{format}`")]
    BadConversion { format: String, spec: String },
    #[error("`{input}` does not match scan format `{format}`")]
    NoMatch { input: String, format: String },
}

/// Scan `input` according to a C `scanf` template.
///
/// Returns the fields converted before the first mismatch; an input that stops matching
/// part way through yields a shorter vector, mirroring the C return count.
pub fn sscanf(input: &str, format: &str) -> Result<Vec<Scanned>, ScanError> {
    let bad = |spec: &str| ScanError::BadConversion {
        format: format.to_string(),
        spec: spec.to_string(),
    };
    let src: Vec<char> = input.chars().collect();
    let fmt: Vec<char> = format.chars().collect();
    let mut pos = 0usize;
    let mut f = 0usize;
    let mut out = Vec::new();

    while f < fmt.len() {
        let c = fmt[f];
        if c.is_whitespace() {
            while f < fmt.len() && fmt[f].is_whitespace() {
                f += 1;
            }
            skip_ws(&src, &mut pos);
            continue;
        }
        if c != '%' {
            if src.get(pos) != Some(&c) {
                return Ok(out);
            }
            pos += 1;
            f += 1;
            continue;
        }

        let spec_start = f;
        f += 1;
        if fmt.get(f) == Some(&'%') {
            skip_ws(&src, &mut pos);
            if src.get(pos) != Some(&'%') {
                return Ok(out);
            }
            pos += 1;
            f += 1;
            continue;
        }
        let suppress = fmt.get(f) == Some(&'*');
        if suppress {
            f += 1;
        }
        let mut width: Option<usize> = None;
        while let Some(d) = fmt.get(f).and_then(|c| c.to_digit(10)) {
            width = Some(width.unwrap_or(0) * 10 + d as usize);
            f += 1;
        }
        while matches!(fmt.get(f), Some('h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't')) {
            f += 1;
        }
        let Some(&conv) = fmt.get(f) else {
            return Err(bad(&fmt[spec_start..].iter().collect::<String>()));
        };
        f += 1;

        let field = match conv {
            'd' | 'i' | 'u' | 'x' | 'X' | 'o' => {
                skip_ws(&src, &mut pos);
                let radix = match conv {
                    'x' | 'X' => 16,
                    'o' => 8,
                    _ => 10,
                };
                match take_integer(&src, &mut pos, width, radix) {
                    Some((negative, magnitude)) => {
                        if conv == 'd' || conv == 'i' {
                            let v = magnitude as i64;
                            Scanned::Int(if negative { v.wrapping_neg() } else { v })
                        } else if negative {
                            Scanned::UInt((magnitude as u64).wrapping_neg())
                        } else {
                            Scanned::UInt(magnitude as u64)
                        }
                    }
                    None => return Ok(out),
                }
            }
            'f' | 'e' | 'g' | 'E' | 'G' | 'F' => {
                skip_ws(&src, &mut pos);
                match take_float(&src, &mut pos, width) {
                    Some(v) => Scanned::Float(v),
                    None => return Ok(out),
                }
            }
            's' => {
                skip_ws(&src, &mut pos);
                let limit = width.unwrap_or(usize::MAX);
                let start = pos;
                while pos < src.len() && !src[pos].is_whitespace() && pos - start < limit {
                    pos += 1;
                }
                if pos == start {
                    return Ok(out);
                }
                Scanned::Str(src[start..pos].iter().collect())
            }
            'c' => {
                let n = width.unwrap_or(1);
                if pos + n > src.len() {
                    return Ok(out);
                }
                let text: String = src[pos..pos + n].iter().collect();
                pos += n;
                if n == 1 {
                    Scanned::Char(text.bytes().next().unwrap_or(0))
                } else {
                    Scanned::Str(text)
                }
            }
            '[' => {
                let (set, next) = parse_set(&fmt, f)
                    .ok_or_else(|| bad(&fmt[spec_start..].iter().collect::<String>()))?;
                f = next;
                let limit = width.unwrap_or(usize::MAX);
                let start = pos;
                while pos < src.len() && set.matches(src[pos]) && pos - start < limit {
                    pos += 1;
                }
                if pos == start {
                    return Ok(out);
                }
                Scanned::Str(src[start..pos].iter().collect())
            }
            _ => return Err(bad(&fmt[spec_start..f].iter().collect::<String>())),
        };
        if !suppress {
            out.push(field);
        }
    }
    Ok(out)
}

/// The first converted field, or [`ScanError::NoMatch`] if nothing converted.
pub fn sscanf_first(input: &str, format: &str) -> Result<Scanned, ScanError> {
    sscanf(input, format)?
        .into_iter()
        .next()
        .ok_or_else(|| ScanError::NoMatch {
            input: input.to_string(),
            format: format.to_string(),
        })
}

fn skip_ws(src: &[char], pos: &mut usize) {
    while *pos < src.len() && src[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn take_integer(
    src: &[char],
    pos: &mut usize,
    width: Option<usize>,
    radix: u32,
) -> Option<(bool, u128)> {
    let limit = width.unwrap_or(usize::MAX);
    let start = *pos;
    let mut i = *pos;
    let mut negative = false;
    if i < src.len() && (src[i] == '+' || src[i] == '-') && i - start < limit {
        negative = src[i] == '-';
        i += 1;
    }
    if radix == 16
        && i + 1 < src.len()
        && src[i] == '0'
        && matches!(src[i + 1], 'x' | 'X')
        && i + 2 - start < limit
    {
        i += 2;
    }
    let digits_start = i;
    let mut value: u128 = 0;
    while i < src.len() && i - start < limit {
        let Some(d) = src[i].to_digit(radix) else { break };
        value = value.saturating_mul(radix as u128).saturating_add(d as u128);
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    *pos = i;
    Some((negative, value))
}

fn take_float(src: &[char], pos: &mut usize, width: Option<usize>) -> Option<f64> {
    let limit = width.unwrap_or(usize::MAX);
    let start = *pos;
    let rest: String = src[start..].iter().take(limit).collect();
    let lower = rest.to_ascii_lowercase();
    let (sign_len, unsigned) = match lower.as_bytes().first() {
        Some(b'+') | Some(b'-') => (1, &lower[1..]),
        _ => (0, lower.as_str()),
    };
    for (word, value) in [("infinity", f64::INFINITY), ("inf", f64::INFINITY), ("nan", f64::NAN)] {
        if unsigned.starts_with(word) {
            *pos = start + sign_len + word.len();
            let negative = lower.starts_with('-');
            return Some(if negative { -value } else { value });
        }
    }

    let bytes = rest.as_bytes();
    let mut i = sign_len;
    let mut mantissa_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        mantissa_digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    let value = rest[..i].parse::<f64>().ok()?;
    *pos = start + rest[..i].chars().count();
    Some(value)
}

struct CharSet {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharSet {
    fn matches(&self, c: char) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != self.negated
    }
}

/// Parse a `[...]` scanset whose body begins at `f`; returns the set and the index after `]`.
fn parse_set(fmt: &[char], mut f: usize) -> Option<(CharSet, usize)> {
    let mut set = CharSet {
        negated: false,
        ranges: Vec::new(),
    };
    if fmt.get(f) == Some(&'^') {
        set.negated = true;
        f += 1;
    }
    // A leading `]` is a literal member.
    if fmt.get(f) == Some(&']') {
        set.ranges.push((']', ']'));
        f += 1;
    }
    loop {
        let c = *fmt.get(f)?;
        if c == ']' {
            return Some((set, f + 1));
        }
        if fmt.get(f + 1) == Some(&'-') && fmt.get(f + 2).is_some_and(|&n| n != ']') {
            let hi = fmt[f + 2];
            set.ranges.push((c, hi));
            f += 3;
        } else {
            set.ranges.push((c, c));
            f += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_and_words() {
        assert_eq!(
            sscanf("  12 -3.5e2 abc", "%d %lf %s").expect("scan"),
            vec![Scanned::Int(12), Scanned::Float(-350.0), Scanned::Str("abc".into())]
        );
    }

    #[test]
    fn literals_must_match() {
        assert_eq!(
            sscanf("x=4,y=5", "x=%d,y=%d").expect("scan"),
            vec![Scanned::Int(4), Scanned::Int(5)]
        );
        assert_eq!(sscanf("x=4;y=5", "x=%d,y=%d").expect("scan"), vec![Scanned::Int(4)]);
    }

    #[test]
    fn suppression_width_and_sets() {
        assert_eq!(
            sscanf("abc123def", "%*[a-z]%2d%s").expect("scan"),
            vec![Scanned::Int(12), Scanned::Str("3def".into())]
        );
        assert_eq!(
            sscanf("key: value here", "%[^:]: %c").expect("scan"),
            vec![Scanned::Str("key".into()), Scanned::Char(b'v')]
        );
        assert_eq!(sscanf("ff", "%x").expect("scan"), vec![Scanned::UInt(255)]);
    }

    #[test]
    fn first_field_or_no_match() {
        assert_eq!(sscanf_first("nan", "%lf").map(|s| s.as_f64().map(f64::is_nan)), Ok(Some(true)));
        assert!(matches!(sscanf_first("abc", "%lf"), Err(ScanError::NoMatch { .. })));
        assert!(matches!(sscanf("1", "%y"), Err(ScanError::BadConversion { .. })));
    }
}
