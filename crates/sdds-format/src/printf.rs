use thiserror::Error;

/// One argument to [`sprintf`].
#[derive(Clone, Debug, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(&'a str),
    Char(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("format `{format}` needs more than {given} argument(s)")]
    MissingArgument { format: String, given: usize },
    #[error("invalid conversion `{spec}` in format `{format}`")]
    BadConversion { format: String, spec: String },
    #[error("cannot format `{value}` with conversion `%{conversion}`")]
    Coerce { value: String, conversion: char },
}

#[derive(Clone, Copy, Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

/// Format `args` according to a C `printf` template.
///
/// Supported: flags `-+ #0`, width, precision, length modifiers (accepted and ignored) and
/// the conversions `d i u o x X e E f F g G s c %`. Surplus arguments are ignored.
pub fn sprintf(format: &str, args: &[Arg<'_>]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(format.len() + 16);
    let mut chars = format.char_indices().peekable();
    let mut next_arg = 0usize;

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if let Some(&(_, '%')) = chars.peek() {
            chars.next();
            out.push('%');
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&(_, f)) = chars.peek() {
            match f {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alt = true,
                '0' => spec.zero = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = take_digits(&mut chars).unwrap_or(0);
        if let Some(&(_, '.')) = chars.peek() {
            chars.next();
            spec.precision = Some(take_digits(&mut chars).unwrap_or(0));
        }
        while let Some(&(_, m)) = chars.peek() {
            if matches!(m, 'h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't') {
                chars.next();
            } else {
                break;
            }
        }
        let Some((end, conv)) = chars.next() else {
            return Err(FormatError::BadConversion {
                format: format.to_string(),
                spec: format[start..].to_string(),
            });
        };
        spec.conversion = conv;
        if !"diuoxXeEfFgGsc".contains(conv) {
            return Err(FormatError::BadConversion {
                format: format.to_string(),
                spec: format[start..end + conv.len_utf8()].to_string(),
            });
        }

        let Some(arg) = args.get(next_arg) else {
            return Err(FormatError::MissingArgument {
                format: format.to_string(),
                given: args.len(),
            });
        };
        next_arg += 1;
        out.push_str(&format_one(&spec, arg)?);
    }
    Ok(out)
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(&(_, d)) = chars.peek() {
        let Some(digit) = d.to_digit(10) else { break };
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit as usize));
        chars.next();
    }
    value
}

fn format_one(spec: &Spec, arg: &Arg<'_>) -> Result<String, FormatError> {
    let conv = spec.conversion;
    let body = match conv {
        'd' | 'i' => {
            let v = arg_to_i64(arg, conv)?;
            let digits = pad_precision(v.unsigned_abs().to_string(), spec.precision);
            return Ok(pad_numeric(spec, sign_prefix(spec, v < 0), "", digits));
        }
        'u' | 'o' | 'x' | 'X' => {
            let v = arg_to_u64(arg, conv)?;
            let (digits, prefix) = match conv {
                'o' => (format!("{v:o}"), if spec.alt && v != 0 { "0" } else { "" }),
                'x' => (format!("{v:x}"), if spec.alt && v != 0 { "0x" } else { "" }),
                'X' => (format!("{v:X}"), if spec.alt && v != 0 { "0X" } else { "" }),
                _ => (v.to_string(), ""),
            };
            let digits = pad_precision(digits, spec.precision);
            return Ok(pad_numeric(spec, "", prefix, digits));
        }
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
            let v = arg_to_f64(arg, conv)?;
            let upper = conv.is_ascii_uppercase();
            let digits = if v.is_nan() {
                if upper { "NAN" } else { "nan" }.to_string()
            } else if v.is_infinite() {
                if upper { "INF" } else { "inf" }.to_string()
            } else {
                let precision = spec.precision.unwrap_or(6);
                match conv.to_ascii_lowercase() {
                    'e' => format_exponential(v.abs(), precision, spec.alt, upper),
                    'f' => format_fixed(v.abs(), precision, spec.alt),
                    _ => format_general(v.abs(), precision, spec.alt, upper),
                }
            };
            let negative = v.is_sign_negative() && !v.is_nan();
            let mut spec = *spec;
            if !v.is_finite() {
                spec.zero = false;
            }
            return Ok(pad_numeric(&spec, sign_prefix(&spec, negative), "", digits));
        }
        's' => {
            let text = arg_to_string(arg);
            match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            }
        }
        'c' => match arg {
            Arg::Char(c) => (*c as char).to_string(),
            Arg::Str(s) => s.chars().next().map(String::from).unwrap_or_default(),
            other => {
                let v = arg_to_u64(other, conv)?;
                char::from_u32(v as u32).map(String::from).unwrap_or_default()
            }
        },
        _ => unreachable!("conversion validated by caller"),
    };
    Ok(pad_text(spec, body))
}

fn sign_prefix(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn pad_precision(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(0) if digits == "0" => String::new(),
        Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    }
}

fn pad_numeric(spec: &Spec, sign: &str, prefix: &str, digits: String) -> String {
    let len = sign.len() + prefix.len() + digits.len();
    if len >= spec.width {
        return format!("{sign}{prefix}{digits}");
    }
    let fill = spec.width - len;
    // Integer conversions ignore the 0 flag when a precision is given.
    let int_conv = "diuoxX".contains(spec.conversion);
    if spec.left {
        format!("{sign}{prefix}{digits}{}", " ".repeat(fill))
    } else if spec.zero && !(int_conv && spec.precision.is_some()) {
        format!("{sign}{prefix}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{sign}{prefix}{digits}", " ".repeat(fill))
    }
}

fn pad_text(spec: &Spec, body: String) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let fill = " ".repeat(spec.width - len);
    if spec.left {
        body + &fill
    } else {
        fill + &body
    }
}

fn format_fixed(v: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{v:.precision$}");
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

/// Split Rust's `{:e}` output into mantissa and a decimal exponent.
fn exp_parts(v: f64, precision: usize) -> (String, i32) {
    let s = format!("{v:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_string(), exp.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn format_exponential(v: f64, precision: usize, alt: bool, upper: bool) -> String {
    let (mut mantissa, exp) = exp_parts(v, precision);
    if alt && precision == 0 {
        mantissa.push('.');
    }
    let marker = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{marker}{sign}{:02}", exp.unsigned_abs())
}

fn format_general(v: f64, precision: usize, alt: bool, upper: bool) -> String {
    let p = if precision == 0 { 1 } else { precision };
    let (_, x) = exp_parts(v, p - 1);
    let x = if v == 0.0 { 0 } else { x };
    let mut s = if (x as i64) < p as i64 && x >= -4 {
        let frac = (p as i64 - 1 - x as i64).max(0) as usize;
        format!("{v:.frac$}")
    } else {
        format_exponential(v, p - 1, false, upper)
    };
    if !alt {
        s = strip_trailing_zeros(&s);
    } else if !s.contains('.') {
        match s.find(['e', 'E']) {
            Some(pos) => s.insert(pos, '.'),
            None => s.push('.'),
        }
    }
    s
}

fn strip_trailing_zeros(s: &str) -> String {
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    };
    if !mantissa.contains('.') {
        return s.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{exponent}")
}

fn arg_to_string(arg: &Arg<'_>) -> String {
    match arg {
        Arg::Int(v) => v.to_string(),
        Arg::UInt(v) => v.to_string(),
        Arg::Float(v) if v.is_nan() => "nan".to_string(),
        Arg::Float(v) if v.is_infinite() => if *v < 0.0 { "-inf" } else { "inf" }.to_string(),
        Arg::Float(v) => {
            let sign = if *v < 0.0 { "-" } else { "" };
            format!("{sign}{}", format_general(v.abs(), 15, false, false))
        }
        Arg::Str(s) => s.to_string(),
        Arg::Char(c) => (*c as char).to_string(),
    }
}

fn parse_text_number(s: &str) -> Option<f64> {
    let t = s.trim();
    match t.to_ascii_lowercase().as_str() {
        "nan" | "+nan" | "-nan" => return Some(f64::NAN),
        "inf" | "+inf" | "infinity" => return Some(f64::INFINITY),
        "-inf" | "-infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    t.parse::<f64>().ok()
}

fn arg_to_f64(arg: &Arg<'_>, conversion: char) -> Result<f64, FormatError> {
    match arg {
        Arg::Int(v) => Ok(*v as f64),
        Arg::UInt(v) => Ok(*v as f64),
        Arg::Float(v) => Ok(*v),
        Arg::Char(c) => Ok(*c as f64),
        Arg::Str(s) => parse_text_number(s).ok_or_else(|| FormatError::Coerce {
            value: s.to_string(),
            conversion,
        }),
    }
}

fn arg_to_i64(arg: &Arg<'_>, conversion: char) -> Result<i64, FormatError> {
    let err = || FormatError::Coerce {
        value: arg_to_string(arg),
        conversion,
    };
    match arg {
        Arg::Int(v) => Ok(*v),
        Arg::UInt(v) => Ok(*v as i64),
        Arg::Char(c) => Ok(*c as i64),
        Arg::Float(v) if v.is_finite() => Ok(v.trunc() as i64),
        Arg::Float(_) => Err(err()),
        Arg::Str(s) => match s.trim().parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) => parse_text_number(s)
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64)
                .ok_or_else(err),
        },
    }
}

fn arg_to_u64(arg: &Arg<'_>, conversion: char) -> Result<u64, FormatError> {
    match arg {
        Arg::UInt(v) => Ok(*v),
        other => arg_to_i64(other, conversion).map(|v| v as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn f(fmt: &str, v: f64) -> String {
        sprintf(fmt, &[Arg::Float(v)]).expect("format")
    }

    #[test]
    fn fixed_and_exponential() {
        assert_eq!(f("%f", 3.5), "3.500000");
        assert_eq!(f("%.2f", -0.126), "-0.13");
        assert_eq!(f("%10.3f|", 2.0), "     2.000|");
        assert_eq!(f("%-8.1f|", 2.0), "2.0     |");
        assert_eq!(f("%e", 12345.678), "1.234568e+04");
        assert_eq!(f("%.2E", 0.000123), "1.23E-04");
        assert_eq!(f("%21.15e", 1.0), "1.000000000000000e+00");
        assert_eq!(f("%08.2f", -1.5), "-0001.50");
    }

    #[test]
    fn general_follows_c_rules() {
        assert_eq!(f("%g", 100000.0), "100000");
        assert_eq!(f("%g", 1000000.0), "1e+06");
        assert_eq!(f("%g", 0.0001), "0.0001");
        assert_eq!(f("%g", 0.00001), "1e-05");
        assert_eq!(f("%g", 3.14159265), "3.14159");
        assert_eq!(f("%.3g", 2.0), "2");
        assert_eq!(f("%#.3g", 2.0), "2.00");
        assert_eq!(f("%g", 0.0), "0");
        assert_eq!(f("%G", f64::INFINITY), "INF");
    }

    #[test]
    fn integers_and_strings() {
        assert_eq!(sprintf("%5d|%-4d|%03d", &[Arg::Int(42), Arg::Int(-7), Arg::Int(5)]).expect("fmt"), "   42|-7  |005");
        assert_eq!(sprintf("%ld", &[Arg::Float(9.99)]).expect("fmt"), "9");
        assert_eq!(sprintf("%x %#o", &[Arg::Int(255), Arg::Int(8)]).expect("fmt"), "ff 010");
        assert_eq!(sprintf("%s-%.2s", &[Arg::Str("ab"), Arg::Str("xyz")]).expect("fmt"), "ab-xy");
        assert_eq!(sprintf("%c%c", &[Arg::Char(b'o'), Arg::Int(107)]).expect("fmt"), "ok");
        assert_eq!(sprintf("100%%", &[]).expect("fmt"), "100%");
        assert_eq!(sprintf("%+d", &[Arg::Int(3)]).expect("fmt"), "+3");
    }

    #[test]
    fn errors() {
        assert!(matches!(
            sprintf("%d %d", &[Arg::Int(1)]),
            Err(FormatError::MissingArgument { given: 1, .. })
        ));
        assert!(matches!(
            sprintf("%q", &[Arg::Int(1)]),
            Err(FormatError::BadConversion { .. })
        ));
        assert!(matches!(
            sprintf("%f", &[Arg::Str("abc")]),
            Err(FormatError::Coerce { conversion: 'f', .. })
        ));
    }
}
