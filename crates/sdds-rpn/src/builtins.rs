macro_rules! builtins {
    ($($variant:ident => $keyword:literal,)*) => {
        /// Built-in operators and functions.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant,)*
        }

        impl Builtin {
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];

            pub fn keyword(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $keyword,)*
                }
            }

            pub fn from_keyword(word: &str) -> Option<Builtin> {
                match word {
                    $($keyword => Some(Builtin::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

builtins! {
    Add => "+",
    Sub => "-",
    Mul => "*",
    Div => "/",
    Mod => "mod",
    Pow => "pow",
    Sqr => "sqr",
    Sqrt => "sqrt",
    Abs => "abs",
    Chs => "chs",
    Rec => "rec",
    Exp => "exp",
    Ln => "ln",
    Log => "log",
    Sin => "sin",
    Cos => "cos",
    Tan => "tan",
    Asin => "asin",
    Acos => "acos",
    Atan => "atan",
    Atan2 => "atan2",
    Sinh => "sinh",
    Cosh => "cosh",
    Tanh => "tanh",
    Int => "int",
    Floor => "floor",
    Ceil => "ceil",
    Round => "round",
    Max2 => "max2",
    Min2 => "min2",
    SumN => "sumn",
    MaxN => "maxn",
    MinN => "minn",
    Pi => "pi",
    Nan => "nan",
    IsNan => "isnan",
    IsInf => "isinf",
    Erf => "erf",
    Erfc => "erfc",
    LnGamma => "lngam",
    Gamma => "gamma",
    BetaI => "betai",
    GammaP => "gammaP",
    GammaQ => "gammaQ",
    BesselJ => "JN",
    BesselY => "YN",
    LambertW0 => "W0",
    LambertWm1 => "Wm1",
    Rnd => "rnd",
    Grnd => "grnd",
    GrndLim => "grndlim",
    Srnd => "srnd",
    BitAnd => "bitand",
    BitOr => "bitor",
    Pop => "pop",
    Swap => "swap",
    Dup => "dup",
    ClearNumeric => "cs",
    ClearLogical => "cls",
    ClearString => "css",
    StringPop => "sspop",
    View => "view",
    SortIncreasing => "isort",
    SortDecreasing => "dsort",
    Lt => "<",
    Gt => ">",
    Le => "<=",
    Ge => ">=",
    Eq => "==",
    Ne => "!=",
    Not => "!",
    And => "&&",
    Or => "||",
    StrLen => "strlen",
    StrEq => "streq",
    StrGt => "strgt",
    StrLt => "strlt",
    StrMatch => "strmatch",
    StrCat => "scat",
    NumToStr => "xstr",
    MakeUdf => "mudf",
    Udf => "udf",
    Open => "open",
    Close => "close",
    Gets => "gets",
    Puts => "puts",
    Fprf => "fprf",
    ExecString => "execs",
    ExecNumeric => "execn",
}

/// Reserved words handled by the compiler rather than dispatched as builtins.
pub const RESERVED: &[&str] = &["sto", "ssto", "?", ":", "$"];

/// Whether `name` is a builtin or a reserved word.
pub fn is_reserved(name: &str) -> bool {
    Builtin::from_keyword(name).is_some() || RESERVED.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keywords_are_unique_and_round_trip() {
        let mut seen = HashSet::new();
        for b in Builtin::ALL {
            assert!(seen.insert(b.keyword()), "duplicate keyword {}", b.keyword());
            assert_eq!(Builtin::from_keyword(b.keyword()), Some(*b));
        }
        assert!(is_reserved("sto"));
        assert!(!is_reserved("x"));
    }
}
