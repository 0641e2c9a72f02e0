use std::fmt;
use std::str::FromStr;

use crate::error::ProcessError;

/// How the result parameter's units derive from the column's.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitsRule {
    /// Units of the processed column.
    Column,
    /// Units of the `functionOf` column.
    FunctionOf,
    /// Column units over `functionOf` units.
    Ratio,
    /// Column units times `functionOf` units.
    Product,
    None,
}

macro_rules! analyses {
    ($( $variant:ident => $keyword:literal, $description:literal, $units:ident, [$($flag:ident),*]; )*) => {
        /// The reductions `process` can apply to a column.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Analysis {
            $($variant,)*
        }

        impl Analysis {
            pub const ALL: &'static [Analysis] = &[$(Analysis::$variant,)*];

            pub fn keyword(self) -> &'static str {
                match self {
                    $(Analysis::$variant => $keyword,)*
                }
            }

            /// Default description prefix; the column name is appended.
            pub fn description_prefix(self) -> &'static str {
                match self {
                    $(Analysis::$variant => $description,)*
                }
            }

            pub fn units_rule(self) -> UnitsRule {
                match self {
                    $(Analysis::$variant => UnitsRule::$units,)*
                }
            }

            fn flags(self) -> Flags {
                match self {
                    $(Analysis::$variant => Flags::NONE $(.with(Flags::$flag))*,)*
                }
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Flags(u8);

impl Flags {
    const NONE: Flags = Flags(0);
    const FUNCOF: Flags = Flags(1);
    const WEIGHT: Flags = Flags(2);
    const POSITION: Flags = Flags(4);
    const STRING: Flags = Flags(8);

    const fn with(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    fn has(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }
}

analyses! {
    Average => "average", "average of ", Column, [WEIGHT];
    Rms => "rms", "rms of ", Column, [WEIGHT];
    Sum => "sum", "sum of ", Column, [WEIGHT];
    StandardDeviation => "standarddeviation", "standard deviation of ", Column, [WEIGHT];
    Mad => "mad", "mean absolute deviation of ", Column, [WEIGHT];
    Minimum => "minimum", "minimum of ", Column, [POSITION];
    Maximum => "maximum", "maximum of ", Column, [POSITION];
    Smallest => "smallest", "smallest of ", Column, [POSITION];
    Largest => "largest", "largest of ", Column, [POSITION];
    First => "first", "first ", Column, [STRING];
    Last => "last", "last ", Column, [STRING];
    Count => "count", "count ", None, [STRING];
    Spread => "spread", "spread in ", Column, [];
    Median => "median", "median of ", Column, [];
    BaseLevel => "baselevel", "base level of ", Column, [];
    TopLevel => "toplevel", "top level of ", Column, [];
    Amplitude => "amplitude", "amplitude of ", Column, [];
    RiseTime => "risetime", "risetime of ", FunctionOf, [FUNCOF];
    FallTime => "falltime", "falltime of ", FunctionOf, [FUNCOF];
    Fwhm => "fwhm", "fwhm of ", FunctionOf, [FUNCOF];
    Fwtm => "fwtm", "fwtm of ", FunctionOf, [FUNCOF];
    Center => "center", "center of ", FunctionOf, [FUNCOF];
    ZeroCrossing => "zerocrossing", "zero crossing of ", FunctionOf, [FUNCOF];
    Fwha => "fwha", "fwha of ", FunctionOf, [FUNCOF];
    Fwta => "fwta", "fwta of ", FunctionOf, [FUNCOF];
    Sigma => "sigma", "sigma of ", Column, [WEIGHT];
    Slope => "slope", "slope of ", Ratio, [FUNCOF];
    Intercept => "intercept", "intercept of ", Column, [FUNCOF];
    Lfsd => "lfsd", "linear-fit standard deviation of ", Column, [FUNCOF];
    QRange => "qrange", "quartile range of ", Column, [];
    DRange => "drange", "decile range of ", Column, [];
    Percentile => "percentile", "percentile of ", Column, [];
    Mode => "mode", "mode of ", Column, [];
    Integral => "integral", "integral of ", Product, [FUNCOF];
    Product => "product", "product of ", None, [WEIGHT];
    PRange => "prange", "percentile range of ", Column, [];
    SignedSmallest => "signedsmallest", "signed smallest of ", Column, [POSITION];
    SignedLargest => "signedlargest", "signed largest of ", Column, [POSITION];
    GmIntegral => "gmintegral", "integral of ", Product, [FUNCOF];
    Correlation => "correlation", "correlation coefficient of ", None, [FUNCOF];
}

impl Analysis {
    pub fn requires_function_of(self) -> bool {
        self.flags().has(Flags::FUNCOF)
    }

    pub fn accepts_weights(self) -> bool {
        self.flags().has(Flags::WEIGHT)
    }

    pub fn accepts_position(self) -> bool {
        self.flags().has(Flags::POSITION)
    }

    /// Whether the analysis applies to string columns.
    pub fn accepts_strings(self) -> bool {
        self.flags().has(Flags::STRING)
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for Analysis {
    type Err = ProcessError;

    /// Case-insensitive; an exact keyword or a unique prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if let Some(exact) = Self::ALL.iter().find(|a| a.keyword() == lower) {
            return Ok(*exact);
        }
        let mut candidates = Self::ALL.iter().filter(|a| a.keyword().starts_with(&lower));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) if !lower.is_empty() => Ok(*only),
            (Some(_), Some(_)) => Err(ProcessError::Usage(format!(
                "ambiguous process analysis `{s}`"
            ))),
            _ => Err(ProcessError::Usage(format!(
                "unknown process analysis `{s}` (known: {})",
                Self::ALL
                    .iter()
                    .map(|a| a.keyword())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn forty_distinct_keywords() {
        assert_eq!(Analysis::ALL.len(), 40);
        let mut keywords: Vec<_> = Analysis::ALL.iter().map(|a| a.keyword()).collect();
        keywords.sort_unstable();
        keywords.dedup();
        assert_eq!(keywords.len(), 40);
    }

    #[test]
    fn prefixes_and_case() {
        assert_eq!("AVE".parse::<Analysis>().expect("ave"), Analysis::Average);
        assert_eq!("stand".parse::<Analysis>().expect("stand"), Analysis::StandardDeviation);
        assert_eq!("fwhm".parse::<Analysis>().expect("fwhm"), Analysis::Fwhm);
        assert!(matches!("s".parse::<Analysis>(), Err(ProcessError::Usage(_))));
        assert!(matches!("nope".parse::<Analysis>(), Err(ProcessError::Usage(_))));
    }

    #[test]
    fn capability_flags() {
        assert!(Analysis::Slope.requires_function_of());
        assert!(Analysis::Intercept.requires_function_of());
        assert!(Analysis::Sigma.accepts_weights());
        assert!(!Analysis::Median.accepts_weights());
        assert!(Analysis::SignedLargest.accepts_position());
        assert!(Analysis::Count.accepts_strings());
        assert!(!Analysis::Sum.accepts_strings());
    }
}
