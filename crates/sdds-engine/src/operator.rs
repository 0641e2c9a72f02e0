use std::fmt;
use std::str::FromStr;

use sdds_model::{Definition, ItemClass, Kind, Logic, LogicOp};

use crate::error::ProcessError;
use crate::process::ProcessSpec;

/// Where an operator applies: to every row of a column, or once per page to a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Column,
    Parameter,
}

impl Scope {
    pub fn class(self) -> ItemClass {
        match self {
            Scope::Column => ItemClass::Column,
            Scope::Parameter => ItemClass::Parameter,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class().keyword())
    }
}

impl FromStr for Scope {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<ItemClass>() {
            Ok(ItemClass::Column) => Ok(Scope::Column),
            Ok(ItemClass::Parameter) => Ok(Scope::Parameter),
            _ => Err(ProcessError::Usage(format!(
                "`{s}` is not an item scope (expected column or parameter)"
            ))),
        }
    }
}

/// A named item of a given class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemRef {
    pub class: ItemClass,
    pub name: String,
}

/// Optional metadata for an item an operator creates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DefinitionSpec {
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub description: Option<String>,
    pub format_string: Option<String>,
    pub kind: Option<Kind>,
}

impl DefinitionSpec {
    pub fn kind_or(&self, default: Kind) -> Kind {
        self.kind.unwrap_or(default)
    }

    /// A new definition named `name`.
    pub fn build(&self, name: &str, default_kind: Kind) -> Definition {
        let mut def = Definition::new(name, self.kind_or(default_kind));
        self.apply_to(&mut def);
        def
    }

    /// Overwrite the fields this spec sets.
    pub fn apply_to(&self, def: &mut Definition) {
        if let Some(kind) = self.kind {
            def.kind = kind;
        }
        for (field, value) in [
            (&mut def.symbol, &self.symbol),
            (&mut def.units, &self.units),
            (&mut def.description, &self.description),
            (&mut def.format_string, &self.format_string),
        ] {
            if value.is_some() {
                field.clone_from(value);
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpressionSource {
    Literal(String),
    /// The text is the value of this string parameter on the page being processed.
    Parameter(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    pub source: ExpressionSource,
    /// Infix text, translated to postfix before compilation.
    pub algebraic: bool,
}

impl Expression {
    pub fn rpn(text: impl Into<String>) -> Self {
        Self {
            source: ExpressionSource::Literal(text.into()),
            algebraic: false,
        }
    }

    pub fn algebraic(text: impl Into<String>) -> Self {
        Self {
            source: ExpressionSource::Literal(text.into()),
            algebraic: true,
        }
    }

    /// `@name` (postfix) or `@@name` (infix) refer to a parameter; anything else is literal.
    pub fn parse(text: &str, algebraic: bool) -> Self {
        if let Some(name) = text.strip_prefix("@@") {
            return Self {
                source: ExpressionSource::Parameter(name.to_string()),
                algebraic: true,
            };
        }
        if let Some(name) = text.strip_prefix('@') {
            return Self {
                source: ExpressionSource::Parameter(name.to_string()),
                algebraic,
            };
        }
        Self {
            source: ExpressionSource::Literal(text.to_string()),
            algebraic,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.algebraic) {
            (ExpressionSource::Literal(text), false) => write!(f, "\"{text}\""),
            (ExpressionSource::Literal(text), true) => write!(f, "\"{text}\" (infix)"),
            (ExpressionSource::Parameter(name), false) => write!(f, "value of parameter {name}"),
            (ExpressionSource::Parameter(name), true) => {
                write!(f, "value of parameter {name} (infix)")
            }
        }
    }
}

/// `name=pattern` selection term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTerm {
    pub name: String,
    pub pattern: String,
    pub case_insensitive: bool,
    /// The pattern is the value of the string parameter named by `pattern`.
    pub indirect: bool,
    pub logic: Logic,
}

/// A bound that is either literal or read from a parameter on each page.
#[derive(Clone, Debug, PartialEq)]
pub enum Bound {
    Value(f64),
    Parameter(String),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Value(v) => write!(f, "{v}"),
            Bound::Parameter(name) => write!(f, "@{name}"),
        }
    }
}

/// `name,lower,upper` range term; both bounds inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterTerm {
    pub name: String,
    pub lower: Bound,
    pub upper: Bound,
    pub logic: Logic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimeFilter {
    pub scope: Scope,
    pub name: String,
    /// Keep times at or before this epoch second.
    pub before: Option<f64>,
    /// Keep times at or after this epoch second.
    pub after: Option<f64>,
    pub invert: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatSpec {
    pub scope: Scope,
    pub target: String,
    pub source: String,
    pub string_format: Option<String>,
    pub double_format: Option<String>,
    pub long_format: Option<String>,
}

/// Schema-level name management, applied before any other operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameAction {
    Delete(Vec<String>),
    Retain(Vec<String>),
    Rename(Vec<(String, String)>),
    Edit { pattern: String, script: String },
}

/// One processing step, in command-line order.
#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    /// Run only if every item exists (`present`) or none does.
    Require { present: bool, items: Vec<ItemRef> },
    Names { class: ItemClass, action: NameAction },
    Match { scope: Scope, terms: Vec<MatchTerm> },
    Filter { scope: Scope, terms: Vec<FilterTerm> },
    TimeFilter(TimeFilter),
    Test {
        scope: Scope,
        expression: Expression,
        autostop: bool,
    },
    NumberTest {
        scope: Scope,
        name: String,
        invert: bool,
    },
    Clip {
        head: usize,
        tail: usize,
        invert: bool,
    },
    FClip {
        head: f64,
        tail: f64,
        invert: bool,
    },
    Sparse { interval: usize, offset: usize },
    Sample { fraction: f64 },
    Define {
        scope: Scope,
        name: String,
        expression: Expression,
        redefine: bool,
        definition: DefinitionSpec,
    },
    Evaluate {
        scope: Scope,
        name: String,
        source: String,
        definition: DefinitionSpec,
    },
    RpnExpression { expression: Expression, repeat: bool },
    ConvertUnits {
        scope: Scope,
        name: String,
        new_units: String,
        old_units: String,
        factor: f64,
    },
    Cast {
        scope: Scope,
        target: String,
        source: String,
        kind: Kind,
    },
    Scan {
        scope: Scope,
        target: String,
        source: String,
        format: String,
        edit: Option<String>,
        definition: DefinitionSpec,
    },
    Edit {
        scope: Scope,
        target: String,
        source: String,
        script: String,
        reedit: bool,
        definition: DefinitionSpec,
    },
    Print {
        scope: Scope,
        target: String,
        format: String,
        sources: Vec<String>,
        reprint: bool,
        definition: DefinitionSpec,
    },
    Format(FormatSpec),
    System {
        scope: Scope,
        target: String,
        source: String,
        definition: DefinitionSpec,
    },
    Process(Box<ProcessSpec>),
}

impl Operator {
    /// Whether the operator can deselect rows of the page.
    pub fn selects_rows(&self) -> bool {
        match self {
            Operator::Match { scope, .. }
            | Operator::Filter { scope, .. }
            | Operator::Test { scope, .. }
            | Operator::NumberTest { scope, .. } => *scope == Scope::Column,
            Operator::TimeFilter(spec) => spec.scope == Scope::Column,
            Operator::Clip { .. }
            | Operator::FClip { .. }
            | Operator::Sparse { .. }
            | Operator::Sample { .. } => true,
            _ => false,
        }
    }

    /// Applied to the layout before the first page rather than per page.
    pub fn is_declarative(&self) -> bool {
        matches!(self, Operator::Require { .. } | Operator::Names { .. })
    }
}

fn logic_suffix(logic: &Logic) -> String {
    let mut out = String::new();
    if logic.negate_term {
        out.push_str(" !");
    }
    out.push_str(match logic.op {
        LogicOp::And => " &",
        LogicOp::Or => " |",
    });
    if logic.negate_result {
        out.push_str(" !");
    }
    out
}

fn write_definition(f: &mut fmt::Formatter<'_>, spec: &DefinitionSpec) -> fmt::Result {
    if let Some(kind) = spec.kind {
        write!(f, " type={kind}")?;
    }
    if let Some(units) = &spec.units {
        write!(f, " units={units}")?;
    }
    if let Some(symbol) = &spec.symbol {
        write!(f, " symbol={symbol}")?;
    }
    if let Some(description) = &spec.description {
        write!(f, " description={description}")?;
    }
    Ok(())
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Require { present, items } => {
                f.write_str(if *present { "ifis" } else { "ifnot" })?;
                for item in items {
                    write!(f, " {} {}", item.class, item.name)?;
                }
                Ok(())
            }
            Operator::Names { class, action } => match action {
                NameAction::Delete(patterns) => write!(f, "delete {class} {}", patterns.join(" ")),
                NameAction::Retain(patterns) => write!(f, "retain {class} {}", patterns.join(" ")),
                NameAction::Rename(pairs) => {
                    write!(f, "rename {class}")?;
                    for (old, new) in pairs {
                        write!(f, " {old}->{new}")?;
                    }
                    Ok(())
                }
                NameAction::Edit { pattern, script } => {
                    write!(f, "edit {class} names matching {pattern} with \"{script}\"")
                }
            },
            Operator::Match { scope, terms } => {
                write!(f, "match {scope}:")?;
                for term in terms {
                    let pattern = if term.indirect {
                        format!("@{}", term.pattern)
                    } else {
                        term.pattern.clone()
                    };
                    write!(f, " {}={pattern}{}", term.name, logic_suffix(&term.logic))?;
                }
                Ok(())
            }
            Operator::Filter { scope, terms } => {
                write!(f, "filter {scope}:")?;
                for term in terms {
                    write!(
                        f,
                        " {} in [{}, {}]{}",
                        term.name,
                        term.lower,
                        term.upper,
                        logic_suffix(&term.logic)
                    )?;
                }
                Ok(())
            }
            Operator::TimeFilter(spec) => {
                write!(f, "time filter {} {}", spec.scope, spec.name)?;
                if let Some(after) = spec.after {
                    write!(f, " after {after}")?;
                }
                if let Some(before) = spec.before {
                    write!(f, " before {before}")?;
                }
                if spec.invert {
                    f.write_str(" (inverted)")?;
                }
                Ok(())
            }
            Operator::Test {
                scope,
                expression,
                autostop,
            } => {
                write!(f, "test {scope} {expression}")?;
                if *autostop {
                    f.write_str(" autostop")?;
                }
                Ok(())
            }
            Operator::NumberTest {
                scope,
                name,
                invert,
            } => write!(
                f,
                "number test {scope} {name}{}",
                if *invert { " (inverted)" } else { "" }
            ),
            Operator::Clip { head, tail, invert } => write!(
                f,
                "clip head {head} tail {tail}{}",
                if *invert { " (inverted)" } else { "" }
            ),
            Operator::FClip { head, tail, invert } => write!(
                f,
                "fractional clip head {head} tail {tail}{}",
                if *invert { " (inverted)" } else { "" }
            ),
            Operator::Sparse { interval, offset } => {
                write!(f, "sparse interval {interval} offset {offset}")
            }
            Operator::Sample { fraction } => write!(f, "sample fraction {fraction}"),
            Operator::Define {
                scope,
                name,
                expression,
                redefine,
                definition,
            } => {
                let verb = if *redefine { "redefine" } else { "define" };
                write!(f, "{verb} {scope} {name} = {expression}")?;
                write_definition(f, definition)
            }
            Operator::Evaluate {
                scope,
                name,
                source,
                definition,
            } => {
                write!(f, "evaluate {scope} {name} from {source}")?;
                write_definition(f, definition)
            }
            Operator::RpnExpression { expression, repeat } => write!(
                f,
                "rpn expression {expression}{}",
                if *repeat { " (every page)" } else { "" }
            ),
            Operator::ConvertUnits {
                scope,
                name,
                new_units,
                old_units,
                factor,
            } => write!(
                f,
                "convert units of {scope} {name} from \"{old_units}\" to \"{new_units}\" (factor {factor})"
            ),
            Operator::Cast {
                scope,
                target,
                source,
                kind,
            } => write!(f, "cast {scope} {source} to {kind} as {target}"),
            Operator::Scan {
                scope,
                target,
                source,
                format,
                edit,
                definition,
            } => {
                write!(f, "scan {scope} {target} from {source} with \"{format}\"")?;
                if let Some(edit) = edit {
                    write!(f, " after edit \"{edit}\"")?;
                }
                write_definition(f, definition)
            }
            Operator::Edit {
                scope,
                target,
                source,
                script,
                reedit,
                definition,
            } => {
                let verb = if *reedit { "reedit" } else { "edit" };
                write!(f, "{verb} {scope} {target} from {source} with \"{script}\"")?;
                write_definition(f, definition)
            }
            Operator::Print {
                scope,
                target,
                format,
                sources,
                reprint,
                definition,
            } => {
                let verb = if *reprint { "reprint" } else { "print" };
                write!(f, "{verb} {scope} {target} = \"{format}\" of {}", sources.join(", "))?;
                write_definition(f, definition)
            }
            Operator::Format(spec) => {
                write!(f, "format {} {} from {}", spec.scope, spec.target, spec.source)?;
                for (label, value) in [
                    ("string", &spec.string_format),
                    ("double", &spec.double_format),
                    ("long", &spec.long_format),
                ] {
                    if let Some(value) = value {
                        write!(f, " {label}=\"{value}\"")?;
                    }
                }
                Ok(())
            }
            Operator::System {
                scope,
                target,
                source,
                definition,
            } => {
                write!(f, "system {scope} {target} from commands in {source}")?;
                write_definition(f, definition)
            }
            Operator::Process(spec) => write!(f, "{spec}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn indirect_expressions() {
        assert_eq!(
            Expression::parse("@@formula", false),
            Expression {
                source: ExpressionSource::Parameter("formula".into()),
                algebraic: true
            }
        );
        assert_eq!(
            Expression::parse("@rpn", false).source,
            ExpressionSource::Parameter("rpn".into())
        );
        assert_eq!(Expression::parse("x 2 *", false), Expression::rpn("x 2 *"));
    }

    #[test]
    fn scope_rejects_arrays() {
        assert_eq!("col".parse::<Scope>().expect("scope"), Scope::Column);
        assert_eq!("param".parse::<Scope>().expect("scope"), Scope::Parameter);
        assert!(matches!("array".parse::<Scope>(), Err(ProcessError::Usage(_))));
    }

    #[test]
    fn definition_spec_overrides_only_given_fields() {
        let spec = DefinitionSpec {
            units: Some("m".into()),
            kind: Some(Kind::Long),
            ..Default::default()
        };
        let mut def = Definition::new("x", Kind::Double).with_description("distance");
        spec.apply_to(&mut def);
        assert_eq!(def.kind, Kind::Long);
        assert_eq!(def.units.as_deref(), Some("m"));
        assert_eq!(def.description.as_deref(), Some("distance"));
    }

    #[test]
    fn summaries_read_naturally() {
        let op = Operator::Define {
            scope: Scope::Column,
            name: "y2".into(),
            expression: Expression::rpn("y 2 *"),
            redefine: false,
            definition: DefinitionSpec {
                units: Some("mm".into()),
                ..Default::default()
            },
        };
        assert_eq!(op.to_string(), "define column y2 = \"y 2 *\" units=mm");
        assert_eq!(
            Operator::Sparse {
                interval: 2,
                offset: 1
            }
            .to_string(),
            "sparse interval 2 offset 1"
        );
    }
}
