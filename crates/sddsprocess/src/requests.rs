//! Operator flags and their value grammars.

use sdds_engine::{
    parse_time, Analysis, Bound, DefinitionSpec, Expression, FilterTerm, FormatSpec, ItemRef,
    MatchTerm, NameAction, Operator, ProcessError, ProcessSpec, Scope, TimeFilter,
};
use sdds_model::{Description, ItemClass, Kind, Logic, LogicOp, MajorOrder};

use crate::args::{qualifiers, split_list, Qualifier};

/// Every flag that introduces an operator, in help order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Ifis,
    Ifnot,
    Match,
    Filter,
    TimeFilter,
    Test,
    NumberTest,
    Clip,
    FClip,
    Sparse,
    Sample,
    Define,
    Redefine,
    Evaluate,
    RpnExpression,
    ConvertUnits,
    Cast,
    Scan,
    Edit,
    Reedit,
    Print,
    Reprint,
    Format,
    System,
    Process,
    Delete,
    Retain,
    Rename,
    EditNames,
}

impl Flag {
    /// The option spelling, without dashes.
    pub fn option(self) -> &'static str {
        match self {
            Flag::Ifis => "ifis",
            Flag::Ifnot => "ifnot",
            Flag::Match => "match",
            Flag::Filter => "filter",
            Flag::TimeFilter => "timeFilter",
            Flag::Test => "test",
            Flag::NumberTest => "numberTest",
            Flag::Clip => "clip",
            Flag::FClip => "fclip",
            Flag::Sparse => "sparse",
            Flag::Sample => "sample",
            Flag::Define => "define",
            Flag::Redefine => "redefine",
            Flag::Evaluate => "evaluate",
            Flag::RpnExpression => "rpnexpression",
            Flag::ConvertUnits => "convertunits",
            Flag::Cast => "cast",
            Flag::Scan => "scan",
            Flag::Edit => "edit",
            Flag::Reedit => "reedit",
            Flag::Print => "print",
            Flag::Reprint => "reprint",
            Flag::Format => "format",
            Flag::System => "system",
            Flag::Process => "process",
            Flag::Delete => "delete",
            Flag::Retain => "retain",
            Flag::Rename => "rename",
            Flag::EditNames => "editnames",
        }
    }

    /// Parse one occurrence of the flag.
    pub fn parse(self, value: &str) -> Result<Operator, ProcessError> {
        let items = split_list(value);
        let option = self.option();
        match self {
            Flag::Ifis | Flag::Ifnot => parse_require(option, self == Flag::Ifis, &items),
            Flag::Match => parse_match(option, &items),
            Flag::Filter => parse_filter(option, &items),
            Flag::TimeFilter => parse_time_filter(option, &items),
            Flag::Test => parse_test(option, &items),
            Flag::NumberTest => parse_number_test(option, &items),
            Flag::Clip => {
                let (head, tail, invert) = parse_clip(option, &items)?;
                Ok(Operator::Clip {
                    head: count(option, &head)?,
                    tail: count(option, &tail)?,
                    invert,
                })
            }
            Flag::FClip => {
                let (head, tail, invert) = parse_clip(option, &items)?;
                Ok(Operator::FClip {
                    head: number(option, &head)?,
                    tail: number(option, &tail)?,
                    invert,
                })
            }
            Flag::Sparse => parse_sparse(option, &items),
            Flag::Sample => match items.as_slice() {
                [fraction] => Ok(Operator::Sample {
                    fraction: number(option, fraction)?,
                }),
                _ => Err(usage(option, "expected <fraction>")),
            },
            Flag::Define | Flag::Redefine => parse_define(option, self == Flag::Redefine, &items),
            Flag::Evaluate => parse_evaluate(option, &items),
            Flag::RpnExpression => parse_rpn_expression(option, &items),
            Flag::ConvertUnits => parse_convert_units(option, &items),
            Flag::Cast => parse_cast(option, &items),
            Flag::Scan => parse_scan(option, &items),
            Flag::Edit => parse_edit(option, &items),
            Flag::Reedit => parse_reedit(option, &items),
            Flag::Print | Flag::Reprint => parse_print(option, self == Flag::Reprint, &items),
            Flag::Format => parse_format(option, &items),
            Flag::System => parse_system(option, &items),
            Flag::Process => parse_process(option, &items),
            Flag::Delete | Flag::Retain | Flag::Rename | Flag::EditNames => {
                parse_names(self, option, &items)
            }
        }
    }
}

fn usage(option: &str, message: impl std::fmt::Display) -> ProcessError {
    ProcessError::Usage(format!("invalid -{option} syntax: {message}"))
}

fn number(option: &str, text: &str) -> Result<f64, ProcessError> {
    text.trim()
        .parse()
        .map_err(|_| usage(option, format!("`{text}` is not a number")))
}

fn count(option: &str, text: &str) -> Result<usize, ProcessError> {
    text.trim()
        .parse()
        .map_err(|_| usage(option, format!("`{text}` is not a row count")))
}

fn scope(option: &str, text: &str) -> Result<Scope, ProcessError> {
    text.parse()
        .map_err(|_| usage(option, format!("`{text}` is not column or parameter")))
}

fn class(option: &str, text: &str) -> Result<ItemClass, ProcessError> {
    text.parse()
        .map_err(|_| usage(option, format!("`{text}` is not column, parameter or array")))
}

fn kind(option: &str, text: &str) -> Result<Kind, ProcessError> {
    text.parse()
        .map_err(|_| usage(option, format!("unknown type `{text}`")))
}

/// A literal number or `@parameter`.
fn bound(option: &str, text: &str) -> Result<Bound, ProcessError> {
    match text.strip_prefix('@') {
        Some(name) if !name.is_empty() => Ok(Bound::Parameter(name.to_string())),
        _ => Ok(Bound::Value(number(option, text)?)),
    }
}

/// A literal number, or the name (optionally `@`-prefixed) of a parameter.
fn limit(text: &str) -> Bound {
    match text.trim().parse() {
        Ok(value) => Bound::Value(value),
        Err(_) => Bound::Parameter(text.strip_prefix('@').unwrap_or(text).to_string()),
    }
}

const DEFINITION_KEYS: [&str; 5] = ["symbol", "units", "description", "format_string", "type"];

fn is_definition_entry(item: &str) -> bool {
    item.split_once('=').is_some_and(|(key, _)| {
        DEFINITION_KEYS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(key.trim()))
    })
}

/// Fold `key=value` definition entries into a spec.
fn definition(option: &str, entries: &[String]) -> Result<DefinitionSpec, ProcessError> {
    let mut spec = DefinitionSpec::default();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(usage(option, format!("`{entry}` is not a definition entry")));
        };
        let value = value.to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "symbol" => spec.symbol = Some(value),
            "units" => spec.units = Some(value),
            "description" => spec.description = Some(value),
            "format_string" => spec.format_string = Some(value),
            "type" => spec.kind = Some(kind(option, &value)?),
            _ => return Err(usage(option, format!("unknown definition entry `{key}`"))),
        }
    }
    Ok(spec)
}

fn parse_require(option: &str, present: bool, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter|array},<name>[,...]"));
    };
    let mut current = class(option, first)?;
    let mut refs = Vec::new();
    for item in rest {
        match item.parse::<ItemClass>() {
            Ok(next) if next.keyword().eq_ignore_ascii_case(item) => current = next,
            _ => refs.push(ItemRef {
                class: current,
                name: item.clone(),
            }),
        }
    }
    if refs.is_empty() {
        return Err(usage(option, "no names given"));
    }
    Ok(Operator::Require {
        present,
        items: refs,
    })
}

/// Apply a run of `&`, `|` and `!` tokens to the most recent term.
fn apply_logic(option: &str, logic: &mut Logic, token: &str) -> Result<(), ProcessError> {
    let mut combined = false;
    for c in token.chars() {
        match c {
            '&' | '|' if !combined => {
                logic.op = if c == '&' { LogicOp::And } else { LogicOp::Or };
                combined = true;
            }
            '!' if combined && !logic.negate_result => logic.negate_result = true,
            _ => return Err(usage(option, format!("misplaced logic `{token}`"))),
        }
    }
    Ok(())
}

fn is_logic(item: &str) -> bool {
    !item.is_empty() && item.chars().all(|c| matches!(c, '&' | '|' | '!'))
}

/// The logic of a newly read term, consuming its `!` suffix and any combinators that follow.
fn term_logic(
    option: &str,
    items: &[String],
    mut i: usize,
) -> Result<(Logic, usize), ProcessError> {
    let mut logic = Logic::AND;
    if items.get(i).map(String::as_str) == Some("!") {
        logic.negate_term = true;
        i += 1;
    }
    let mut combinators = 0;
    while let Some(item) = items.get(i).filter(|item| is_logic(item)) {
        // `&` / `|` followed by a separate `!` token.
        if item == "!" && combinators == 0 {
            return Err(usage(option, "`!` must follow a term or a combinator"));
        }
        if item == "!" {
            if logic.negate_result {
                return Err(usage(option, "repeated `!`"));
            }
            logic.negate_result = true;
        } else {
            if combinators > 0 {
                return Err(usage(option, "two combinators in a row"));
            }
            apply_logic(option, &mut logic, item)?;
            combinators += 1;
        }
        i += 1;
    }
    Ok((logic, i))
}

fn parse_match(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>=<pattern>[,...]"));
    };
    let scope = scope(option, first)?;
    let mut terms = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let Some((name, pattern)) = rest[i].split_once('=') else {
            return Err(usage(option, format!("`{}` is not <name>=<pattern>", rest[i])));
        };
        let (case_insensitive, pattern) = match pattern.strip_prefix('+') {
            Some(p) => (true, p),
            None => (false, pattern),
        };
        let (indirect, pattern) = match pattern.strip_prefix('@') {
            Some(p) => (true, p),
            None => (false, pattern),
        };
        let (logic, next) = term_logic(option, rest, i + 1)?;
        terms.push(MatchTerm {
            name: name.to_string(),
            pattern: pattern.to_string(),
            case_insensitive,
            indirect,
            logic,
        });
        i = next;
    }
    if terms.is_empty() {
        return Err(usage(option, "no match terms"));
    }
    Ok(Operator::Match { scope, terms })
}

fn parse_filter(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>,<lower>,<upper>[,...]"));
    };
    let scope = scope(option, first)?;
    let mut terms = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let [name, lower, upper, ..] = &rest[i..] else {
            return Err(usage(option, "each term needs <name>,<lower>,<upper>"));
        };
        if is_logic(name) {
            return Err(usage(option, format!("misplaced logic `{name}`")));
        }
        let (logic, next) = term_logic(option, rest, i + 3)?;
        terms.push(FilterTerm {
            name: name.clone(),
            lower: limit(lower),
            upper: limit(upper),
            logic,
        });
        i = next;
    }
    if terms.is_empty() {
        return Err(usage(option, "no filter terms"));
    }
    Ok(Operator::Filter { scope, terms })
}

fn parse_time_filter(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, name, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>[,before=...][,after=...]"));
    };
    let mut spec = TimeFilter {
        scope: scope(option, first)?,
        name: name.clone(),
        before: None,
        after: None,
        invert: false,
    };
    for q in qualifiers(option, rest, &["before", "after", "invert"])? {
        match q.key {
            "before" => spec.before = Some(parse_time(q.required(option)?)?),
            "after" => spec.after = Some(parse_time(q.required(option)?)?),
            _ => spec.invert = true,
        }
    }
    if let (Some(before), Some(after)) = (spec.before, spec.after) {
        if before < after {
            return Err(usage(option, "the before time is earlier than the after time"));
        }
    }
    Ok(Operator::TimeFilter(spec))
}

fn parse_test(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, text, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<expression>[,autostop][,algebraic]"));
    };
    let mut autostop = false;
    let mut algebraic = false;
    for q in qualifiers(option, rest, &["autostop", "algebraic"])? {
        match q.key {
            "autostop" => autostop = true,
            _ => algebraic = true,
        }
    }
    Ok(Operator::Test {
        scope: scope(option, first)?,
        expression: Expression::parse(text, algebraic),
        autostop,
    })
}

fn parse_number_test(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, name, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>[,invert]"));
    };
    let invert = !qualifiers(option, rest, &["invert"])?.is_empty();
    Ok(Operator::NumberTest {
        scope: scope(option, first)?,
        name: name.clone(),
        invert,
    })
}

fn parse_clip(option: &str, items: &[String]) -> Result<(String, String, bool), ProcessError> {
    let [head, tail, rest @ ..] = items else {
        return Err(usage(option, "expected <head>,<tail>[,invert]"));
    };
    let invert = !qualifiers(option, rest, &["invert"])?.is_empty();
    Ok((head.clone(), tail.clone(), invert))
}

fn parse_sparse(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let (interval, offset) = match items {
        [interval] => (count(option, interval)?, 0),
        [interval, offset] => (count(option, interval)?, count(option, offset)?),
        _ => return Err(usage(option, "expected <interval>[,<offset>]")),
    };
    if interval == 0 {
        return Err(usage(option, "interval must be at least 1"));
    }
    Ok(Operator::Sparse { interval, offset })
}

fn parse_define(option: &str, redefine: bool, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, name, text, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>,<expression>[,<entries>]"));
    };
    let (flags, entries): (Vec<String>, Vec<String>) =
        rest.iter().cloned().partition(|item| !item.contains('='));
    let mut algebraic = false;
    for q in qualifiers(option, &flags, &["algebraic"])? {
        if q.key == "algebraic" {
            algebraic = true;
        }
    }
    Ok(Operator::Define {
        scope: scope(option, first)?,
        name: name.clone(),
        expression: Expression::parse(text, algebraic),
        redefine,
        definition: definition(option, &entries)?,
    })
}

fn parse_evaluate(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, name, source, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>,<source>[,<entries>]"));
    };
    Ok(Operator::Evaluate {
        scope: scope(option, first)?,
        name: name.clone(),
        source: source.clone(),
        definition: definition(option, rest)?,
    })
}

fn parse_rpn_expression(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [text, rest @ ..] = items else {
        return Err(usage(option, "expected <expression>[,repeat][,algebraic]"));
    };
    let mut repeat = false;
    let mut algebraic = false;
    for q in qualifiers(option, rest, &["repeat", "algebraic"])? {
        match q.key {
            "repeat" => repeat = true,
            _ => algebraic = true,
        }
    }
    Ok(Operator::RpnExpression {
        expression: Expression::parse(text, algebraic),
        repeat,
    })
}

fn parse_convert_units(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let (first, name, new_units, old_units, factor) = match items {
        [first, name, new_units, old_units] => (first, name, new_units, old_units, 1.0),
        [first, name, new_units, old_units, factor] => {
            (first, name, new_units, old_units, number(option, factor)?)
        }
        _ => {
            return Err(usage(
                option,
                "expected {column|parameter},<name>,<new-units>,<old-units>[,<factor>]",
            ))
        }
    };
    Ok(Operator::ConvertUnits {
        scope: scope(option, first)?,
        name: name.clone(),
        new_units: new_units.clone(),
        old_units: old_units.clone(),
        factor,
    })
}

fn parse_cast(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, target, source, kind_name] = items else {
        return Err(usage(option, "expected {column|parameter},<new-name>,<source>,<type>"));
    };
    Ok(Operator::Cast {
        scope: scope(option, first)?,
        target: target.clone(),
        source: source.clone(),
        kind: kind(option, kind_name)?,
    })
}

fn parse_scan(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, target, source, format, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<new-name>,<source>,<format>[,...]"));
    };
    let mut edit = None;
    let mut entries = Vec::new();
    for item in rest {
        match item.split_once('=') {
            Some((key, script)) if key.eq_ignore_ascii_case("edit") => {
                edit = Some(script.to_string())
            }
            _ => entries.push(item.clone()),
        }
    }
    Ok(Operator::Scan {
        scope: scope(option, first)?,
        target: target.clone(),
        source: source.clone(),
        format: format.clone(),
        edit,
        definition: definition(option, &entries)?,
    })
}

fn parse_edit(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, target, source, script, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<new-name>,<source>,<edit>[,...]"));
    };
    Ok(Operator::Edit {
        scope: scope(option, first)?,
        target: target.clone(),
        source: source.clone(),
        script: script.clone(),
        reedit: false,
        definition: definition(option, rest)?,
    })
}

fn parse_reedit(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, name, script, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>,<edit>[,...]"));
    };
    Ok(Operator::Edit {
        scope: scope(option, first)?,
        target: name.clone(),
        source: name.clone(),
        script: script.clone(),
        reedit: true,
        definition: definition(option, rest)?,
    })
}

fn parse_print(option: &str, reprint: bool, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, target, format, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<name>,<format>[,<source>...]"));
    };
    let (entries, sources): (Vec<String>, Vec<String>) =
        rest.iter().cloned().partition(|item| is_definition_entry(item));
    Ok(Operator::Print {
        scope: scope(option, first)?,
        target: target.clone(),
        format: format.clone(),
        sources,
        reprint,
        definition: definition(option, &entries)?,
    })
}

fn parse_format(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, target, source, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<new-name>,<source>[,...]"));
    };
    let mut spec = FormatSpec {
        scope: scope(option, first)?,
        target: target.clone(),
        source: source.clone(),
        string_format: None,
        double_format: None,
        long_format: None,
    };
    for q in qualifiers(option, rest, &["stringFormat", "doubleFormat", "longFormat"])? {
        let value = Some(q.required(option)?.to_string());
        match q.key {
            "stringFormat" => spec.string_format = value,
            "doubleFormat" => spec.double_format = value,
            _ => spec.long_format = value,
        }
    }
    Ok(Operator::Format(spec))
}

fn parse_system(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, target, source, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter},<new-name>,<command-source>[,...]"));
    };
    Ok(Operator::System {
        scope: scope(option, first)?,
        target: target.clone(),
        source: source.clone(),
        definition: definition(option, rest)?,
    })
}

const PROCESS_KEYS: [&str; 23] = [
    "description",
    "symbol",
    "weightBy",
    "functionOf",
    "lowerLimit",
    "upperLimit",
    "position",
    "head",
    "tail",
    "fhead",
    "ftail",
    "topLimit",
    "bottomLimit",
    "offset",
    "factor",
    "invert",
    "match",
    "value",
    "overwrite",
    "default",
    "percentileLevel",
    "percentLevel",
    "binSize",
];

fn parse_process(option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [column, analysis, result, rest @ ..] = items else {
        return Err(usage(option, "expected <column>,<analysis>,<result>[,...]"));
    };
    let analysis: Analysis = analysis.parse()?;
    let mut spec = ProcessSpec::new(column.clone(), analysis, result.clone());
    for q in qualifiers(option, rest, &PROCESS_KEYS)? {
        apply_process_qualifier(option, &mut spec, &q)?;
    }
    spec.validate()?;
    Ok(Operator::Process(Box::new(spec)))
}

fn apply_process_qualifier(
    option: &str,
    spec: &mut ProcessSpec,
    q: &Qualifier<'_>,
) -> Result<(), ProcessError> {
    let text = || q.required(option).map(str::to_string);
    match q.key {
        "description" => spec.description = Some(text()?),
        "symbol" => spec.symbol = Some(text()?),
        "weightBy" => spec.weight_by = Some(text()?),
        "functionOf" => spec.function_of = Some(text()?),
        "lowerLimit" => spec.lower_limit = Some(bound(option, q.required(option)?)?),
        "upperLimit" => spec.upper_limit = Some(bound(option, q.required(option)?)?),
        "position" => spec.position = true,
        "head" => spec.head = Some(bound(option, q.required(option)?)?),
        "tail" => spec.tail = Some(bound(option, q.required(option)?)?),
        "fhead" => spec.fhead = Some(bound(option, q.required(option)?)?),
        "ftail" => spec.ftail = Some(bound(option, q.required(option)?)?),
        "topLimit" => spec.top_limit = Some(q.number(option)?),
        "bottomLimit" => spec.bottom_limit = Some(q.number(option)?),
        "offset" => spec.offset = Some(bound(option, q.required(option)?)?),
        "factor" => spec.factor = Some(bound(option, q.required(option)?)?),
        "invert" => {
            let which = q.required(option)?;
            match crate::args::match_keyword(which, &["offset", "factor", "both"]) {
                Some("offset") => spec.invert_offset = true,
                Some("factor") => spec.invert_factor = true,
                Some(_) => {
                    spec.invert_offset = true;
                    spec.invert_factor = true;
                }
                None => {
                    return Err(usage(
                        option,
                        format!("invert={which} (expected offset, factor or both)"),
                    ))
                }
            }
        }
        "match" => spec.match_column = Some(text()?),
        "value" => spec.match_value = Some(text()?),
        "overwrite" => spec.overwrite = true,
        "default" => spec.default = Some(q.number(option)?),
        "percentileLevel" | "percentLevel" => spec.percentile_level = Some(q.number(option)?),
        "binSize" => spec.bin_size = Some(q.number(option)?),
        _ => {
            return Err(usage(
                option,
                format!("`{}` is not a process qualifier", q.key),
            ))
        }
    }
    Ok(())
}

fn parse_names(flag: Flag, option: &str, items: &[String]) -> Result<Operator, ProcessError> {
    let [first, rest @ ..] = items else {
        return Err(usage(option, "expected {column|parameter|array},..."));
    };
    let class = class(option, first)?;
    if rest.is_empty() {
        return Err(usage(option, "no names given"));
    }
    let action = match flag {
        Flag::Delete => NameAction::Delete(rest.to_vec()),
        Flag::Retain => NameAction::Retain(rest.to_vec()),
        Flag::Rename => NameAction::Rename(
            rest.iter()
                .map(|pair| match pair.split_once('=') {
                    Some((old, new)) if !old.is_empty() && !new.is_empty() => {
                        Ok((old.to_string(), new.to_string()))
                    }
                    _ => Err(usage(option, format!("`{pair}` is not <old>=<new>"))),
                })
                .collect::<Result<_, _>>()?,
        ),
        _ => match rest {
            [pattern, script] => NameAction::Edit {
                pattern: pattern.clone(),
                script: script.clone(),
            },
            _ => return Err(usage(option, "expected <pattern>,<edit-command>")),
        },
    };
    Ok(Operator::Names { class, action })
}

/// `-description=[text=...][,contents=...]`.
pub fn parse_description(value: &str) -> Result<Description, ProcessError> {
    let items = split_list(value);
    let mut description = Description::default();
    for q in qualifiers("description", &items, &["text", "contents"])? {
        let value = Some(q.required("description")?.to_string());
        match q.key {
            "text" => description.text = value,
            _ => description.contents = value,
        }
    }
    Ok(description)
}

pub fn parse_major_order(value: &str) -> Result<MajorOrder, ProcessError> {
    value
        .parse()
        .map_err(|_| usage("majorOrder", format!("`{value}` (expected row or column)")))
}

/// `-pipe[=input][,output]`: which ends use the standard streams.
pub fn parse_pipe(value: &str) -> Result<(bool, bool), ProcessError> {
    let mut ends = (false, false);
    for q in qualifiers("pipe", &split_list(value), &["input", "output"])? {
        match q.key {
            "input" => ends.0 = true,
            _ => ends.1 = true,
        }
    }
    Ok(ends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn match_terms_carry_their_logic() {
        let op = Flag::Match
            .parse("column,name=+Q*,!,type=@want,|,!")
            .expect("match");
        let Operator::Match { scope, terms } = op else {
            panic!("not a match: {op:?}");
        };
        assert_eq!(scope, Scope::Column);
        assert_eq!(terms.len(), 2);
        assert!(terms[0].case_insensitive && terms[0].logic.negate_term);
        assert_eq!(terms[0].pattern, "Q*");
        assert!(terms[1].indirect);
        assert_eq!(terms[1].pattern, "want");
        assert_eq!(
            terms[1].logic,
            Logic {
                op: LogicOp::Or,
                negate_term: false,
                negate_result: true,
            }
        );
    }

    #[test]
    fn filter_bounds_may_name_parameters() {
        let op = Flag::Filter.parse("col,x,-1.5,xMax,!").expect("filter");
        let Operator::Filter { terms, .. } = op else {
            panic!("not a filter: {op:?}");
        };
        assert_eq!(terms[0].lower, Bound::Value(-1.5));
        assert_eq!(terms[0].upper, Bound::Parameter("xMax".into()));
        assert!(terms[0].logic.negate_term);
        assert!(Flag::Filter.parse("col,x,1").is_err());
        assert!(Flag::Filter.parse("col,x,0,1,y,0,1,&,&").is_err());
    }

    #[test]
    fn define_splits_flags_from_entries() {
        let op = Flag::Define
            .parse("column,y,x 2 *,units=m,type=long,algebraic")
            .expect("define");
        assert_eq!(
            op,
            Operator::Define {
                scope: Scope::Column,
                name: "y".into(),
                expression: Expression::algebraic("x 2 *"),
                redefine: false,
                definition: DefinitionSpec {
                    units: Some("m".into()),
                    kind: Some(Kind::Long),
                    ..DefinitionSpec::default()
                },
            }
        );
        let op = Flag::Redefine.parse("parameter,p,@formula").expect("redefine");
        let Operator::Define {
            expression,
            redefine,
            ..
        } = op
        else {
            panic!("not a define");
        };
        assert!(redefine);
        assert_eq!(
            expression.source,
            sdds_engine::ExpressionSource::Parameter("formula".into())
        );
    }

    #[test]
    fn print_separates_sources_from_entries() {
        let op = Flag::Print
            .parse("column,label,%s-%ld,name,index,description=tag")
            .expect("print");
        let Operator::Print {
            sources,
            definition,
            ..
        } = op
        else {
            panic!("not a print");
        };
        assert_eq!(sources, ["name", "index"]);
        assert_eq!(definition.description.as_deref(), Some("tag"));
    }

    #[test]
    fn process_qualifiers() {
        let op = Flag::Process
            .parse("y,ave,yMean,functionOf=t,lowerLimit=@tMin,upperLimit=5,invert=fa,factor=2")
            .expect("process");
        let Operator::Process(spec) = op else {
            panic!("not a process");
        };
        assert_eq!(spec.analysis, Analysis::Average);
        assert_eq!(spec.function_of.as_deref(), Some("t"));
        assert_eq!(spec.lower_limit, Some(Bound::Parameter("tMin".into())));
        assert_eq!(spec.upper_limit, Some(Bound::Value(5.0)));
        assert!(spec.invert_factor && !spec.invert_offset);
        assert!(Flag::Process.parse("y,average,r,binSize=0").is_err());
        assert!(Flag::Process.parse("y,nonsense,r").is_err());
    }

    #[test]
    fn names_and_requirements() {
        assert_eq!(
            Flag::Rename.parse("column,a=b,c=d").expect("rename"),
            Operator::Names {
                class: ItemClass::Column,
                action: NameAction::Rename(vec![("a".into(), "b".into()), ("c".into(), "d".into())]),
            }
        );
        assert!(Flag::Rename.parse("column,a").is_err());
        let Operator::Require { present, items } =
            Flag::Ifnot.parse("column,x,parameter,p").expect("ifnot")
        else {
            panic!("not a requirement");
        };
        assert!(!present);
        assert_eq!(items[1].class, ItemClass::Parameter);
    }

    #[test]
    fn trimming_and_globals() {
        assert_eq!(
            Flag::Sparse.parse("3").expect("sparse"),
            Operator::Sparse {
                interval: 3,
                offset: 0
            }
        );
        assert!(Flag::Sparse.parse("0").is_err());
        assert_eq!(
            Flag::Clip.parse("2,1,invert").expect("clip"),
            Operator::Clip {
                head: 2,
                tail: 1,
                invert: true
            }
        );
        assert_eq!(parse_pipe("in").expect("pipe"), (true, false));
        assert_eq!(parse_pipe("input,output").expect("pipe"), (true, true));
        assert_eq!(parse_major_order("col").expect("order"), MajorOrder::Column);
        let description = parse_description("text=run 5,contents=bpm data").expect("description");
        assert_eq!(description.text.as_deref(), Some("run 5"));
        assert_eq!(description.contents.as_deref(), Some("bpm data"));
    }
}
