//! `sddsprocess`: read an SDDS file, run the requested operators over every page and write
//! the result.

#![forbid(unsafe_code)]

mod args;
mod requests;

use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use log::{info, warn, LevelFilter};
use sdds_engine::{run, Operator, Pipeline, PipelineOptions, ProcessError, RunSummary};
use sdds_io::{open_input, AsciiWriter};
use sdds_model::PageReader;
use sdds_rpn::{search_path_from_env, Rpn, DEFINITIONS_ENV};

use crate::args::split_list;
use crate::requests::{parse_description, parse_major_order, parse_pipe, Flag};

/// Exit status when an autostop test ends the run after at least one page was written.
const EXIT_AUTOSTOP: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "sddsprocess", version, infer_long_args = true)]
#[command(about = "Filter, transform and reduce the pages of an SDDS file.")]
#[command(after_help = "Single-dash spellings (-define=column,y,\"x 2 *\") are accepted. \
Option values are comma-separated; quote a value or escape a comma as \\, to keep it literal.")]
struct Cli {
    /// Input and output files. With only an input file the input is replaced in place.
    #[arg(value_name = "FILE", num_args = 0..=2)]
    files: Vec<PathBuf>,

    /// Use standard input and/or standard output.
    #[arg(
        long,
        value_name = "[input][,output]",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "input,output"
    )]
    pipe: Option<String>,

    /// Log progress.
    #[arg(long)]
    verbose: bool,

    /// Suppress warnings.
    #[arg(long)]
    nowarnings: bool,

    /// Print the operator list to stderr before processing.
    #[arg(long)]
    summarize: bool,

    /// Worker threads for column reductions.
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Files of evaluator definitions run before processing (overrides $RPN_DEFNS).
    #[arg(long, value_name = "FILE[,...]")]
    rpndefinitionsfiles: Vec<String>,

    /// Replace the output description.
    #[arg(long, value_name = "[text=<string>][,contents=<string>]")]
    description: Option<String>,

    /// Major order of the output.
    #[arg(long = "majororder", value_name = "row|column")]
    major_order: Option<String>,

    #[command(flatten)]
    operators: OperatorArgs,
}

/// Operator flags. Each is repeatable; operators run in command-line order.
#[derive(Debug, clap::Args)]
struct OperatorArgs {
    /// Run only if every named item exists.
    #[arg(long, value_name = "{column|parameter|array},<name>[,...]")]
    ifis: Vec<String>,

    /// Run only if none of the named items exists.
    #[arg(long, value_name = "{column|parameter|array},<name>[,...]")]
    ifnot: Vec<String>,

    /// Keep rows (or pages) whose string values match wildcard patterns.
    #[arg(long = "match", value_name = "{column|parameter},<name>=<pattern>[,!][,...]")]
    match_terms: Vec<String>,

    /// Keep rows (or pages) whose values fall in ranges.
    #[arg(long, value_name = "{column|parameter},<name>,<lower>,<upper>[,!][,...]")]
    filter: Vec<String>,

    /// Keep rows (or pages) whose epoch times fall in a date range.
    #[arg(
        long = "timefilter",
        value_name = "{column|parameter},<name>[,before=YYYY/MM/DD@HH:MM:SS][,after=...][,invert]"
    )]
    time_filter: Vec<String>,

    /// Keep rows (or pages) for which an expression is true.
    #[arg(long, value_name = "{column|parameter},<expression>[,autostop][,algebraic]")]
    test: Vec<String>,

    /// Keep rows (or pages) whose values read as numbers.
    #[arg(long = "numbertest", value_name = "{column|parameter},<name>[,invert]")]
    number_test: Vec<String>,

    /// Drop rows from the head and tail of each page.
    #[arg(long, value_name = "<head>,<tail>[,invert]")]
    clip: Vec<String>,

    /// Drop fractions of the rows from the head and tail of each page.
    #[arg(long, value_name = "<head>,<tail>[,invert]")]
    fclip: Vec<String>,

    /// Keep every interval-th row.
    #[arg(long, value_name = "<interval>[,<offset>]")]
    sparse: Vec<String>,

    /// Keep a random fraction of the rows.
    #[arg(long, value_name = "<fraction>")]
    sample: Vec<String>,

    /// Define a new column or parameter from an expression.
    #[arg(
        long,
        value_name = "{column|parameter},<name>,{<expression>|@<parameter>}[,<entries>][,algebraic]"
    )]
    define: Vec<String>,

    /// Recompute (or define) a column or parameter from an expression.
    #[arg(
        long,
        value_name = "{column|parameter},<name>,{<expression>|@<parameter>}[,<entries>][,algebraic]"
    )]
    redefine: Vec<String>,

    /// Evaluate expressions held in a string column or parameter.
    #[arg(long, value_name = "{column|parameter},<name>,<source>[,<entries>]")]
    evaluate: Vec<String>,

    /// Run an expression for its side effects.
    #[arg(long = "rpnexpression", value_name = "<expression>[,repeat][,algebraic]")]
    rpn_expression: Vec<String>,

    /// Convert the units of a column or parameter.
    #[arg(
        long = "convertunits",
        value_name = "{column|parameter},<name>,<new-units>,<old-units>[,<factor>]"
    )]
    convert_units: Vec<String>,

    /// Copy a numeric column or parameter to another numeric type.
    #[arg(long, value_name = "{column|parameter},<new-name>,<source>,<type>")]
    cast: Vec<String>,

    /// Scan numbers out of strings.
    #[arg(
        long,
        value_name = "{column|parameter},<new-name>,<source>,<format>[,<entries>][,edit=<script>]"
    )]
    scan: Vec<String>,

    /// Edit strings into a new item.
    #[arg(long, value_name = "{column|parameter},<new-name>,<source>,<script>[,<entries>]")]
    edit: Vec<String>,

    /// Edit strings in place.
    #[arg(long, value_name = "{column|parameter},<name>,<script>[,<entries>]")]
    reedit: Vec<String>,

    /// Print values into a new string item.
    #[arg(
        long,
        value_name = "{column|parameter},<new-name>,<format>[,<source>...][,<entries>]"
    )]
    print: Vec<String>,

    /// Print values into an existing string item.
    #[arg(
        long,
        value_name = "{column|parameter},<name>,<format>[,<source>...][,<entries>]"
    )]
    reprint: Vec<String>,

    /// Reformat the numbers inside strings.
    #[arg(
        long,
        value_name = "{column|parameter},<new-name>,<source>[,stringFormat=..][,doubleFormat=..][,longFormat=..]"
    )]
    format: Vec<String>,

    /// Run shell commands and capture their first output line.
    #[arg(long, value_name = "{column|parameter},<new-name>,<command-source>[,<entries>]")]
    system: Vec<String>,

    /// Reduce a column to a parameter.
    #[arg(long, value_name = "<column>,<analysis>,<result>[,<qualifiers>]")]
    process: Vec<String>,

    /// Delete items matching wildcard patterns.
    #[arg(long, value_name = "{column|parameter|array},<pattern>[,...]")]
    delete: Vec<String>,

    /// Keep only items matching wildcard patterns.
    #[arg(long, value_name = "{column|parameter|array},<pattern>[,...]")]
    retain: Vec<String>,

    /// Rename items.
    #[arg(long, value_name = "{column|parameter|array},<old>=<new>[,...]")]
    rename: Vec<String>,

    /// Edit the names of items matching a pattern.
    #[arg(long = "editnames", value_name = "{column|parameter|array},<pattern>,<script>")]
    edit_names: Vec<String>,
}

impl OperatorArgs {
    /// Each operator flag with its argument id and the values given for it.
    fn by_flag(&self) -> [(Flag, &'static str, &[String]); 29] {
        [
            (Flag::Ifis, "ifis", self.ifis.as_slice()),
            (Flag::Ifnot, "ifnot", self.ifnot.as_slice()),
            (Flag::Match, "match_terms", self.match_terms.as_slice()),
            (Flag::Filter, "filter", self.filter.as_slice()),
            (Flag::TimeFilter, "time_filter", self.time_filter.as_slice()),
            (Flag::Test, "test", self.test.as_slice()),
            (Flag::NumberTest, "number_test", self.number_test.as_slice()),
            (Flag::Clip, "clip", self.clip.as_slice()),
            (Flag::FClip, "fclip", self.fclip.as_slice()),
            (Flag::Sparse, "sparse", self.sparse.as_slice()),
            (Flag::Sample, "sample", self.sample.as_slice()),
            (Flag::Define, "define", self.define.as_slice()),
            (Flag::Redefine, "redefine", self.redefine.as_slice()),
            (Flag::Evaluate, "evaluate", self.evaluate.as_slice()),
            (Flag::RpnExpression, "rpn_expression", self.rpn_expression.as_slice()),
            (Flag::ConvertUnits, "convert_units", self.convert_units.as_slice()),
            (Flag::Cast, "cast", self.cast.as_slice()),
            (Flag::Scan, "scan", self.scan.as_slice()),
            (Flag::Edit, "edit", self.edit.as_slice()),
            (Flag::Reedit, "reedit", self.reedit.as_slice()),
            (Flag::Print, "print", self.print.as_slice()),
            (Flag::Reprint, "reprint", self.reprint.as_slice()),
            (Flag::Format, "format", self.format.as_slice()),
            (Flag::System, "system", self.system.as_slice()),
            (Flag::Process, "process", self.process.as_slice()),
            (Flag::Delete, "delete", self.delete.as_slice()),
            (Flag::Retain, "retain", self.retain.as_slice()),
            (Flag::Rename, "rename", self.rename.as_slice()),
            (Flag::EditNames, "edit_names", self.edit_names.as_slice()),
        ]
    }

    /// Parse every operator flag, in command-line order.
    fn operators(&self, matches: &ArgMatches) -> Result<Vec<Operator>, ProcessError> {
        let mut requests: Vec<(usize, Flag, &str)> = Vec::new();
        for (flag, id, values) in self.by_flag() {
            let indices = matches.indices_of(id).into_iter().flatten();
            requests.extend(
                indices
                    .zip(values)
                    .map(|(index, value)| (index, flag, value.as_str())),
            );
        }
        requests.sort_by_key(|(index, ..)| *index);
        requests
            .into_iter()
            .map(|(_, flag, value)| flag.parse(value))
            .collect()
    }
}

impl Cli {
    fn pipeline_options(&self) -> Result<PipelineOptions, ProcessError> {
        let mut options = PipelineOptions {
            warnings: !self.nowarnings,
            threads: self.threads.unwrap_or(1),
            ..PipelineOptions::default()
        };
        if let Some(description) = &self.description {
            options.description = Some(parse_description(description)?);
        }
        if let Some(order) = &self.major_order {
            options.major_order = Some(parse_major_order(order)?);
        }
        Ok(options)
    }
}

/// Where the output goes.
#[derive(Debug, PartialEq, Eq)]
enum Output {
    Stdout,
    File(PathBuf),
    /// Rewrite the input file itself, optionally keeping a `.~N~` backup.
    Replace { path: PathBuf, backup: bool },
}

#[derive(Debug, PartialEq, Eq)]
struct Paths {
    input: Option<PathBuf>,
    output: Output,
}

impl Paths {
    fn resolve(files: Vec<PathBuf>, pipe_in: bool, pipe_out: bool) -> Result<Self, ProcessError> {
        let usage = |message: &str| Err(ProcessError::Usage(message.to_string()));
        let mut files = files.into_iter();
        let (first, second) = (files.next(), files.next());
        match (pipe_in, pipe_out, first, second) {
            (true, true, None, None) => Ok(Self {
                input: None,
                output: Output::Stdout,
            }),
            (true, false, Some(output), None) => Ok(Self {
                input: None,
                output: Output::File(output),
            }),
            (false, true, Some(input), None) => Ok(Self {
                input: Some(input),
                output: Output::Stdout,
            }),
            (false, false, Some(input), None) => Ok(Self {
                output: Output::Replace {
                    path: input.clone(),
                    backup: true,
                },
                input: Some(input),
            }),
            (false, false, Some(input), Some(output)) => {
                let output = if same_file(&input, &output) {
                    Output::Replace {
                        path: input.clone(),
                        backup: false,
                    }
                } else {
                    Output::File(output)
                };
                Ok(Self {
                    input: Some(input),
                    output,
                })
            }
            (false, _, None, _) => usage("no input file given"),
            (true, false, None, _) => usage("no output file given"),
            _ => usage("too many file names"),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn init_logging(verbose: bool, nowarnings: bool) {
    let level = if verbose {
        LevelFilter::Info
    } else if nowarnings {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}

/// The evaluator, with definitions files run: the `-rpndefinitionsfiles` list, else
/// `$RPN_DEFNS`.
fn evaluator(files: &[String]) -> Result<Rpn> {
    let mut rpn = Rpn::new();
    rpn.set_search_path(search_path_from_env());
    let listed: Vec<String> = files
        .iter()
        .flat_map(|value| split_list(value))
        .filter(|name| !name.trim().is_empty())
        .collect();
    if listed.is_empty() {
        if let Some(path) = std::env::var_os(DEFINITIONS_ENV).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            if let Err(err) = rpn.load_definitions(&path) {
                warn!("{DEFINITIONS_ENV}: {err}");
            }
        }
    }
    for name in &listed {
        rpn.load_definitions(Path::new(name))
            .with_context(|| format!("loading definitions from {name}"))?;
    }
    Ok(rpn)
}

fn write_into(
    file: &mut File,
    reader: &mut dyn PageReader,
    pipeline: &mut Pipeline,
) -> Result<RunSummary, ProcessError> {
    let mut writer = AsciiWriter::from_writer(BufWriter::new(file));
    run(reader, &mut writer, pipeline)
}

fn write_output(
    output: &Output,
    reader: &mut dyn PageReader,
    pipeline: &mut Pipeline,
) -> Result<RunSummary> {
    let summary = match output {
        Output::Stdout => {
            let mut writer = AsciiWriter::from_writer(BufWriter::new(std::io::stdout().lock()));
            run(reader, &mut writer, pipeline)?
        }
        Output::File(path) => {
            let mut writer = AsciiWriter::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            run(reader, &mut writer, pipeline)?
        }
        Output::Replace { path, backup: true } => {
            let (summary, backup) =
                sdds_fs::replace_with_backup(path, |file| write_into(file, reader, pipeline))
                    .with_context(|| format!("replacing {}", path.display()))?;
            if let Some(backup) = backup {
                info!("previous contents kept in {}", backup.display());
            }
            summary
        }
        Output::Replace {
            path,
            backup: false,
        } => sdds_fs::atomic_write(path, |file| write_into(file, reader, pipeline))
            .with_context(|| format!("replacing {}", path.display()))?,
    };
    Ok(summary)
}

fn execute(argv: Vec<OsString>) -> Result<ExitCode> {
    let matches = match Cli::command().try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            err.print()?;
            return Ok(ExitCode::from(code));
        }
    };
    let cli = Cli::from_arg_matches(&matches)?;
    init_logging(cli.verbose, cli.nowarnings);

    let operators = cli.operators.operators(&matches)?;
    let options = cli.pipeline_options()?;
    let (pipe_in, pipe_out) = match &cli.pipe {
        Some(value) => parse_pipe(value)?,
        None => (false, false),
    };
    let paths = Paths::resolve(cli.files.clone(), pipe_in, pipe_out)?;
    if cli.summarize {
        for op in &operators {
            eprintln!("{op}");
        }
    }
    let rpn = evaluator(&cli.rpndefinitionsfiles)?;

    let mut reader = open_input(paths.input.as_deref()).with_context(|| match &paths.input {
        Some(path) => format!("opening {}", path.display()),
        None => "reading standard input".to_string(),
    })?;
    let mut pipeline = Pipeline::with_evaluator(reader.layout(), operators, options, rpn)?;
    if !pipeline.preconditions_met() {
        info!("required items are missing or present; nothing written");
        reader.close()?;
        return Ok(ExitCode::SUCCESS);
    }

    let summary = write_output(&paths.output, reader.as_mut(), &mut pipeline)?;
    info!(
        "{} page(s) read, {} written",
        summary.pages_read, summary.pages_written
    );
    if summary.stopped_by_autostop && summary.pages_written > 0 {
        return Ok(ExitCode::from(EXIT_AUTOSTOP));
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    match execute(args::normalize_args(std::env::args_os())) {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<ProcessError>() {
                Some(cause) => eprintln!("error ({}): {err:#}", cause.category()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> (Cli, ArgMatches) {
        let argv = args::normalize_args(args.iter().map(OsString::from));
        let matches = Cli::command()
            .try_get_matches_from(argv)
            .expect("arguments parse");
        let cli = Cli::from_arg_matches(&matches).expect("cli");
        (cli, matches)
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn operators_keep_command_line_order() {
        let (cli, matches) = parse(&[
            "sddsprocess",
            "in.sdds",
            "out.sdds",
            "-define=column,a,x 2 *",
            "-filter=column,a,0,10",
            "-define=column,b,a 1 +",
            "-sparse=2",
        ]);
        let ops = cli.operators.operators(&matches).expect("operators");
        let names: Vec<String> = ops
            .iter()
            .map(|op| op.to_string().split(' ').next().unwrap_or("").to_string())
            .collect();
        assert_eq!(names, ["define", "filter", "define", "sparse"]);
    }

    #[test]
    fn option_names_ignore_case_and_accept_prefixes() {
        let (cli, _) = parse(&[
            "sddsprocess",
            "-pipe",
            "-majorOrder=column",
            "-numberTest=column,s",
            "-nowarn",
        ]);
        assert!(cli.nowarnings);
        assert_eq!(cli.major_order.as_deref(), Some("column"));
        assert_eq!(cli.operators.number_test, ["column,s"]);
        assert_eq!(cli.pipe.as_deref(), Some("input,output"));
    }

    #[test]
    fn paths_follow_pipe_flags() {
        assert_eq!(
            Paths::resolve(vec![], true, true).expect("paths"),
            Paths {
                input: None,
                output: Output::Stdout
            }
        );
        assert_eq!(
            Paths::resolve(vec!["a".into()], false, false).expect("paths"),
            Paths {
                input: Some("a".into()),
                output: Output::Replace {
                    path: "a".into(),
                    backup: true
                }
            }
        );
        assert_eq!(
            Paths::resolve(vec!["a".into()], true, false).expect("paths"),
            Paths {
                input: None,
                output: Output::File("a".into())
            }
        );
        assert!(Paths::resolve(vec![], false, false).is_err());
        assert!(Paths::resolve(vec!["a".into(), "b".into()], true, true).is_err());
    }
}
