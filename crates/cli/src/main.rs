// chartgrid CLI - headless host for the tabular computation core

mod exit_codes;
mod input;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use chartgrid_config::{DefaultSearchMode, Settings};
use chartgrid_engine::formula::{EvalOutcome, FunctionRegistry};
use chartgrid_engine::profile::{profile_columns_with, ProfileOptions};
use chartgrid_engine::search::{find_in_rows, replace_in_rows, SearchConfig, SearchMode};
use chartgrid_engine::stats::{compute_segment_test, SegmentTestParams, TestOptions};
use chartgrid_engine::Sheet;

use exit_codes::{EXIT_ERROR, EXIT_FORMULA_ERROR, EXIT_SUCCESS, EXIT_TEST_NOT_COMPUTABLE, EXIT_USAGE};
use input::{load_table, Table};

#[derive(Parser)]
#[command(name = "cgrid")]
#[command(about = "Formulas, column profiling, significance tests and search over tabular data")]
#[command(version)]
#[command(long_version = long_version())]
struct Cli {
    /// Settings file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Substring,
    WholeWord,
    Regex,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Substring => SearchMode::Substring,
            ModeArg::WholeWord => SearchMode::WholeWord,
            ModeArg::Regex => SearchMode::Regex,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula against a grid loaded from CSV/JSON rows
    #[command(after_help = "\
The header line is not part of the grid: A1 is the first data cell.

Examples:
  cgrid calc '=SUM(B1:B10)' --input sales.csv
  cat sales.csv | cgrid calc '=AVERAGE(B1:B10)' --input -
  cgrid calc '=COUNT(A1:C3)' --input rows.json --json")]
    Calc {
        /// Formula to evaluate (must start with =)
        formula: String,

        /// Rows to load into the grid (`-` for stdin)
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,

        /// Input is a JSON array of objects instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Infer column types and counts
    #[command(after_help = "\
Examples:
  cgrid profile survey.csv
  cgrid profile rows.json --json")]
    Profile {
        /// Input file (`-` for stdin)
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Compare segments of a target column with a significance test
    #[command(after_help = "\
The test is chosen from the target column's profiled type:
  numeric target, two groups          -> Welch's t-test
  text target, two groups, --category -> two-proportion z-test
  text target otherwise               -> chi-square test of independence

Examples:
  cgrid test survey.csv --target score --segment region --values north,south
  cgrid test survey.csv --target answer --segment group --values a,b --category yes")]
    Test {
        /// Input file (`-` for stdin)
        input: PathBuf,

        /// Column whose values are compared
        #[arg(long)]
        target: String,

        /// Column whose values define the groups
        #[arg(long)]
        segment: String,

        /// Segment values to compare (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<String>,

        /// Target category for a two-proportion test
        #[arg(long)]
        category: Option<String>,

        /// Significance level (overrides settings)
        #[arg(long)]
        alpha: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// Find matches with character offsets
    #[command(after_help = "\
Examples:
  cgrid find contacts.csv smith
  cgrid find contacts.csv '^\\d{3}-' --mode regex --columns phone")]
    Find {
        /// Input file (`-` for stdin)
        input: PathBuf,

        query: String,

        /// Match mode (defaults to search.defaultMode from settings)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Restrict to these columns (comma-separated)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Replace matches and print the rewritten rows
    #[command(after_help = "\
Substring and whole-word modes insert the template literally; regex mode
expands $1 / ${name}.

Examples:
  cgrid replace contacts.csv 'St.' 'Street' --columns address
  cgrid replace dates.csv '(\\d+)/(\\d+)' '$2-$1' --mode regex")]
    Replace {
        /// Input file (`-` for stdin)
        input: PathBuf,

        query: String,

        template: String,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        #[arg(long)]
        json: bool,

        /// Do not print the replacement summary to stderr
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// List formula functions
    Functions,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_settings(cli.config.as_deref()).and_then(|settings| match cli.command {
        Commands::Calc { formula, input, json } => cmd_calc(&settings, formula, input, json),
        Commands::Profile { input, json } => cmd_profile(&settings, input, json),
        Commands::Test { input, target, segment, values, category, alpha, json } => {
            cmd_test(&settings, input, json, target, segment, values, category, alpha)
        }
        Commands::Find { input, query, mode, columns, json } => {
            cmd_find(&settings, input, json, query, mode, columns)
        }
        Commands::Replace { input, query, template, mode, columns, json, quiet } => {
            cmd_replace(&settings, input, json, query, template, mode, columns, quiet)
        }
        Commands::Functions => cmd_functions(),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("CGRID_COMMIT_HASH"), ")",
        "\ntarget:    ", env!("CGRID_TARGET"),
        "\nfunctions: SUM AVERAGE MIN MAX COUNT",
    )
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::io(format!("{:#}", err))
    }
}

type CmdResult = Result<u8, CliError>;

fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Settings::load_from(path).map_err(|e| {
            CliError::io(e.to_string()).with_hint("fix or remove the settings file, or drop --config")
        }),
        None => Ok(Settings::load()),
    }
}

fn test_options(settings: &Settings) -> TestOptions {
    TestOptions {
        significance_level: settings.significance_level,
        min_numeric_group_size: settings.min_numeric_group_size,
        min_proportion_group_size: settings.min_proportion_group_size,
        min_expected_count: settings.min_expected_count,
    }
}

fn resolve_mode(arg: Option<ModeArg>, settings: &Settings) -> SearchMode {
    match arg {
        Some(mode) => mode.into(),
        None => match settings.default_search_mode {
            DefaultSearchMode::Substring => SearchMode::Substring,
            DefaultSearchMode::WholeWord => SearchMode::WholeWord,
            DefaultSearchMode::Regex => SearchMode::Regex,
        },
    }
}

fn require_columns(table: &Table, columns: &[&str]) -> Result<(), CliError> {
    for column in columns {
        if !table.has_column(column) {
            return Err(CliError::args(format!("unknown column '{}'", column))
                .with_hint(format!("available columns: {}", table.header.join(", "))));
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// calc
// ============================================================================

fn cmd_calc(settings: &Settings, formula: String, input: Option<PathBuf>, json: bool) -> CmdResult {
    let formula = formula.trim();
    if !formula.starts_with('=') {
        return Err(CliError::args(format!("formula must start with '=': {}", formula))
            .with_hint(format!("try '={}'", formula)));
    }

    let table = match input {
        Some(path) => load_table(&path, json)?,
        None => Table::default(),
    };
    let sheet = Sheet::from_rows(&table.header, &table.rows).with_max_depth(settings.formula_max_depth);

    let outcome: EvalOutcome = sheet.evaluate(formula).into();
    print_json(&outcome)?;

    match outcome {
        EvalOutcome::Value { .. } => Ok(EXIT_SUCCESS),
        EvalOutcome::Error { error } => {
            eprintln!("error: formula returned {} ({})", error.code, error.message);
            Ok(EXIT_FORMULA_ERROR)
        }
    }
}

// ============================================================================
// profile
// ============================================================================

fn cmd_profile(settings: &Settings, input: PathBuf, json: bool) -> CmdResult {
    let table = load_table(&input, json)?;
    let options = ProfileOptions { sample_size: settings.profile_sample_size };
    let columns = profile_columns_with(&table.rows, &options);

    for column in &columns {
        if column.unparsed_count() > 0 {
            log::warn!(
                "column '{}': {} value(s) are not numeric",
                column.key,
                column.unparsed_count()
            );
        }
    }

    print_json(&columns)?;
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// test
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn cmd_test(
    settings: &Settings,
    input: PathBuf,
    json: bool,
    target: String,
    segment: String,
    values: Vec<String>,
    category: Option<String>,
    alpha: Option<f64>,
) -> CmdResult {
    let table = load_table(&input, json)?;
    require_columns(&table, &[&target, &segment])?;

    let mut options = test_options(settings);
    if let Some(alpha) = alpha {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(CliError::args(format!("--alpha must be between 0 and 1, got {}", alpha)));
        }
        options.significance_level = alpha;
    }

    let columns = profile_columns_with(&table.rows, &ProfileOptions::default());
    let target_type = columns
        .iter()
        .find(|c| c.key == target)
        .map(|c| c.column_type)
        .ok_or_else(|| CliError::args(format!("unknown column '{}'", target)))?;

    let params = SegmentTestParams {
        target_column: target,
        target_type,
        segment_column: segment,
        segment_values: values,
        target_category: category,
    };
    let result = compute_segment_test(&table.rows, &params, &options);
    print_json(&result)?;

    if let Some(reason) = result.failure_reason() {
        eprintln!("error: test not computable: {}", reason);
        return Ok(EXIT_TEST_NOT_COMPUTABLE);
    }
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// find / replace
// ============================================================================

fn search_config(
    table: &Table,
    settings: &Settings,
    query: &str,
    mode: Option<ModeArg>,
    columns: &[String],
) -> Result<SearchConfig, CliError> {
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    require_columns(table, &names)?;

    let config = SearchConfig::new(query, resolve_mode(mode, settings), columns);
    if !config.is_active() {
        log::warn!("search for {:?} is inactive; nothing will match", query);
    }
    Ok(config)
}

fn cmd_find(
    settings: &Settings,
    input: PathBuf,
    json: bool,
    query: String,
    mode: Option<ModeArg>,
    columns: Vec<String>,
) -> CmdResult {
    let table = load_table(&input, json)?;
    let config = search_config(&table, settings, &query, mode, &columns)?;
    print_json(&find_in_rows(&table.rows, &config))?;
    Ok(EXIT_SUCCESS)
}

#[allow(clippy::too_many_arguments)]
fn cmd_replace(
    settings: &Settings,
    input: PathBuf,
    json: bool,
    query: String,
    template: String,
    mode: Option<ModeArg>,
    columns: Vec<String>,
    quiet: bool,
) -> CmdResult {
    let table = load_table(&input, json)?;
    let config = search_config(&table, settings, &query, mode, &columns)?;
    let report = replace_in_rows(&table.rows, &config, &template);

    print_json(&report.rows)?;
    if !quiet {
        eprintln!(
            "replaced {} match(es) in {} cell(s)",
            report.matches_replaced, report.cells_replaced
        );
    }
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// functions
// ============================================================================

fn cmd_functions() -> CmdResult {
    let registry = FunctionRegistry::builtin();
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    for name in registry.names() {
        writeln!(handle, "{}", name).map_err(|e| CliError::io(e.to_string()))?;
    }

    Ok(EXIT_SUCCESS)
}
