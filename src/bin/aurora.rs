//! Aurora CLI - Command-line interface for the AURORA breadth engine
//!
//! Commands:
//! - run: Score daily feature records (batch mode), optionally resuming state
//! - validate: Check input records without scoring them
//! - doctor: Diagnose state files and environment
//! - constants: Print the frozen engine constants

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aurora_bmi::encoder::{ResultEncoder, ResultEnvelope};
use aurora_bmi::engine::{BmiEngine, EngineState};
use aurora_bmi::input::{InputReader, InputRecord};
use aurora_bmi::store::{JsonFileStore, StateStore};
use aurora_bmi::types::DailyFeatures;
use aurora_bmi::{Band, EngineConfig, EngineError, AURORA_VERSION, PRODUCER_NAME};

/// Aurora - Deterministic market breadth health score
#[derive(Parser)]
#[command(name = "aurora")]
#[command(version = AURORA_VERSION)]
#[command(about = "Score daily market breadth with explicit uncertainty states", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score daily records in date order
    Run {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Directory holding state.json and results.ndjson; resumed and updated
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Re-apply dates that were already applied
        #[arg(long)]
        force: bool,
    },

    /// Validate input records
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose state and configuration
    Doctor {
        /// State directory to check
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the frozen engine constants
    Constants {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one day per line)
    Ndjson,
    /// JSON array of days
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one result per line)
    Ndjson,
    /// JSON array of results
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only results
fn init_tracing(json: bool) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(atty::is(atty::Stream::Stderr)).init();
    }
}

fn run(cli: Cli) -> Result<(), AuroraCliError> {
    match cli.command {
        Commands::Run {
            input,
            output,
            input_format,
            output_format,
            state_dir,
            force,
        } => cmd_run(
            &input,
            &output,
            input_format,
            output_format,
            state_dir.as_deref(),
            force,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { state_dir, json } => cmd_doctor(state_dir.as_deref(), json),

        Commands::Constants { json } => cmd_constants(json),
    }
}

fn read_input(input: &Path) -> Result<String, AuroraCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_records(data: &str, format: &InputFormat) -> Result<Vec<InputRecord>, AuroraCliError> {
    let records = match format {
        InputFormat::Ndjson => InputReader::parse_ndjson(data)?,
        InputFormat::Json => InputReader::parse_array(data)?,
    };
    if records.is_empty() {
        return Err(AuroraCliError::NoRecords);
    }
    Ok(records)
}

fn cmd_run(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    state_dir: Option<&Path>,
    force: bool,
) -> Result<(), AuroraCliError> {
    let records = parse_records(&read_input(input)?, &input_format)?;
    let inputs: Vec<DailyFeatures> = records.iter().map(InputRecord::to_features).collect();

    let mut store = state_dir.map(JsonFileStore::open).transpose()?;
    let mut engine = match store.as_ref().map(|s| s.load_state()).transpose()?.flatten() {
        Some(state) => {
            tracing::info!(last_date = ?state.last_date, "resuming from saved state");
            BmiEngine::restore(state)?
        }
        None => BmiEngine::new(),
    };

    let outcomes = engine.process_batch(&inputs, force)?;
    let encoder = ResultEncoder::new();
    let mut envelopes: Vec<ResultEnvelope> = Vec::new();
    let mut degenerate = 0usize;

    for day in &outcomes {
        match &day.outcome {
            Ok(result) => {
                if let Some(store) = store.as_mut() {
                    store.append_result(result)?;
                }
                envelopes.push(encoder.encode(result));
            }
            Err(_) => degenerate += 1,
        }
    }

    if let Some(store) = store.as_mut() {
        store.save_state(&engine.export_state())?;
    }

    tracing::info!(
        days = outcomes.len(),
        scored = envelopes.len(),
        degenerate,
        "run complete"
    );

    let output_data = format_output(&envelopes, &output_format)?;
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", output_data)?;
        stdout.flush()?;
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), AuroraCliError> {
    let records = parse_records(&read_input(input)?, &input_format)?;
    let issues = InputReader::validate(&records);

    let mut invalid: Vec<usize> = issues.iter().map(|i| i.index).collect();
    invalid.dedup();

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - invalid.len(),
        invalid_records: invalid.len(),
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                println!("  - Record {} ({}): {}", issue.index, issue.date, issue.message);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(AuroraCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(state_dir: Option<&Path>, json: bool) -> Result<(), AuroraCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::new(
        "aurora_version",
        CheckStatus::Ok,
        format!("{} {}", PRODUCER_NAME, AURORA_VERSION),
    ));

    checks.push(match EngineConfig::aurora().validate() {
        Ok(()) => DoctorCheck::new("constants", CheckStatus::Ok, "Frozen constants are consistent".to_string()),
        Err(e) => DoctorCheck::new("constants", CheckStatus::Error, e.to_string()),
    });

    if let Some(dir) = state_dir {
        checks.extend(check_state_dir(dir));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::new("stdin", CheckStatus::Ok, "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::new("stdin", CheckStatus::Ok, "stdin is a pipe (use --input -)".to_string())
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: AURORA_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Aurora Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(AuroraCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_state_dir(dir: &Path) -> Vec<DoctorCheck> {
    if !dir.exists() {
        return vec![DoctorCheck::new(
            "state",
            CheckStatus::Warning,
            "State directory does not exist (first run will create it)".to_string(),
        )];
    }

    let store = JsonFileStore::with_paths(
        dir.join(JsonFileStore::STATE_FILE),
        dir.join(JsonFileStore::RESULTS_FILE),
    );
    let mut checks = Vec::new();

    let state: Option<EngineState> = match store.load_state() {
        Ok(Some(state)) => Some(state),
        Ok(None) => {
            checks.push(DoctorCheck::new(
                "state",
                CheckStatus::Warning,
                "No state file yet".to_string(),
            ));
            None
        }
        Err(e) => {
            checks.push(DoctorCheck::new("state", CheckStatus::Error, e.to_string()));
            None
        }
    };

    if let Some(state) = state {
        let last_date = state.last_date;
        let composites = state.composites.len();
        let min_n = aurora_bmi::FeatureId::ALL
            .iter()
            .map(|f| state.baselines.observation_count(*f))
            .min()
            .unwrap_or(0);
        checks.push(match BmiEngine::restore(state) {
            Ok(_) => DoctorCheck::new(
                "state",
                CheckStatus::Ok,
                format!(
                    "State valid (last date {}, {} composites, smallest feature window {})",
                    last_date.map_or_else(|| "none".to_string(), |d| d.to_string()),
                    composites,
                    min_n
                ),
            ),
            Err(e) => DoctorCheck::new("state", CheckStatus::Error, e.to_string()),
        });
    }

    checks.push(match store.load_results() {
        Ok(results) => DoctorCheck::new(
            "results",
            CheckStatus::Ok,
            format!("{} stored results", results.len()),
        ),
        Err(e) => DoctorCheck::new("results", CheckStatus::Error, e.to_string()),
    });

    checks
}

fn cmd_constants(json: bool) -> Result<(), AuroraCliError> {
    let config = EngineConfig::aurora();
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("AURORA constants");
    println!("================");
    println!("Rolling window:      {} trading days", config.window());
    println!("Minimum baseline:    {} observations", config.min_observations());
    println!("Weights:");
    for (feature, weight) in config.weights().iter() {
        println!("  {}: {:.2}", feature, weight);
    }
    println!("Bands:");
    let [green, light_green, yellow] = config.band_thresholds();
    let bounds = [(0.0, green), (green, light_green), (light_green, yellow), (yellow, 100.0)];
    for (band, (lo, hi)) in Band::ALL.iter().zip(bounds) {
        println!("  {:<11} ({:>3}, {:>3}]  {}", band.as_str(), lo, hi, band.description());
    }
    Ok(())
}

// Helper functions

fn format_output(envelopes: &[ResultEnvelope], format: &OutputFormat) -> Result<String, AuroraCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for envelope in envelopes {
                lines.push(serde_json::to_string(envelope)?);
            }
            if lines.is_empty() {
                return Ok(String::new());
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(envelopes)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(envelopes)?),
    }
}

// Error types

#[derive(Debug)]
enum AuroraCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for AuroraCliError {
    fn from(e: io::Error) -> Self {
        AuroraCliError::Io(e)
    }
}

impl From<EngineError> for AuroraCliError {
    fn from(e: EngineError) -> Self {
        AuroraCliError::Engine(e)
    }
}

impl From<serde_json::Error> for AuroraCliError {
    fn from(e: serde_json::Error) -> Self {
        AuroraCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CliError {
    fn new(code: &str, message: String, hint: &str) -> Self {
        Self {
            code: code.to_string(),
            message,
            hint: Some(hint.to_string()),
        }
    }
}

impl From<AuroraCliError> for CliError {
    fn from(e: AuroraCliError) -> Self {
        match e {
            AuroraCliError::Io(e) => CliError::new("IO_ERROR", e.to_string(), "Check file paths and permissions"),
            AuroraCliError::Engine(e) => {
                let message = e.to_string();
                match e {
                    EngineError::OutOfOrder { .. } => CliError::new(
                        "OUT_OF_ORDER",
                        message,
                        "Dates must follow the last applied date in the state directory",
                    ),
                    EngineError::Degenerate { .. } => {
                        CliError::new("DEGENERATE", message, "Supply more history before this date")
                    }
                    EngineError::InvalidConfig(_) => {
                        CliError::new("INVALID_STATE", message, "Run 'aurora doctor --state-dir <dir>'")
                    }
                    EngineError::InvalidInput(_) => {
                        CliError::new("INVALID_INPUT", message, "Run 'aurora validate' for details")
                    }
                    EngineError::ParseError(_) | EngineError::JsonError(_) => {
                        CliError::new("PARSE_ERROR", message, "Check input format")
                    }
                    EngineError::Io(_) => {
                        CliError::new("IO_ERROR", message, "Check file paths and permissions")
                    }
                }
            }
            AuroraCliError::Json(e) => CliError::new("JSON_ERROR", e.to_string(), "Check JSON syntax"),
            AuroraCliError::NoRecords => CliError::new(
                "NO_RECORDS",
                "No records found in input".to_string(),
                "Ensure input file is not empty",
            ),
            AuroraCliError::ValidationFailed(count) => CliError::new(
                "VALIDATION_FAILED",
                format!("{} records failed validation", count),
                "Fix validation errors and retry",
            ),
            AuroraCliError::DoctorFailed => CliError::new(
                "DOCTOR_FAILED",
                "One or more health checks failed".to_string(),
                "Review the doctor report for details",
            ),
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    issues: Vec<aurora_bmi::input::ValidationIssue>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
