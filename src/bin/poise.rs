//! Poise CLI - Command-line interface for the Poise body-language engine
//!
//! Commands:
//! - replay: Replay recorded frames into metrics snapshots (batch mode)
//! - run: Process streaming frame records from stdin (streaming mode)
//! - simulate: Sample a recording through the live lifecycle controller
//! - validate: Validate frame record schema
//! - doctor: Diagnose configuration and environment
//! - schema: Print input/output schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use poise::replay::{replay_records, simulate_records, ReplaySession};
use poise::report::{InterviewRecorder, ReportEncoder};
use poise::schema::{FrameRecord, FrameRecordAdapter, SCHEMA_VERSION};
use poise::types::MetricsSnapshot;
use poise::{AnalysisError, AnalyzerConfig, POISE_VERSION, PRODUCER_NAME};

/// Poise - real-time body-language signals for interview practice
#[derive(Parser)]
#[command(name = "poise")]
#[command(version = POISE_VERSION)]
#[command(about = "Turn landmark observations into body-language metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded frames into metrics snapshots (batch mode)
    Replay {
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

        /// Analyzer configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the interview report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Process streaming frame records from stdin (streaming mode)
    Run {
        /// Analyzer configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the interview report to this file at end of input
        #[arg(long)]
        report: Option<PathBuf>,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Sample a recording through the live lifecycle controller
    Simulate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Analyzer configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the sampling interval
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Validate frame record schema
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

    /// Diagnose configuration and environment
    Doctor {
        /// Check an analyzer configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one snapshot per line)
    Ndjson,
    /// JSON array of snapshots
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (poise.frame_record.v1)
    Input,
    /// Output schema (metrics snapshot)
    Output,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

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

/// Logs go to stderr so stdout stays machine-readable; `RUST_LOG` overrides the default
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(env_filter)
        .init();
}

fn run(cli: Cli) -> Result<(), PoiseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            config,
            report,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
            report.as_deref(),
        ),

        Commands::Run {
            config,
            report,
            flush,
        } => cmd_run(config.as_deref(), report.as_deref(), flush),

        Commands::Simulate {
            input,
            input_format,
            config,
            interval_ms,
        } => cmd_simulate(&input, input_format, config.as_deref(), interval_ms),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<&Path>,
    report: Option<&Path>,
) -> Result<(), PoiseCliError> {
    let config = load_config(config)?;
    let records = read_records(input, &input_format)?;

    if records.is_empty() {
        return Err(PoiseCliError::NoRecords);
    }

    let replay = replay_records(&records, &config)?;
    info!(
        frames = replay.snapshots.len(),
        skipped = replay.skipped,
        questions = replay.recorder.len(),
        "Replay complete"
    );

    if let Some(report_path) = report {
        write_report(report_path, &replay.recorder)?;
    }

    let output_data = format_output(&replay.snapshots, &output_format)?;
    if is_stdio(output) {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(config: Option<&Path>, report: Option<&Path>, flush: bool) -> Result<(), PoiseCliError> {
    let config = load_config(config)?;
    let mut session = ReplaySession::new(&config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let record: FrameRecord = serde_json::from_str(trimmed).map_err(|e| {
            PoiseCliError::ParseError(format!("Failed to parse frame record: {}", e))
        })?;
        record.validate()?;

        if let Some(snapshot) = session.push(&record)? {
            writeln!(stdout, "{}", serde_json::to_string(&snapshot)?)?;
            if flush {
                stdout.flush()?;
            }
        } else {
            debug!("Record without video frame skipped");
        }
    }
    stdout.flush()?;

    let recorder = session.finish();
    if let Some(report_path) = report {
        write_report(report_path, &recorder)?;
    }

    Ok(())
}

fn cmd_simulate(
    input: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
    interval_ms: Option<u64>,
) -> Result<(), PoiseCliError> {
    let mut config = load_config(config)?;
    if let Some(interval_ms) = interval_ms {
        config.sampling.interval_ms = interval_ms;
        config.validate()?;
    }

    let records = read_records(input, &input_format)?;
    if records.is_empty() {
        return Err(PoiseCliError::NoRecords);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let recorder = runtime.block_on(simulate_records(records, config))?;

    println!("{}", ReportEncoder::new().encode_to_json(&recorder)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), PoiseCliError> {
    let records = read_records(input, &input_format)?;
    let results = FrameRecordAdapter::validate_records(&records);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                record_id: r.record_id.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Record {} (index {}): {}",
                    err.record_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_records > 0 {
        Err(PoiseCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), PoiseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "poise_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Poise version {}", POISE_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    if let Some(config_path) = config {
        let check = if !config_path.exists() {
            DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            }
        } else {
            match AnalyzerConfig::load(config_path) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (interval {} ms, smoothing window {})",
                        config.sampling.interval_ms, config.smoothing_window
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: POISE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Poise Doctor Report");
        println!("===================");
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
        Err(PoiseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), PoiseCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", input_json_schema());
            } else {
                println!("Input Schema: {}", SCHEMA_VERSION);
                println!();
                println!("One record per sampled tick:");
                println!();
                println!("- schema_version: \"{}\"", SCHEMA_VERSION);
                println!("- record_id: optional identifier");
                println!("- timestamp: capture time (RFC3339)");
                println!("- question: optional question index; a change captures and resets metrics");
                println!("- video_ready: false when no frame was available (default true)");
                println!("- observation:");
                println!("  - face: {{ points: [{{x, y, z?}}] }} (478-point refined face mesh)");
                println!("  - hands: [{{ keypoints: [{{x, y}}] x21, handedness?, score? }}]");
                println!("  - pose: {{ keypoints: [{{name, x, y, score?}}] }} (COCO names)");
                println!("- failures: estimators that failed on this frame (face, hand, pose)");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", output_json_schema());
            } else {
                println!("Output Schema: metrics snapshot");
                println!();
                println!("One snapshot per processed frame (whole percentages, 0-100):");
                println!();
                println!("- eyeContactPercent, postureScore, speakingPercent, headTiltScore (smoothed)");
                println!("- engagementScore, confidenceScore (smoothed composites)");
                println!("- smilePercent, handPresencePercent, advancedPostureScore (raw)");
                println!("- gestureCount: gesturing hands summed over the question");
                println!();
                println!("Reports (--report) add per-question snapshots, averages, summary and feedback.");
            }
        }
    }

    Ok(())
}

// Helper functions

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_input(input: &Path) -> Result<String, PoiseCliError> {
    if is_stdio(input) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(input: &Path, input_format: &InputFormat) -> Result<Vec<FrameRecord>, PoiseCliError> {
    let input_data = read_input(input)?;
    let records = match input_format {
        InputFormat::Ndjson => FrameRecordAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => FrameRecordAdapter::parse_array(&input_data)?,
    };
    Ok(records)
}

fn load_config(path: Option<&Path>) -> Result<AnalyzerConfig, PoiseCliError> {
    match path {
        Some(path) => Ok(AnalyzerConfig::load(path)?),
        None => Ok(AnalyzerConfig::default()),
    }
}

fn write_report(path: &Path, recorder: &InterviewRecorder) -> Result<(), PoiseCliError> {
    let json = ReportEncoder::new().encode_to_json(recorder)?;
    if is_stdio(path) {
        eprintln!("{}", json);
    } else {
        fs::write(path, json)?;
    }
    Ok(())
}

fn format_output(snapshots: &[MetricsSnapshot], format: &OutputFormat) -> Result<String, PoiseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for snapshot in snapshots {
                lines.push(serde_json::to_string(snapshot)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(snapshots)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(snapshots)?),
    }
}

fn input_json_schema() -> String {
    let point = serde_json::json!({
        "type": "object",
        "required": ["x", "y"],
        "properties": {
            "x": { "type": "number" },
            "y": { "type": "number" },
            "z": { "type": "number" }
        }
    });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Poise recorded frame schema",
        "type": "object",
        "required": ["schema_version", "timestamp"],
        "properties": {
            "schema_version": { "type": "string", "const": SCHEMA_VERSION },
            "record_id": { "type": "string" },
            "timestamp": { "type": "string", "format": "date-time" },
            "question": { "type": "integer", "minimum": 0 },
            "video_ready": { "type": "boolean", "default": true },
            "observation": {
                "type": "object",
                "properties": {
                    "face": {
                        "type": "object",
                        "properties": { "points": { "type": "array", "items": point } }
                    },
                    "hands": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "keypoints": { "type": "array", "items": point },
                                "handedness": { "type": "string", "enum": ["left", "right"] },
                                "score": { "type": "number" }
                            }
                        }
                    },
                    "pose": {
                        "type": "object",
                        "properties": {
                            "keypoints": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["name", "x", "y"],
                                    "properties": {
                                        "name": { "type": "string" },
                                        "x": { "type": "number" },
                                        "y": { "type": "number" },
                                        "score": { "type": "number" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "failures": {
                "type": "array",
                "items": { "type": "string", "enum": ["face", "hand", "pose"] }
            }
        }
    })
    .to_string()
}

fn output_json_schema() -> String {
    let percent = serde_json::json!({ "type": "integer", "minimum": 0, "maximum": 100 });

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "poise.metrics_snapshot",
        "description": "Poise metrics snapshot",
        "type": "object",
        "required": [
            "eyeContactPercent", "postureScore", "gestureCount", "smilePercent",
            "handPresencePercent", "advancedPostureScore", "speakingPercent",
            "headTiltScore", "engagementScore", "confidenceScore"
        ],
        "properties": {
            "eyeContactPercent": percent,
            "postureScore": percent,
            "gestureCount": { "type": "integer", "minimum": 0 },
            "smilePercent": percent,
            "handPresencePercent": percent,
            "advancedPostureScore": percent,
            "speakingPercent": percent,
            "headTiltScore": percent,
            "engagementScore": percent,
            "confidenceScore": percent
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum PoiseCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    Validation(poise::schema::ValidationError),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for PoiseCliError {
    fn from(e: io::Error) -> Self {
        PoiseCliError::Io(e)
    }
}

impl From<AnalysisError> for PoiseCliError {
    fn from(e: AnalysisError) -> Self {
        PoiseCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for PoiseCliError {
    fn from(e: serde_json::Error) -> Self {
        PoiseCliError::Json(e)
    }
}

impl From<poise::schema::ValidationError> for PoiseCliError {
    fn from(e: poise::schema::ValidationError) -> Self {
        PoiseCliError::Validation(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PoiseCliError> for CliError {
    fn from(e: PoiseCliError) -> Self {
        match e {
            PoiseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PoiseCliError::Analysis(AnalysisError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'poise doctor --config <file>' for details".to_string()),
            },
            PoiseCliError::Analysis(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {} schema", SCHEMA_VERSION)),
            },
            PoiseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PoiseCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'poise validate' for details".to_string()),
            },
            PoiseCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No frame records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PoiseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PoiseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            PoiseCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    record_id: Option<String>,
    error: String,
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

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
