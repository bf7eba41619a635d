//! pcos - ultrasound PCOS screening from the command line.
//!
//! Analyzes a scan for a patient, stores the latest result in the local record
//! store and compares it with the previous one.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pcos_core::inference::Models;
use pcos_core::models::{AnalysisRequest, ImageUpload};
use pcos_core::session::{DiagnosticSession, SessionError};
use pcos_core::{Database, PcosConfig};

mod output;

const EXIT_OK: u8 = 0;
/// Requested record does not exist.
const EXIT_NOT_FOUND: u8 = 1;
/// Submission blocked by validation or the identity guard.
const EXIT_BLOCKED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "pcos", version, about = "Ultrasound PCOS screening assistant")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PCOS_CONFIG", default_value = "pcos.toml")]
    config: PathBuf,

    /// Record store path (overrides the config file)
    #[arg(long, env = "PCOS_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze an ultrasound image and store the result
    Analyze {
        #[arg(long)]
        patient_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, allow_negative_numbers = true)]
        age: i64,
        /// jpg, jpeg or png file
        #[arg(long)]
        image: PathBuf,
        /// Write the scan with detected follicles outlined
        #[arg(long)]
        annotated_out: Option<PathBuf>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the latest record for a patient
    Show {
        patient_id: String,
        #[arg(long)]
        json: bool,
    },
    /// List all stored records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a patient's record
    Forget { patient_id: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(
        "Starting pcos v{} (database: {})",
        env!("CARGO_PKG_VERSION"),
        config.database_path.display()
    );

    match run(cli.command, &config) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<PcosConfig> {
    let mut config = PcosConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    Ok(config)
}

fn run(command: Command, config: &PcosConfig) -> Result<u8> {
    let mut db = Database::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    match command {
        Command::Analyze {
            patient_id,
            name,
            age,
            image,
            annotated_out,
            json,
        } => {
            let bytes =
                std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let request = AnalysisRequest::new(patient_id, name, age);
            let upload = ImageUpload::new(file_name, bytes);

            let models = load_models(config)?;
            let mut session = DiagnosticSession::new(&mut db, &models);
            if let Some(dir) = &config.scratch_dir {
                session = session.with_scratch_dir(dir);
            }

            let outcome = match session.analyze(&request, &upload) {
                Ok(outcome) => outcome,
                Err(e) if e.is_blocking_warning() => {
                    eprintln!("{}", output::render_warning(&e));
                    return Ok(EXIT_BLOCKED);
                }
                Err(SessionError::Inference(e)) => {
                    return Err(anyhow::anyhow!("analysis failed, nothing was saved: {}", e));
                }
                Err(e) => return Err(e.into()),
            };

            if let (Some(path), Some(annotated)) = (&annotated_out, &outcome.annotated) {
                annotated
                    .save(path)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("annotated scan written to {}", path.display());
            }

            if json {
                println!("{}", outcome.to_json()?);
            } else {
                print!("{}", output::render_outcome(&outcome));
            }
        }
        Command::Show { patient_id, json } => match db.get_record(&patient_id)? {
            Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
            Some(record) => println!("{}", output::render_record(&record)),
            None => {
                eprintln!("No record for patient {}", patient_id);
                return Ok(EXIT_NOT_FOUND);
            }
        },
        Command::List { json } => {
            let records = db.list_records()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No records.");
            } else {
                for record in &records {
                    println!("{}", output::render_record(record));
                }
            }
        }
        Command::Forget { patient_id } => {
            if db.delete_record(&patient_id)? {
                info!(%patient_id, "record deleted");
                println!("Deleted record for {}", patient_id);
            } else {
                eprintln!("No record for patient {}", patient_id);
                return Ok(EXIT_NOT_FOUND);
            }
        }
    }

    Ok(EXIT_OK)
}

#[cfg(feature = "onnx")]
fn load_models(config: &PcosConfig) -> Result<Models> {
    pcos_vision::load_models(config).context("loading models")
}

#[cfg(not(feature = "onnx"))]
fn load_models(_config: &PcosConfig) -> Result<Models> {
    anyhow::bail!("this build has no model runtime; rebuild pcos-cli with `--features onnx`")
}
