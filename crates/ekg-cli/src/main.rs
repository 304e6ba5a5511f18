use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ekg_lib::{
    config::{MeasureConfig, SynthConfig},
    measure::{measure, normalize_str_with_warnings, validate, ValidationWarning},
    metrics::quality::{assess, QualityReport},
    record::EcgRecord,
    roundtrip::roundtrip,
    synth::{
        device::{ArtifactPreset, DevicePreset},
        synthesize, Diagnosis,
    },
};
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "ekg",
    version,
    about = "Synthetic 12-lead ECG generator and measurement tools"
)]
struct Cli {
    /// Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DeviceArg {
    Diagnostic,
    Monitor,
}

impl From<DeviceArg> for DevicePreset {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Diagnostic => DevicePreset::Diagnostic,
            DeviceArg::Monitor => DevicePreset::Monitor,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ArtifactArg {
    None,
    Typical,
    Heavy,
}

impl From<ArtifactArg> for ArtifactPreset {
    fn from(arg: ArtifactArg) -> Self {
        match arg {
            ArtifactArg::None => ArtifactPreset::None,
            ArtifactArg::Typical => ArtifactPreset::Typical,
            ArtifactArg::Heavy => ArtifactPreset::Heavy,
        }
    }
}

/// Options shared by every command that synthesizes a record.
#[derive(clap::Args)]
struct SynthArgs {
    #[arg(long)]
    age: f64,
    /// Diagnosis label, e.g. "Normal sinus", "RBBB", "3rd degree AVB"
    #[arg(long, default_value = "Normal sinus")]
    dx: Diagnosis,
    #[arg(long, default_value_t = 1)]
    seed: u32,
    /// TOML file with a full synthesis configuration
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    fs: Option<f64>,
    #[arg(long)]
    duration_s: Option<f64>,
    #[arg(long)]
    device: Option<DeviceArg>,
    #[arg(long)]
    artifacts: Option<ArtifactArg>,
    /// Also emit V3R, V4R and V7
    #[arg(long)]
    extended: bool,
}

impl SynthArgs {
    fn config(&self) -> Result<SynthConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                SynthConfig::from_toml_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => SynthConfig::default(),
        };
        if let Some(fs) = self.fs {
            cfg.fs = fs;
        }
        if let Some(duration) = self.duration_s {
            cfg.duration_s = duration;
        }
        if let Some(device) = self.device {
            cfg.device.preset = device.into();
        }
        if let Some(artifacts) = self.artifacts {
            cfg.device.artifacts = artifacts.into();
        }
        cfg.extended_leads |= self.extended;
        Ok(cfg)
    }

    fn synthesize(&self) -> Result<EcgRecord> {
        let cfg = self.config()?;
        synthesize(self.age, self.dx, self.seed, &cfg)
            .with_context(|| format!("synthesizing {} at age {}", self.dx, self.age))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a record and write it as JSON
    Synth {
        #[command(flatten)]
        args: SynthArgs,
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        pretty: bool,
    },
    /// Measure a record read from --input or stdin
    Measure {
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML file with detector/median/fiducial settings
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Normalize a record and report advisory warnings
    Validate {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Synthesize, measure and compare against the ground truth
    Roundtrip {
        #[command(flatten)]
        args: SynthArgs,
        #[arg(long)]
        measure_config: Option<PathBuf>,
        /// Exit with an error when any check fails
        #[arg(long)]
        strict: bool,
    },
    /// List the supported diagnosis labels
    Diagnoses,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Commands::Synth { args, out, pretty } => cmd_synth(&args, out.as_deref(), pretty)?,
        Commands::Measure { input, config } => cmd_measure(input.as_deref(), config.as_deref())?,
        Commands::Validate { input } => cmd_validate(input.as_deref())?,
        Commands::Roundtrip {
            args,
            measure_config,
            strict,
        } => cmd_roundtrip(&args, measure_config.as_deref(), strict)?,
        Commands::Diagnoses => {
            for dx in Diagnosis::ALL {
                println!("{}", dx.label());
            }
        }
    }
    Ok(())
}

fn read_record(input: Option<&Path>) -> Result<EcgRecord> {
    read_record_with_warnings(input).map(|(record, _)| record)
}

/// The record plus what normalization discarded from it.
fn read_record_with_warnings(input: Option<&Path>) -> Result<(EcgRecord, Vec<ValidationWarning>)> {
    let text = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read record {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let source = input.map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
    normalize_str_with_warnings(&text).with_context(|| format!("normalizing record from {source}"))
}

fn read_measure_config(path: Option<&Path>) -> Result<MeasureConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            MeasureConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(MeasureConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_synth(args: &SynthArgs, out: Option<&Path>, pretty: bool) -> Result<()> {
    let record = args.synthesize()?;
    let js = if pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    match out {
        Some(path) => {
            fs::write(path, js).with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => println!("{js}"),
    }
    Ok(())
}

fn cmd_measure(input: Option<&Path>, config: Option<&Path>) -> Result<()> {
    let record = read_record(input)?;
    let cfg = read_measure_config(config)?;
    print_json(&measure(&record, &cfg))
}

#[derive(Serialize)]
struct ValidateOutput {
    fs: f64,
    duration_s: f64,
    leads: Vec<String>,
    warnings: Vec<ValidationWarning>,
    quality: QualityReport,
}

fn cmd_validate(input: Option<&Path>) -> Result<()> {
    let (record, mut warnings) = read_record_with_warnings(input)?;
    warnings.extend(validate(&record));
    for w in &warnings {
        warn!("{w}");
    }
    print_json(&ValidateOutput {
        fs: record.fs,
        duration_s: record.duration_s,
        leads: record.leads.keys().map(|l| l.to_string()).collect(),
        warnings,
        quality: assess(&record, None),
    })
}

fn cmd_roundtrip(args: &SynthArgs, measure_config: Option<&Path>, strict: bool) -> Result<()> {
    let record = args.synthesize()?;
    let cfg = read_measure_config(measure_config)?;
    let measurement = measure(&record, &cfg);
    let report = roundtrip(&record, &measurement, &cfg.tolerances);
    print_json(&report)?;
    if strict && !report.pass {
        let mut failed: Vec<&str> = report.failures().map(|c| c.field.as_str()).collect();
        if report.einthoven_pass == Some(false) {
            failed.push("einthoven");
        }
        bail!("round trip failed for {}", failed.join(", "));
    }
    Ok(())
}
