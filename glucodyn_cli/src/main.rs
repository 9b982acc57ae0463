use chrono::{NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use glucodyn_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "glucodyn")]
#[command(about = "Decode pump history into a GlucoDyn simulation timeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a history file into simulation events
    Decode {
        /// JSON array of pump history records, in device order
        #[arg(long)]
        history: PathBuf,

        /// JSON array of basal schedule segments
        #[arg(long)]
        basal: PathBuf,

        /// Zero-reference time, e.g. 2015-06-06T21:00:00
        #[arg(long, value_parser = parse_datetime)]
        zero: NaiveDateTime,

        /// Simulation window in hours (overrides config)
        #[arg(long)]
        sim_hours: Option<u32>,

        /// Output format (json, csv)
        #[arg(long, default_value = "json", value_parser = parse_format)]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show the basal segments active between two times of day
    Rates {
        /// JSON array of basal schedule segments
        #[arg(long)]
        basal: PathBuf,

        /// Start time of day, e.g. 04:00
        #[arg(long, value_parser = parse_time_of_day)]
        from: NaiveTime,

        /// End time of day, e.g. 09:00
        #[arg(long, value_parser = parse_time_of_day)]
        to: NaiveTime,
    },

    /// Show the effective simulation window and decoder settings
    Window,
}

fn main() -> Result<()> {
    // Initialize logging
    glucodyn_core::logging::init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Decode {
            history,
            basal,
            zero,
            sim_hours,
            format,
            output,
        } => cmd_decode(
            &history,
            &basal,
            zero,
            sim_hours,
            format,
            output.as_deref(),
            &config,
        ),
        Commands::Rates { basal, from, to } => cmd_rates(&basal, from, to),
        Commands::Window => cmd_window(&config),
    }
}

fn cmd_decode(
    history_path: &Path,
    basal_path: &Path,
    zero: NaiveDateTime,
    sim_hours: Option<u32>,
    format: ExportFormat,
    output: Option<&Path>,
    config: &Config,
) -> Result<()> {
    let sim_hours = sim_hours.unwrap_or_else(|| config.simulation.sim_hours());
    if sim_hours == 0 || sim_hours >= 24 {
        return Err(Error::Config(format!(
            "--sim-hours must be between 1 and 23, got {}",
            sim_hours
        )));
    }

    let schedule = load_basal_schedule(basal_path)?;
    let records = load_history(history_path)?;

    let decoder =
        EventDecoder::new(&schedule, zero, sim_hours).with_options(config.decoder_options());
    let timeline = decoder.timeline();
    tracing::info!(
        "Decoding {} records between {} and {} ({} hours either side of {})",
        records.len(),
        timeline.window_start()?,
        timeline.window_end()?,
        timeline.sim_hours(),
        timeline.zero()
    );

    let events = decoder.decode(&records)?;

    match output {
        Some(path) => {
            export_to_path(path, &events, format)?;
            eprintln!("✓ Wrote {} events to {}", events.len(), path.display());
        }
        None => write_events(std::io::stdout().lock(), &events, format)?,
    }

    Ok(())
}

fn cmd_rates(basal_path: &Path, from: NaiveTime, to: NaiveTime) -> Result<()> {
    let schedule = load_basal_schedule(basal_path)?;
    let segments = schedule.rates_in_range(from, to)?;

    for segment in segments {
        println!(
            "{}  {:.3} U/h",
            segment.start_time_of_day.format("%H:%M:%S"),
            segment.rate_per_hour
        );
    }

    Ok(())
}

fn cmd_window(config: &Config) -> Result<()> {
    config.validate()?;
    let options = config.decoder_options();

    println!("Simulation window: ±{} hours", config.simulation.sim_hours());
    println!(
        "  Insulin action: {} hours",
        config.simulation.insulin_action_hours
    );
    println!(
        "  Max carb absorption: {} hours",
        config.simulation.max_carb_absorption_hours
    );
    println!("Carb absorption class: {} min", options.carb_absorption_minutes);
    println!(
        "Duplicate carb window: {} s",
        options.duplicate_carb_window_seconds
    );

    Ok(())
}

fn parse_datetime(s: &str) -> std::result::Result<NaiveDateTime, String> {
    s.parse::<NaiveDateTime>()
        .map_err(|e| format!("invalid datetime '{}': {}", s, e))
}

fn parse_time_of_day(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| format!("invalid time of day '{}': {}", s, e))
}

fn parse_format(s: &str) -> std::result::Result<ExportFormat, String> {
    s.parse::<ExportFormat>().map_err(|e| e.to_string())
}
