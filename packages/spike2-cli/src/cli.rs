use clap::{Args, Parser, Subcommand};
use spike2_rs::ProcessingStep;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "spike2",
    version,
    about = "Inspect and process Spike2 recordings exported to MATLAB .mat files",
    long_about = "Decode Spike2 .mat exports into typed channels (event, keyboard, textmark,\n\
                  waveform, wavemark) and run filtering/normalisation pipelines on waveforms.\n\
                  In Spike2, use File > Export As > .mat to create the input file."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the channels of an export
    Info(InfoArgs),
    /// Check that a file is a decodable Spike2 export
    Validate(ValidateArgs),
    /// Apply processing steps to a waveform channel
    Process(ProcessArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    /// Spike2 .mat export
    #[arg(long, env = "SPIKE2_FILE")]
    pub file: PathBuf,

    /// Only these channels (names as in the recording)
    #[arg(long, num_args = 1..)]
    pub channels: Vec<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// File to validate
    #[arg(long, env = "SPIKE2_FILE")]
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ProcessArgs {
    /// Spike2 .mat export
    #[arg(long, env = "SPIKE2_FILE")]
    pub file: PathBuf,

    /// Waveform channel to process
    #[arg(long)]
    pub channel: String,

    /// JSON pipeline file (array of {"op": ..., ...} steps)
    #[arg(long, conflicts_with = "steps")]
    pub pipeline: Option<PathBuf>,

    /// Processing step, repeatable: rect, remove_mean[:n], lowpass:cutoff[,order],
    /// bandpass:low,high[,order], calibrate:slope[,offset], interp_new_fs:fs, ...
    #[arg(long = "step")]
    pub steps: Vec<ProcessingStep>,

    /// Subject identifier stored with the trial
    #[arg(long)]
    pub subject_id: Option<String>,

    /// Also save the processed trial snapshot (JSON) to this directory
    #[arg(long)]
    pub save_trial: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}
