use super::exit_code_for;
use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use spike2_rs::{Channel, ChannelKind, Trial, TrialInfo};

#[derive(Serialize)]
struct ChannelSummary {
    name: String,
    kind: ChannelKind,
    count: usize,
    sampling_frequency: Option<u32>,
    units: Option<String>,
}

#[derive(Serialize)]
struct InfoOutput {
    file: String,
    trial_name: String,
    channels: Vec<ChannelSummary>,
}

impl ChannelSummary {
    fn from_channel(channel: &Channel) -> Self {
        let info = channel.info();
        let count = match channel {
            Channel::Waveform(w) => w.len(),
            other => other.times().len(),
        };
        Self {
            name: info.name.clone(),
            kind: channel.kind(),
            count,
            sampling_frequency: info.sampling_frequency,
            units: info.units.clone(),
        }
    }
}

pub fn execute(args: InfoArgs) -> i32 {
    let mut trial_info = TrialInfo::new(&args.file);
    if !args.channels.is_empty() {
        trial_info = trial_info.with_channels(args.channels.clone());
    }

    let trial = match Trial::new(trial_info) {
        Ok(trial) => trial,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    let summary = InfoOutput {
        file: args.file.display().to_string(),
        trial_name: trial.name().to_string(),
        channels: trial.iter().map(ChannelSummary::from_channel).collect(),
    };

    if args.json {
        if !output::emit(&summary, None, false) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!("{} ({})", summary.trial_name, summary.file);
        println!();
        println!("{:<20} {:<10} {:>10} {:>8}  UNITS", "CHANNEL", "TYPE", "COUNT", "FS (Hz)");
        for ch in &summary.channels {
            println!(
                "{:<20} {:<10} {:>10} {:>8}  {}",
                ch.name,
                ch.kind.as_str(),
                ch.count,
                ch.sampling_frequency
                    .map(|fs| fs.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                ch.units.as_deref().unwrap_or("-")
            );
        }
    }

    exit_codes::SUCCESS
}
