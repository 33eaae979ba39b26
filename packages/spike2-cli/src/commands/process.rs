use super::exit_code_for;
use crate::cli::ProcessArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use spike2_rs::{ProcessingPipeline, ProcessingRecord, Trial, TrialInfo, Waveform};

#[derive(Serialize)]
struct ProcessOutput<'a> {
    channel: &'a str,
    trial_name: &'a str,
    units: Option<&'a str>,
    sampling_frequency: Option<u32>,
    provenance: &'a [ProcessingRecord],
    times: &'a [f64],
    values: &'a [f64],
}

impl<'a> ProcessOutput<'a> {
    fn new(trial_name: &'a str, waveform: &'a Waveform) -> Self {
        let info = waveform.info();
        Self {
            channel: &info.name,
            trial_name,
            units: info.units.as_deref(),
            sampling_frequency: info.sampling_frequency,
            provenance: waveform.provenance(),
            times: waveform.times(),
            values: waveform.values(),
        }
    }
}

pub fn execute(args: ProcessArgs) -> i32 {
    let pipeline = match &args.pipeline {
        Some(path) => match ProcessingPipeline::from_file(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        },
        None => ProcessingPipeline::new(args.steps.clone()),
    };
    if pipeline.is_empty() {
        log::warn!("No processing steps given; writing the channel unchanged");
    }

    let mut trial_info = TrialInfo::new(&args.file).with_channels(vec![args.channel.clone()]);
    if let Some(ref subject_id) = args.subject_id {
        trial_info = trial_info.with_subject_id(subject_id.clone());
    }
    trial_info.path_save_trial = args.save_trial.clone();

    let mut trial = match Trial::new(trial_info) {
        Ok(trial) => trial,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_code_for(&e);
        }
    };

    let applied = trial
        .waveform_mut(&args.channel)
        .and_then(|waveform| pipeline.apply(waveform));
    if let Err(e) = applied {
        eprintln!("Error: {}", e);
        return exit_code_for(&e);
    }

    if args.save_trial.is_some() {
        match trial.save() {
            Ok(path) => log::info!("Trial saved to {}", path.display()),
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    }

    let Some(waveform) = trial.channel(&args.channel).and_then(|c| c.as_waveform()) else {
        eprintln!("Error: channel '{}' is not a waveform", args.channel);
        return exit_codes::INPUT_ERROR;
    };
    let result = ProcessOutput::new(trial.name(), waveform);

    if !output::emit(&result, args.output.as_deref(), args.compact) {
        return exit_codes::EXECUTION_ERROR;
    }
    exit_codes::SUCCESS
}
