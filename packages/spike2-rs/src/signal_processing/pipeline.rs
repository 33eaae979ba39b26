//! Processing Pipeline
//!
//! A serde-configurable, ordered list of waveform operations. Pipelines are
//! stored as JSON arrays:
//!
//! ```json
//! [
//!   { "op": "remove_mean" },
//!   { "op": "bandpass", "cutoff": [20.0, 450.0] },
//!   { "op": "rect" },
//!   { "op": "lowpass", "cutoff": 6.0, "order": 2 }
//! ]
//! ```

use super::processor::DEFAULT_FILTER_ORDER;
use crate::channels::Waveform;
use crate::error::{Result, Spike2Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// One waveform operation with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ProcessingStep {
    RemoveMean {
        #[serde(default)]
        first_n_samples: Option<usize>,
    },
    RemoveValue {
        value: f64,
    },
    Lowpass {
        cutoff: f64,
        #[serde(default = "default_filter_order")]
        order: usize,
    },
    Highpass {
        cutoff: f64,
        #[serde(default = "default_filter_order")]
        order: usize,
    },
    Bandpass {
        cutoff: [f64; 2],
        #[serde(default = "default_filter_order")]
        order: usize,
    },
    Bandstop {
        cutoff: [f64; 2],
        #[serde(default = "default_filter_order")]
        order: usize,
    },
    Calibrate {
        slope: f64,
        #[serde(default)]
        offset: f64,
    },
    NormPercentage,
    NormProportion,
    NormPercentValue {
        value: f64,
    },
    Rect,
    InterpNewTimes {
        new_times: Vec<f64>,
    },
    InterpNewFs {
        new_fs: f64,
    },
    LinearDetrend,
}

fn default_filter_order() -> usize {
    DEFAULT_FILTER_ORDER
}

impl ProcessingStep {
    /// Apply this step to `waveform`
    pub fn apply<'a>(&self, waveform: &'a mut Waveform) -> Result<&'a mut Waveform> {
        match self {
            ProcessingStep::RemoveMean { first_n_samples } => waveform.remove_mean(*first_n_samples),
            ProcessingStep::RemoveValue { value } => Ok(waveform.remove_value(*value)),
            ProcessingStep::Lowpass { cutoff, order } => waveform.lowpass(*cutoff, *order),
            ProcessingStep::Highpass { cutoff, order } => waveform.highpass(*cutoff, *order),
            ProcessingStep::Bandpass { cutoff, order } => waveform.bandpass(*cutoff, *order),
            ProcessingStep::Bandstop { cutoff, order } => waveform.bandstop(*cutoff, *order),
            ProcessingStep::Calibrate { slope, offset } => Ok(waveform.calibrate(*slope, *offset)),
            ProcessingStep::NormPercentage => waveform.norm_percentage(),
            ProcessingStep::NormProportion => waveform.norm_proportion(),
            ProcessingStep::NormPercentValue { value } => waveform.norm_percent_value(*value),
            ProcessingStep::Rect => Ok(waveform.rect()),
            ProcessingStep::InterpNewTimes { new_times } => {
                waveform.interp_new_times(new_times.clone())
            }
            ProcessingStep::InterpNewFs { new_fs } => waveform.interp_new_fs(*new_fs),
            ProcessingStep::LinearDetrend => Ok(waveform.linear_detrend()),
        }
    }
}

/// Compact command-line form: `name` or `name:arg,arg`.
///
/// Examples: `rect`, `remove_mean:100`, `lowpass:20`, `lowpass:20,2`,
/// `bandpass:20,450`, `calibrate:2,0.5`, `interp_new_fs:500`.
/// `interp_new_times` needs a pipeline file.
impl FromStr for ProcessingStep {
    type Err = Spike2Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, args) = match s.split_once(':') {
            Some((name, args)) => (name.trim(), args),
            None => (s.trim(), ""),
        };
        let args: Vec<f64> = args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| {
                a.parse::<f64>().map_err(|_| {
                    Spike2Error::InvalidArgument(format!("'{}': '{}' is not a number", s, a))
                })
            })
            .collect::<Result<_>>()?;

        let arity = |min: usize, max: usize| -> Result<()> {
            if args.len() < min || args.len() > max {
                return Err(Spike2Error::InvalidArgument(format!(
                    "'{}' takes {} argument(s), got {}",
                    name,
                    if min == max { min.to_string() } else { format!("{}-{}", min, max) },
                    args.len()
                )));
            }
            Ok(())
        };
        let order = |idx: usize| -> Result<usize> {
            match args.get(idx) {
                Some(&o) => whole(o, "order"),
                None => Ok(DEFAULT_FILTER_ORDER),
            }
        };

        let step = match name {
            "remove_mean" => {
                arity(0, 1)?;
                ProcessingStep::RemoveMean {
                    first_n_samples: args.first().map(|&n| whole(n, "first_n_samples")).transpose()?,
                }
            }
            "remove_value" => {
                arity(1, 1)?;
                ProcessingStep::RemoveValue { value: args[0] }
            }
            "lowpass" => {
                arity(1, 2)?;
                ProcessingStep::Lowpass { cutoff: args[0], order: order(1)? }
            }
            "highpass" => {
                arity(1, 2)?;
                ProcessingStep::Highpass { cutoff: args[0], order: order(1)? }
            }
            "bandpass" => {
                arity(2, 3)?;
                ProcessingStep::Bandpass { cutoff: [args[0], args[1]], order: order(2)? }
            }
            "bandstop" => {
                arity(2, 3)?;
                ProcessingStep::Bandstop { cutoff: [args[0], args[1]], order: order(2)? }
            }
            "calibrate" => {
                arity(1, 2)?;
                ProcessingStep::Calibrate {
                    slope: args[0],
                    offset: args.get(1).copied().unwrap_or(0.0),
                }
            }
            "norm_percentage" => {
                arity(0, 0)?;
                ProcessingStep::NormPercentage
            }
            "norm_proportion" => {
                arity(0, 0)?;
                ProcessingStep::NormProportion
            }
            "norm_percent_value" => {
                arity(1, 1)?;
                ProcessingStep::NormPercentValue { value: args[0] }
            }
            "rect" => {
                arity(0, 0)?;
                ProcessingStep::Rect
            }
            "interp_new_fs" => {
                arity(1, 1)?;
                ProcessingStep::InterpNewFs { new_fs: args[0] }
            }
            "linear_detrend" => {
                arity(0, 0)?;
                ProcessingStep::LinearDetrend
            }
            "interp_new_times" => {
                return Err(Spike2Error::InvalidArgument(
                    "interp_new_times needs a time axis; use a pipeline file".to_string(),
                ))
            }
            other => {
                return Err(Spike2Error::InvalidArgument(format!(
                    "Unknown processing step '{}'",
                    other
                )))
            }
        };
        Ok(step)
    }
}

fn whole(value: f64, what: &str) -> Result<usize> {
    if value.fract() != 0.0 || value < 0.0 {
        return Err(Spike2Error::InvalidArgument(format!(
            "{} must be a whole number, got {}",
            what, value
        )));
    }
    Ok(value as usize)
}

/// Ordered list of processing steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessingPipeline {
    pub steps: Vec<ProcessingStep>,
}

impl ProcessingPipeline {
    pub fn new(steps: Vec<ProcessingStep>) -> Self {
        Self { steps }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a pipeline from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Spike2Error::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Apply every step in order.
    ///
    /// Steps run on a working copy; `waveform` is only replaced once all of
    /// them succeed.
    pub fn apply(&self, waveform: &mut Waveform) -> Result<()> {
        let mut working = waveform.clone();
        for (idx, step) in self.steps.iter().enumerate() {
            step.apply(&mut working).map_err(|e| match e {
                Spike2Error::InvalidArgument(msg) => {
                    Spike2Error::InvalidArgument(format!("step {}: {}", idx + 1, msg))
                }
                other => other,
            })?;
        }
        *waveform = working;
        log::info!(
            "Applied {} processing steps to '{}'",
            self.steps.len(),
            waveform.info().name
        );
        Ok(())
    }
}
