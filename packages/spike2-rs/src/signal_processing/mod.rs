//! Signal Processing Module
//!
//! Operations on waveform channels:
//! - Zero-phase Butterworth lowpass/highpass/bandpass/bandstop filters
//! - Offset removal, calibration, normalisation and rectification
//! - Linear interpolation onto a new time axis or sampling frequency
//! - Linear detrending
//!
//! Filters use second-order sections (biquads) for numerical stability.

mod filters;
mod pipeline;
mod processor;

pub use filters::{BiquadCoeffs, BiquadFilter, ButterworthFilter, FilterType, SosFilter};
pub use pipeline::{ProcessingPipeline, ProcessingStep};
pub use processor::{
    encode_param, interp_linear, ProcessingRecord, DEFAULT_FILTER_ORDER, MAX_FILTER_ORDER,
    MIN_FILTER_ORDER,
};
