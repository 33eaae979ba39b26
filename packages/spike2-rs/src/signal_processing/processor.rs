//! Waveform processing operations
//!
//! Every operation works in place on a [`Waveform`]'s samples and returns the
//! channel so calls can be chained:
//!
//! ```ignore
//! waveform.remove_mean(None)?.bandpass([20.0, 450.0], 4)?.rect();
//! ```
//!
//! Fallible operations check all of their arguments before touching the
//! samples, so a failed call leaves the channel unchanged.

use super::filters::{ButterworthFilter, FilterType};
use crate::channels::Waveform;
use crate::error::{Result, Spike2Error};
use serde::{Deserialize, Serialize};

/// Butterworth order used when none is given
pub const DEFAULT_FILTER_ORDER: usize = 4;
pub const MIN_FILTER_ORDER: usize = 1;
pub const MAX_FILTER_ORDER: usize = 16;

/// One applied operation in a waveform's provenance log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub operation: String,
    #[serde(with = "crate::serde_samples::samples")]
    pub params: Vec<f64>,
    /// Identifier-safe name, e.g. `filt_5_lowpass` or `remove_value_2p5`
    pub marker: String,
}

impl ProcessingRecord {
    fn new(operation: &str, params: Vec<f64>) -> Self {
        let marker = std::iter::once(operation.to_string())
            .chain(params.iter().map(|&p| encode_param(p)))
            .collect::<Vec<_>>()
            .join("_");
        Self::with_marker(operation, params, marker)
    }

    fn with_marker(operation: &str, params: Vec<f64>, marker: String) -> Self {
        Self {
            operation: operation.to_string(),
            params,
            marker,
        }
    }
}

/// Number as an identifier fragment: `2.5` -> `2p5`, `-3` -> `neg3`.
///
/// The result never contains `_`, which separates parameters in a marker.
pub fn encode_param(value: f64) -> String {
    let digits = format!("{}", value.abs()).replace('.', "p");
    if value.is_sign_negative() && value != 0.0 {
        format!("neg{}", digits)
    } else {
        digits
    }
}

/// Short blake3 digest of a time axis, so distinct axes get distinct markers
fn axis_digest(times: &[f64]) -> String {
    let mut hasher = blake3::Hasher::new();
    for t in times {
        hasher.update(&t.to_le_bytes());
    }
    hasher.finalize().to_hex()[..AXIS_DIGEST_LEN].to_string()
}

const AXIS_DIGEST_LEN: usize = 12;

impl Waveform {
    fn record(&mut self, record: ProcessingRecord) -> &mut Self {
        log::debug!("'{}': {}", self.info.name, record.marker);
        self.provenance.push(record);
        self
    }

    /// Subtract the mean of the first `first_n_samples` samples (default: all)
    pub fn remove_mean(&mut self, first_n_samples: Option<usize>) -> Result<&mut Self> {
        let n = first_n_samples.unwrap_or(self.values.len());
        if n < 1 || n > self.values.len() {
            return Err(Spike2Error::InvalidArgument(format!(
                "first_n_samples must be between 1 and the length of the signal (i.e. {}), got {}",
                self.values.len(),
                n
            )));
        }

        let mean = self.values[..n].iter().sum::<f64>() / n as f64;
        for v in &mut self.values {
            *v -= mean;
        }

        let record = match first_n_samples {
            Some(n) => ProcessingRecord::new("remove_mean", vec![n as f64]),
            None => ProcessingRecord::new("remove_mean", Vec::new()),
        };
        Ok(self.record(record))
    }

    /// Subtract `value` from every sample
    pub fn remove_value(&mut self, value: f64) -> &mut Self {
        for v in &mut self.values {
            *v -= value;
        }
        self.record(ProcessingRecord::new("remove_value", vec![value]))
    }

    /// Zero-phase Butterworth lowpass
    pub fn lowpass(&mut self, cutoff: f64, order: usize) -> Result<&mut Self> {
        self.filter(FilterType::Lowpass, &[cutoff], order)
    }

    /// Zero-phase Butterworth highpass
    pub fn highpass(&mut self, cutoff: f64, order: usize) -> Result<&mut Self> {
        self.filter(FilterType::Highpass, &[cutoff], order)
    }

    /// Zero-phase Butterworth bandpass over `[low, high]`
    pub fn bandpass(&mut self, cutoff: [f64; 2], order: usize) -> Result<&mut Self> {
        self.filter(FilterType::Bandpass, &cutoff, order)
    }

    /// Zero-phase Butterworth bandstop over `[low, high]`
    pub fn bandstop(&mut self, cutoff: [f64; 2], order: usize) -> Result<&mut Self> {
        self.filter(FilterType::Bandstop, &cutoff, order)
    }

    /// Apply a zero-phase Butterworth filter of any type.
    ///
    /// `cutoff` holds one frequency for lowpass/highpass and an increasing
    /// `[low, high]` pair for bandpass/bandstop, all in Hz.
    pub fn filter(
        &mut self,
        filter_type: FilterType,
        cutoff: &[f64],
        order: usize,
    ) -> Result<&mut Self> {
        let sample_rate = self.check_filter_args(filter_type, cutoff, order)?;

        let mut filter = ButterworthFilter::design(filter_type, cutoff, sample_rate, order);
        self.values = filter.filtfilt(&self.values);

        let cutoff_label = cutoff
            .iter()
            .map(|&c| encode_param(c))
            .collect::<Vec<_>>()
            .join("_");
        let mut marker = format!("filt_{}_{}", cutoff_label, filter_type.as_str());
        if order != DEFAULT_FILTER_ORDER {
            marker.push_str(&format!("_order{}", order));
        }
        let mut params = cutoff.to_vec();
        params.push(order as f64);
        Ok(self.record(ProcessingRecord::with_marker(
            filter_type.as_str(),
            params,
            marker,
        )))
    }

    /// Returns the sampling frequency the filter is designed for
    fn check_filter_args(&self, filter_type: FilterType, cutoff: &[f64], order: usize) -> Result<f64> {
        let sample_rate = self
            .info
            .sampling_frequency
            .filter(|&fs| fs > 0)
            .ok_or_else(|| {
                Spike2Error::InvalidArgument(format!(
                    "'{}' has no sampling frequency to filter against",
                    self.info.name
                ))
            })? as f64;

        let expected = if filter_type.is_band() { 2 } else { 1 };
        if cutoff.len() != expected {
            return Err(Spike2Error::InvalidArgument(format!(
                "{} filter takes {} cutoff frequencies, got {}",
                filter_type.as_str(),
                expected,
                cutoff.len()
            )));
        }

        let nyquist = sample_rate / 2.0;
        if let Some(bad) = cutoff.iter().find(|&&c| !(c > 0.0 && c < nyquist)) {
            return Err(Spike2Error::InvalidArgument(format!(
                "Filter cutoff frequency {} is out of Nyquist range: must be between 0 and {}",
                bad, nyquist
            )));
        }
        if filter_type.is_band() && cutoff[0] >= cutoff[1] {
            return Err(Spike2Error::InvalidArgument(format!(
                "Band cutoffs must be increasing, got [{}, {}]",
                cutoff[0], cutoff[1]
            )));
        }

        if !(MIN_FILTER_ORDER..=MAX_FILTER_ORDER).contains(&order) {
            return Err(Spike2Error::InvalidArgument(format!(
                "Filter order must be a whole number between {} and {}, got {}",
                MIN_FILTER_ORDER, MAX_FILTER_ORDER, order
            )));
        }
        Ok(sample_rate)
    }

    /// `values * slope - offset`
    pub fn calibrate(&mut self, slope: f64, offset: f64) -> &mut Self {
        for v in &mut self.values {
            *v *= slope;
            if offset != 0.0 {
                *v -= offset;
            }
        }
        self.record(ProcessingRecord::new("calibrate", vec![slope, offset]))
    }

    /// Scale so the maximum sample is 100
    pub fn norm_percentage(&mut self) -> Result<&mut Self> {
        let max = self.nonzero_max()?;
        for v in &mut self.values {
            *v = *v / max * 100.0;
        }
        Ok(self.record(ProcessingRecord::new("norm_percentage", Vec::new())))
    }

    /// Scale so the maximum sample is 1
    pub fn norm_proportion(&mut self) -> Result<&mut Self> {
        let max = self.nonzero_max()?;
        for v in &mut self.values {
            *v /= max;
        }
        Ok(self.record(ProcessingRecord::new("norm_proportion", Vec::new())))
    }

    fn nonzero_max(&self) -> Result<f64> {
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if self.values.is_empty() || max == 0.0 {
            return Err(Spike2Error::InvalidArgument(format!(
                "Cannot normalise '{}': maximum value is zero",
                self.info.name
            )));
        }
        Ok(max)
    }

    /// Express samples as a percentage of `value`
    pub fn norm_percent_value(&mut self, value: f64) -> Result<&mut Self> {
        if value == 0.0 || !value.is_finite() {
            return Err(Spike2Error::InvalidArgument(format!(
                "Reference value for normalisation must be finite and non-zero, got {}",
                value
            )));
        }
        for v in &mut self.values {
            *v = *v / value * 100.0;
        }
        Ok(self.record(ProcessingRecord::new("norm_percent_value", vec![value])))
    }

    /// Full-wave rectification
    pub fn rect(&mut self) -> &mut Self {
        for v in &mut self.values {
            *v = v.abs();
        }
        self.record(ProcessingRecord::new("rect", Vec::new()))
    }

    /// Linearly interpolate onto `new_times`.
    ///
    /// `new_times` may cover only part of the current axis but must not end
    /// after it. The current axis is kept in `times_pre_interp`.
    pub fn interp_new_times(&mut self, new_times: Vec<f64>) -> Result<&mut Self> {
        let (Some(&new_last), Some(&last)) = (new_times.last(), self.times.last()) else {
            return Err(Spike2Error::InvalidArgument(
                "Interpolation needs a non-empty signal and a non-empty time axis".to_string(),
            ));
        };
        if new_last > last {
            return Err(Spike2Error::InvalidArgument(format!(
                "New time axis for interpolation cannot be longer in duration than the \
                 current time axis (ends at {}, current ends at {})",
                new_last, last
            )));
        }

        let marker = format!(
            "interp_new_times_{}_{}",
            new_times.len(),
            axis_digest(&new_times)
        );
        let record = ProcessingRecord::with_marker(
            "interp_new_times",
            vec![new_times.len() as f64, new_times[0], new_last],
            marker,
        );
        self.interp(new_times);
        Ok(self.record(record))
    }

    /// Resample onto a uniform axis at `new_fs` Hz spanning `[times[0], times[-1])`
    pub fn interp_new_fs(&mut self, new_fs: f64) -> Result<&mut Self> {
        if !(new_fs.is_finite() && new_fs > 0.0) {
            return Err(Spike2Error::InvalidArgument(format!(
                "New sampling frequency must be positive, got {}",
                new_fs
            )));
        }
        let (Some(&first), Some(&last)) = (self.times.first(), self.times.last()) else {
            return Err(Spike2Error::InvalidArgument(
                "Cannot resample an empty signal".to_string(),
            ));
        };

        let count = ((last - first) * new_fs).ceil().max(0.0) as usize;
        let new_times = (0..count).map(|i| first + i as f64 / new_fs).collect();

        self.interp(new_times);
        Ok(self.record(ProcessingRecord::new("interp_new_fs", vec![new_fs])))
    }

    fn interp(&mut self, new_times: Vec<f64>) {
        self.values = interp_linear(&new_times, &self.times, &self.values);
        self.times_pre_interp = Some(std::mem::replace(&mut self.times, new_times));
    }

    /// Subtract the least-squares line through the samples
    pub fn linear_detrend(&mut self) -> &mut Self {
        let n = self.values.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = self.values.iter().sum::<f64>() / n;

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, &y) in self.values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y - y_mean);
            sxx += dx * dx;
        }
        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

        for (i, v) in self.values.iter_mut().enumerate() {
            *v -= y_mean + slope * (i as f64 - x_mean);
        }
        self.record(ProcessingRecord::new("linear_detrend", Vec::new()))
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`; values outside
/// `xp` are clamped to the end points. `xp` must be increasing.
pub fn interp_linear(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return vec![f64::NAN; x.len()];
    }
    let (xp, fp) = (&xp[..n], &fp[..n]);

    x.iter()
        .map(|&xi| {
            if xi <= xp[0] {
                return fp[0];
            }
            if xi >= xp[n - 1] {
                return fp[n - 1];
            }
            let hi = xp.partition_point(|&t| t <= xi);
            let lo = hi - 1;
            let span = xp[hi] - xp[lo];
            if span == 0.0 {
                fp[lo]
            } else {
                fp[lo] + (fp[hi] - fp[lo]) * (xi - xp[lo]) / span
            }
        })
        .collect()
}
