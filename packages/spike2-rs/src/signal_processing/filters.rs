//! Digital Filter Implementations
//!
//! Butterworth IIR filters designed as analog prototypes (zeros, poles, gain),
//! mapped to the z-plane with the bilinear transform and run as cascaded
//! second-order sections (biquads) for numerical stability.
//!
//! [`SosFilter::filtfilt`] runs the cascade forward and backward for zero net
//! phase shift.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Sample rate used for the normalised bilinear transform (Nyquist = 1)
const NORMALISED_FS: f64 = 2.0;

/// Imaginary parts below this are treated as real roots when pairing
const REAL_ROOT_TOLERANCE: f64 = 1e-10;

/// Filter type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Lowpass => "lowpass",
            FilterType::Highpass => "highpass",
            FilterType::Bandpass => "bandpass",
            FilterType::Bandstop => "bandstop",
        }
    }

    /// Band filters take a `[low, high]` pair, the others a single cutoff
    pub fn is_band(&self) -> bool {
        matches!(self, FilterType::Bandpass | FilterType::Bandstop)
    }
}

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Gain at DC (z = 1)
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// State that leaves the section at rest for a constant unit input
    fn steady_state(&self) -> BiquadState {
        let gain = self.dc_gain();
        BiquadState {
            z1: gain - self.b0,
            z2: self.b2 - self.a2 * gain,
        }
    }
}

/// State for a single biquad section (Direct Form II Transposed)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadState {
    fn scaled(&self, factor: f64) -> Self {
        Self {
            z1: self.z1 * factor,
            z2: self.z2 * factor,
        }
    }
}

/// Single biquad filter section
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Process a single sample using Direct Form II Transposed
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadFilter>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>) -> Self {
        Self {
            sections: sections.into_iter().map(BiquadFilter::new).collect(),
        }
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn coefficients(&self) -> Vec<BiquadCoeffs> {
        self.sections.iter().map(|s| *s.coeffs()).collect()
    }

    /// Process a single sample through all sections
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut output = input;
        for section in &mut self.sections {
            output = section.process(output);
        }
        output
    }

    /// Process a signal and return a new array (original unchanged)
    pub fn filter(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&s| self.process(s)).collect()
    }

    /// Reset all section states
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Initial states for a step response of unit height.
    ///
    /// Each section sees the DC gain of the sections before it.
    fn step_initial_states(&self) -> Vec<BiquadState> {
        let mut upstream_gain = 1.0;
        self.sections
            .iter()
            .map(|section| {
                let state = section.coeffs.steady_state().scaled(upstream_gain);
                upstream_gain *= section.coeffs.dc_gain();
                state
            })
            .collect()
    }

    /// One causal pass starting in steady state for the first sample
    fn filter_from_steady_state(&mut self, signal: &[f64], initial: &[BiquadState]) -> Vec<f64> {
        let Some(&first) = signal.first() else {
            return Vec::new();
        };
        for (section, state) in self.sections.iter_mut().zip(initial) {
            section.state = state.scaled(first);
        }
        self.filter(signal)
    }

    /// Samples added at each end by [`filtfilt`](Self::filtfilt): three times
    /// the tap count of the equivalent `(b, a)` transfer function. First-order
    /// sections (odd orders) contribute one tap less.
    pub fn pad_len(&self) -> usize {
        let short_b = self.sections.iter().filter(|s| s.coeffs.b2 == 0.0).count();
        let short_a = self.sections.iter().filter(|s| s.coeffs.a2 == 0.0).count();
        3 * (2 * self.sections.len() + 1 - short_b.min(short_a))
    }

    /// Zero-phase forward-backward filtering.
    ///
    /// The signal is extended at both ends by odd reflection and both passes
    /// start in steady state, which keeps edge transients small. The output
    /// has the same length as the input.
    pub fn filtfilt(&mut self, signal: &[f64]) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        let pad = self.pad_len().min(signal.len() - 1);
        let extended = odd_extension(signal, pad);
        let initial = self.step_initial_states();

        let mut forward = self.filter_from_steady_state(&extended, &initial);
        forward.reverse();
        let mut backward = self.filter_from_steady_state(&forward, &initial);
        backward.reverse();
        self.reset();

        backward[pad..pad + signal.len()].to_vec()
    }
}

/// Extend `signal` by `pad` samples at each end, reflected through the end points
fn odd_extension(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let first = signal[0];
    let last = signal[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    extended.extend_from_slice(signal);
    extended.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    extended
}

/// Zeros, poles and gain of a transfer function
#[derive(Debug, Clone)]
struct Zpk {
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
}

impl Zpk {
    /// Analog Butterworth prototype with a cutoff of 1 rad/s
    fn prototype(order: usize) -> Self {
        let n = order as f64;
        let poles = (0..order)
            .map(|k| Complex64::from_polar(1.0, PI * (2.0 * k as f64 + n + 1.0) / (2.0 * n)))
            .collect();
        Self {
            zeros: Vec::new(),
            poles,
            gain: 1.0,
        }
    }

    fn relative_degree(&self) -> usize {
        self.poles.len() - self.zeros.len()
    }

    fn into_lowpass(self, wo: f64) -> Self {
        let degree = self.relative_degree() as i32;
        Self {
            zeros: self.zeros.iter().map(|z| *z * wo).collect(),
            poles: self.poles.iter().map(|p| *p * wo).collect(),
            gain: self.gain * wo.powi(degree),
        }
    }

    fn into_highpass(self, wo: f64) -> Self {
        let degree = self.relative_degree();
        let mut zeros: Vec<Complex64> = self.zeros.iter().map(|z| Complex64::new(wo, 0.0) / z).collect();
        zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
        Self {
            zeros,
            poles: self.poles.iter().map(|p| Complex64::new(wo, 0.0) / p).collect(),
            gain: self.gain * self.inverse_gain_factor(),
        }
    }

    fn into_bandpass(self, wo: f64, bw: f64) -> Self {
        let degree = self.relative_degree();
        let mut zeros = split_band(&self.zeros, |z| *z * (bw / 2.0), wo);
        zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
        Self {
            zeros,
            poles: split_band(&self.poles, |p| *p * (bw / 2.0), wo),
            gain: self.gain * bw.powi(degree as i32),
        }
    }

    fn into_bandstop(self, wo: f64, bw: f64) -> Self {
        let degree = self.relative_degree();
        let mut zeros = split_band(&self.zeros, |z| Complex64::new(bw / 2.0, 0.0) / z, wo);
        for _ in 0..degree {
            zeros.push(Complex64::new(0.0, wo));
            zeros.push(Complex64::new(0.0, -wo));
        }
        Self {
            zeros,
            poles: split_band(&self.poles, |p| Complex64::new(bw / 2.0, 0.0) / p, wo),
            gain: self.gain * self.inverse_gain_factor(),
        }
    }

    /// `real(prod(-z) / prod(-p))`, the gain correction of s -> wo/s
    fn inverse_gain_factor(&self) -> f64 {
        let num: Complex64 = self.zeros.iter().map(|z| -*z).product();
        let den: Complex64 = self.poles.iter().map(|p| -*p).product();
        (num / den).re
    }

    /// Map to the z-plane with the bilinear transform
    fn bilinear(self, fs: f64) -> Self {
        let fs2 = Complex64::new(2.0 * fs, 0.0);
        let degree = self.relative_degree();

        let num: Complex64 = self.zeros.iter().map(|z| fs2 - z).product();
        let den: Complex64 = self.poles.iter().map(|p| fs2 - p).product();

        let mut zeros: Vec<Complex64> = self.zeros.iter().map(|z| (fs2 + z) / (fs2 - z)).collect();
        zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
        Self {
            zeros,
            poles: self.poles.iter().map(|p| (fs2 + p) / (fs2 - p)).collect(),
            gain: self.gain * (num / den).re,
        }
    }

    /// Group roots into second-order sections.
    ///
    /// Pole groups closest to the unit circle get the nearest zeros; the
    /// overall gain is folded into the first section.
    fn into_sections(self) -> Vec<BiquadCoeffs> {
        let mut pole_groups = group_roots(&self.poles);
        let mut zero_groups = group_roots(&self.zeros);

        pole_groups.sort_by(|a, b| {
            let da = (1.0 - a[0].norm()).abs();
            let db = (1.0 - b[0].norm()).abs();
            da.total_cmp(&db)
        });

        let mut sections = Vec::with_capacity(pole_groups.len());
        for poles in &pole_groups {
            let zeros = if zero_groups.is_empty() {
                Vec::new()
            } else {
                let nearest = zero_groups
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        (a[0] - poles[0]).norm().total_cmp(&(b[0] - poles[0]).norm())
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                zero_groups.swap_remove(nearest)
            };
            let [b0, b1, b2] = quadratic(&zeros);
            let [_, a1, a2] = quadratic(poles);
            sections.push(BiquadCoeffs { b0, b1, b2, a1, a2 });
        }
        // Closest-to-circle pairs run last
        sections.reverse();

        if let Some(first) = sections.first_mut() {
            first.b0 *= self.gain;
            first.b1 *= self.gain;
            first.b2 *= self.gain;
        }
        sections
    }
}

/// `r ± sqrt(r^2 - wo^2)` for every scaled root, plus-branch first
fn split_band(roots: &[Complex64], scale: impl Fn(&Complex64) -> Complex64, wo: f64) -> Vec<Complex64> {
    let scaled: Vec<Complex64> = roots.iter().map(scale).collect();
    let offsets: Vec<Complex64> = scaled.iter().map(|r| (r * r - wo * wo).sqrt()).collect();
    scaled
        .iter()
        .zip(&offsets)
        .map(|(r, d)| r + d)
        .chain(scaled.iter().zip(&offsets).map(|(r, d)| r - d))
        .collect()
}

/// Conjugate pairs become one group; real roots are paired in sorted order
fn group_roots(roots: &[Complex64]) -> Vec<Vec<Complex64>> {
    let mut groups: Vec<Vec<Complex64>> = roots
        .iter()
        .filter(|r| r.im > REAL_ROOT_TOLERANCE)
        .map(|r| vec![*r, r.conj()])
        .collect();

    let mut reals: Vec<f64> = roots
        .iter()
        .filter(|r| r.im.abs() <= REAL_ROOT_TOLERANCE)
        .map(|r| r.re)
        .collect();
    reals.sort_by(|a, b| a.total_cmp(b));
    groups.extend(
        reals
            .chunks(2)
            .map(|pair| pair.iter().map(|&re| Complex64::new(re, 0.0)).collect()),
    );
    groups
}

/// Monic polynomial coefficients `[1, c1, c2]` with the given (up to 2) roots
fn quadratic(roots: &[Complex64]) -> [f64; 3] {
    match roots {
        [] => [1.0, 0.0, 0.0],
        [r] => [1.0, -r.re, 0.0],
        [r1, r2, ..] => [1.0, -(r1 + r2).re, (r1 * r2).re],
    }
}

/// Butterworth filter designer
pub struct ButterworthFilter;

impl ButterworthFilter {
    /// Design a Butterworth lowpass filter
    pub fn lowpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        Self::design(FilterType::Lowpass, &[cutoff], sample_rate, order)
    }

    /// Design a Butterworth highpass filter
    pub fn highpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        Self::design(FilterType::Highpass, &[cutoff], sample_rate, order)
    }

    /// Design a Butterworth bandpass filter
    pub fn bandpass(low: f64, high: f64, sample_rate: f64, order: usize) -> SosFilter {
        Self::design(FilterType::Bandpass, &[low, high], sample_rate, order)
    }

    /// Design a Butterworth bandstop filter
    pub fn bandstop(low: f64, high: f64, sample_rate: f64, order: usize) -> SosFilter {
        Self::design(FilterType::Bandstop, &[low, high], sample_rate, order)
    }

    /// Design a filter of any type.
    ///
    /// Cutoffs are in Hz and are normalised by the Nyquist frequency. Callers
    /// validate that they lie strictly between 0 and Nyquist and that band
    /// filters receive an increasing pair.
    pub fn design(
        filter_type: FilterType,
        cutoff: &[f64],
        sample_rate: f64,
        order: usize,
    ) -> SosFilter {
        let nyquist = sample_rate / 2.0;
        let warped: Vec<f64> = cutoff
            .iter()
            .map(|&fc| Self::prewarp(fc / nyquist))
            .collect();

        let prototype = Zpk::prototype(order);
        let analog = match (filter_type, warped.as_slice()) {
            (FilterType::Lowpass, [wo, ..]) => prototype.into_lowpass(*wo),
            (FilterType::Highpass, [wo, ..]) => prototype.into_highpass(*wo),
            (FilterType::Bandpass, [low, high, ..]) => {
                prototype.into_bandpass((low * high).sqrt(), high - low)
            }
            (FilterType::Bandstop, [low, high, ..]) => {
                prototype.into_bandstop((low * high).sqrt(), high - low)
            }
            _ => prototype,
        };

        let sections = analog.bilinear(NORMALISED_FS).into_sections();
        log::trace!(
            "Butterworth {} order {} -> {} sections",
            filter_type.as_str(),
            order,
            sections.len()
        );
        SosFilter::new(sections)
    }

    /// Prewarp a Nyquist-normalised frequency for the bilinear transform
    fn prewarp(normalised: f64) -> f64 {
        2.0 * NORMALISED_FS * (PI * normalised / NORMALISED_FS).tan()
    }
}
