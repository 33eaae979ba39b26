//! Typed channels built from decoded payloads
//!
//! [`ChannelFactory`] merges a [`DecodedPayload`] with trial metadata into a
//! [`Channel`]. Only [`Waveform`] channels carry a mutable sample buffer; the
//! processing operations live in [`crate::signal_processing`].

use crate::error::{Result, Spike2Error};
use crate::signal_processing::ProcessingRecord;
use crate::types::{
    ChannelInfo, ChannelKind, DecodedPayload, EventPayload, InfoExtras, MarkerPayload,
    WaveformPayload, WavemarkPayload,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Event channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub info: ChannelInfo,
    #[serde(with = "crate::serde_samples::samples")]
    pub times: Vec<f64>,
}

/// Keyboard or textmark channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub info: ChannelInfo,
    #[serde(with = "crate::serde_samples::samples")]
    pub times: Vec<f64>,
    pub codes: Vec<String>,
    #[serde(default)]
    pub text: Vec<String>,
}

/// Sampled waveform channel.
///
/// `values` and `times` change with every processing call; `raw_values` is
/// the signal as decoded and is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub(crate) info: ChannelInfo,
    #[serde(with = "crate::serde_samples::samples")]
    pub(crate) times: Vec<f64>,
    #[serde(with = "crate::serde_samples::samples")]
    pub(crate) values: Vec<f64>,
    #[serde(with = "crate::serde_samples::samples")]
    raw_values: Vec<f64>,
    /// Time axis before the most recent interpolation
    #[serde(default, with = "crate::serde_samples::optional_samples")]
    pub(crate) times_pre_interp: Option<Vec<f64>>,
    #[serde(default)]
    pub(crate) provenance: Vec<ProcessingRecord>,
}

impl Waveform {
    pub fn new(info: ChannelInfo, times: Vec<f64>, values: Vec<f64>) -> Self {
        Self {
            info,
            times,
            raw_values: values.clone(),
            values,
            times_pre_interp: None,
            provenance: Vec::new(),
        }
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn raw_values(&self) -> &[f64] {
        &self.raw_values
    }

    pub fn times_pre_interp(&self) -> Option<&[f64]> {
        self.times_pre_interp.as_deref()
    }

    /// Operations applied so far, oldest first
    pub fn provenance(&self) -> &[ProcessingRecord] {
        &self.provenance
    }

    /// Marker of the most recent operation, e.g. `filt_5_lowpass`
    pub fn last_operation(&self) -> Option<&str> {
        self.provenance.last().map(|r| r.marker.as_str())
    }

    pub fn sampling_frequency(&self) -> Option<u32> {
        self.info.sampling_frequency
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Spike-sorted wavemark channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wavemark {
    pub info: ChannelInfo,
    #[serde(with = "crate::serde_samples::samples")]
    pub times: Vec<f64>,
    /// `[template_length x count]`, one captured snippet per column
    #[serde(with = "crate::serde_samples::optional_grid")]
    pub action_potentials: Option<Array2<f64>>,
    pub template_length: Option<usize>,
    /// `1 / (times[i+1] - times[i])`, one entry fewer than `times`
    #[serde(with = "crate::serde_samples::samples")]
    pub instantaneous_firing_frequency: Vec<f64>,
}

impl Wavemark {
    /// `false` when the channel was exported without sorted units
    pub fn has_units(&self) -> bool {
        self.action_potentials.is_some()
    }
}

/// A channel of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ch_type", rename_all = "snake_case")]
pub enum Channel {
    Event(Event),
    Keyboard(Marker),
    Textmark(Marker),
    Waveform(Waveform),
    Wavemark(Wavemark),
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Event(_) => ChannelKind::Event,
            Channel::Keyboard(_) => ChannelKind::Keyboard,
            Channel::Textmark(_) => ChannelKind::Textmark,
            Channel::Waveform(_) => ChannelKind::Waveform,
            Channel::Wavemark(_) => ChannelKind::Wavemark,
        }
    }

    pub fn info(&self) -> &ChannelInfo {
        match self {
            Channel::Event(c) => &c.info,
            Channel::Keyboard(c) | Channel::Textmark(c) => &c.info,
            Channel::Waveform(c) => &c.info,
            Channel::Wavemark(c) => &c.info,
        }
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn times(&self) -> &[f64] {
        match self {
            Channel::Event(c) => &c.times,
            Channel::Keyboard(c) | Channel::Textmark(c) => &c.times,
            Channel::Waveform(c) => &c.times,
            Channel::Wavemark(c) => &c.times,
        }
    }

    pub fn as_waveform(&self) -> Option<&Waveform> {
        match self {
            Channel::Waveform(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_waveform_mut(&mut self) -> Option<&mut Waveform> {
        match self {
            Channel::Waveform(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_wavemark(&self) -> Option<&Wavemark> {
        match self {
            Channel::Wavemark(w) => Some(w),
            _ => None,
        }
    }
}

/// Builds [`Channel`]s from decoded payloads
pub struct ChannelFactory;

impl ChannelFactory {
    /// Build a channel of `kind` named `name`.
    ///
    /// Fails with `InvalidArgument` if `payload` was decoded as a different kind.
    pub fn build(
        kind: ChannelKind,
        name: &str,
        payload: DecodedPayload,
        extras: &InfoExtras,
    ) -> Result<Channel> {
        if payload.kind() != kind {
            return Err(Spike2Error::InvalidArgument(format!(
                "Channel '{}' was requested as {} but decoded as {}",
                name,
                kind,
                payload.kind()
            )));
        }

        let info = Self::base_info(name, extras);
        let channel = match payload {
            DecodedPayload::Event(p) => Channel::Event(Self::event(info, p)),
            DecodedPayload::Keyboard(p) => Channel::Keyboard(Self::marker(info, p)),
            DecodedPayload::Textmark(p) => Channel::Textmark(Self::marker(info, p)),
            DecodedPayload::Waveform(p) => Channel::Waveform(Self::waveform(info, p)),
            DecodedPayload::Wavemark(p) => Channel::Wavemark(Self::wavemark(info, p)),
        };
        log::debug!("Built {} channel '{}'", kind, name);
        Ok(channel)
    }

    /// Build a channel using the kind the payload was decoded as
    pub fn from_decoded(name: &str, payload: DecodedPayload, extras: &InfoExtras) -> Result<Channel> {
        Self::build(payload.kind(), name, payload, extras)
    }

    fn base_info(name: &str, extras: &InfoExtras) -> ChannelInfo {
        ChannelInfo {
            name: name.to_string(),
            trial_name: extras.trial_name.clone(),
            subject_id: extras.subject_id.clone(),
            output_directory: extras.output_directory.clone(),
            ..Default::default()
        }
    }

    fn event(info: ChannelInfo, payload: EventPayload) -> Event {
        Event {
            info,
            times: payload.times,
        }
    }

    fn marker(info: ChannelInfo, payload: MarkerPayload) -> Marker {
        Marker {
            info,
            times: payload.times,
            codes: payload.codes,
            text: payload.text,
        }
    }

    fn waveform(mut info: ChannelInfo, payload: WaveformPayload) -> Waveform {
        info.units = payload.units;
        info.sampling_frequency = Some(payload.sampling_frequency);
        Waveform::new(info, payload.times, payload.values)
    }

    fn wavemark(mut info: ChannelInfo, payload: WavemarkPayload) -> Wavemark {
        info.units = payload.units;
        info.sampling_frequency = payload.sampling_frequency;
        let times = payload.times.unwrap_or_default();
        let instantaneous_firing_frequency = instantaneous_firing_frequency(&times);
        Wavemark {
            info,
            template_length: payload.action_potentials.as_ref().map(|ap| ap.nrows()),
            action_potentials: payload.action_potentials,
            times,
            instantaneous_firing_frequency,
        }
    }
}

/// Reciprocal of successive inter-discharge intervals.
///
/// Fewer than two discharges give an empty sequence.
pub fn instantaneous_firing_frequency(times: &[f64]) -> Vec<f64> {
    times.windows(2).map(|w| 1.0 / (w[1] - w[0])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn extras() -> InfoExtras {
        InfoExtras {
            trial_name: Some("trial1".to_string()),
            subject_id: Some("S01".to_string()),
            output_directory: Some(PathBuf::from("/tmp/figures")),
        }
    }

    #[test]
    fn test_firing_frequency() {
        assert_eq!(instantaneous_firing_frequency(&[1.0, 1.5, 2.0]), vec![2.0, 2.0]);
        assert!(instantaneous_firing_frequency(&[1.0]).is_empty());
        assert!(instantaneous_firing_frequency(&[]).is_empty());
    }

    #[test]
    fn test_build_waveform_snapshots_raw_values() {
        let payload = DecodedPayload::Waveform(WaveformPayload {
            times: vec![0.0, 0.001, 0.002],
            values: vec![1.0, -2.0, 3.0],
            units: Some("V".to_string()),
            sampling_frequency: 1000,
        });
        let channel = ChannelFactory::build(ChannelKind::Waveform, "EMG", payload, &extras()).unwrap();
        let wf = channel.as_waveform().unwrap();
        assert_eq!(wf.values(), wf.raw_values());
        assert_eq!(wf.info().units.as_deref(), Some("V"));
        assert_eq!(wf.sampling_frequency(), Some(1000));
        assert_eq!(wf.info().trial_name.as_deref(), Some("trial1"));
        assert!(wf.provenance().is_empty());
        assert_eq!(channel.info().figure_file_name("png"), "S01_trial1_EMG.png");
    }

    #[test]
    fn test_build_wavemark() {
        let grid = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let payload = DecodedPayload::Wavemark(WavemarkPayload {
            units: Some("V".to_string()),
            times: Some(vec![1.0, 1.5, 2.0]),
            sampling_frequency: Some(25000),
            action_potentials: Some(grid),
        });
        let channel = ChannelFactory::from_decoded("MU1", payload, &extras()).unwrap();
        let wm = channel.as_wavemark().unwrap();
        assert!(wm.has_units());
        assert_eq!(wm.template_length, Some(2));
        assert_eq!(wm.instantaneous_firing_frequency, vec![2.0, 2.0]);
        assert_eq!(channel.kind(), ChannelKind::Wavemark);
    }

    #[test]
    fn test_build_empty_wavemark() {
        let payload = DecodedPayload::Wavemark(WavemarkPayload::default());
        let channel = ChannelFactory::from_decoded("MU2", payload, &InfoExtras::default()).unwrap();
        let wm = channel.as_wavemark().unwrap();
        assert!(!wm.has_units());
        assert!(wm.times.is_empty());
        assert!(wm.instantaneous_firing_frequency.is_empty());
        assert_eq!(wm.template_length, None);
    }

    #[test]
    fn test_build_rejects_kind_mismatch() {
        let payload = DecodedPayload::Event(EventPayload { times: vec![1.0] });
        let result = ChannelFactory::build(ChannelKind::Keyboard, "Trig", payload, &extras());
        assert!(matches!(result, Err(Spike2Error::InvalidArgument(_))));
    }

    #[test]
    fn test_marker_channels_keep_codes() {
        let payload = DecodedPayload::Keyboard(MarkerPayload {
            times: vec![13.3],
            codes: vec!["J".to_string()],
            text: Vec::new(),
        });
        let channel = ChannelFactory::from_decoded("Keyboard", payload, &extras()).unwrap();
        match channel {
            Channel::Keyboard(ref m) => assert_eq!(m.codes, vec!["J".to_string()]),
            ref other => panic!("unexpected channel {:?}", other),
        }
        assert_eq!(channel.times(), &[13.3]);
        assert!(channel.as_waveform().is_none());
    }
}
