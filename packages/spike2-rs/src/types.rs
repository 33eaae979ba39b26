use crate::error::{Result, Spike2Error};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Channel type of a Spike2 export record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Event,
    Keyboard,
    Textmark,
    Waveform,
    Wavemark,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Event,
        ChannelKind::Keyboard,
        ChannelKind::Textmark,
        ChannelKind::Waveform,
        ChannelKind::Wavemark,
    ];

    /// Look up the channel type from the number of struct fields in the record.
    ///
    /// This table is what existing exports rely on; do not change it.
    pub fn from_field_count(field_count: usize) -> Option<Self> {
        match field_count {
            5 => Some(ChannelKind::Event),
            6 => Some(ChannelKind::Keyboard),
            8 => Some(ChannelKind::Textmark),
            10 => Some(ChannelKind::Waveform),
            14 => Some(ChannelKind::Wavemark),
            _ => None,
        }
    }

    pub fn field_count(&self) -> usize {
        match self {
            ChannelKind::Event => 5,
            ChannelKind::Keyboard => 6,
            ChannelKind::Textmark => 8,
            ChannelKind::Waveform => 10,
            ChannelKind::Wavemark => 14,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Event => "event",
            ChannelKind::Keyboard => "keyboard",
            ChannelKind::Textmark => "textmark",
            ChannelKind::Waveform => "waveform",
            ChannelKind::Wavemark => "wavemark",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event channel: occurrence times only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub times: Vec<f64>,
}

/// Keyboard and textmark channels: one code per mark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerPayload {
    pub times: Vec<f64>,
    pub codes: Vec<String>,
    /// Free text attached to each mark (textmark channels only)
    #[serde(default)]
    pub text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformPayload {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
    pub units: Option<String>,
    pub sampling_frequency: u32,
}

/// Wavemark channel. Every field is `None` when the channel was exported
/// without sorted units.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WavemarkPayload {
    pub units: Option<String>,
    pub times: Option<Vec<f64>>,
    pub sampling_frequency: Option<u32>,
    /// `[template_length x count]`, one captured snippet per column
    pub action_potentials: Option<Array2<f64>>,
}

impl WavemarkPayload {
    pub fn is_empty(&self) -> bool {
        self.times.is_none()
    }
}

/// Decoded contents of one export record, tagged with its channel type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ch_type", rename_all = "snake_case")]
pub enum DecodedPayload {
    Event(EventPayload),
    Keyboard(MarkerPayload),
    Textmark(MarkerPayload),
    Waveform(WaveformPayload),
    Wavemark(WavemarkPayload),
}

impl DecodedPayload {
    pub fn kind(&self) -> ChannelKind {
        match self {
            DecodedPayload::Event(_) => ChannelKind::Event,
            DecodedPayload::Keyboard(_) => ChannelKind::Keyboard,
            DecodedPayload::Textmark(_) => ChannelKind::Textmark,
            DecodedPayload::Waveform(_) => ChannelKind::Waveform,
            DecodedPayload::Wavemark(_) => ChannelKind::Wavemark,
        }
    }

    pub fn times(&self) -> &[f64] {
        match self {
            DecodedPayload::Event(p) => &p.times,
            DecodedPayload::Keyboard(p) | DecodedPayload::Textmark(p) => &p.times,
            DecodedPayload::Waveform(p) => &p.times,
            DecodedPayload::Wavemark(p) => p.times.as_deref().unwrap_or(&[]),
        }
    }
}

/// Decoded records, in the order they appear in the file
pub type DecodedRecords = Vec<(String, DecodedPayload)>;

/// Channel metadata, fixed once the channel is built
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub units: Option<String>,
    pub sampling_frequency: Option<u32>,
    pub output_directory: Option<PathBuf>,
    pub trial_name: Option<String>,
    pub subject_id: Option<String>,
}

impl ChannelInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Figure file name: `{subject_id}_{trial_name}_{channel_name}.{ext}`
    pub fn figure_file_name(&self, extension: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            self.subject_id.as_deref().unwrap_or("sub"),
            self.trial_name.as_deref().unwrap_or("trial"),
            self.name,
            extension.trim_start_matches('.')
        )
    }

    /// Full figure path under `output_directory`, if one is set
    pub fn figure_path(&self, extension: &str) -> Option<PathBuf> {
        self.output_directory
            .as_ref()
            .map(|dir| dir.join(self.figure_file_name(extension)))
    }
}

/// Trial-level metadata merged into every channel's [`ChannelInfo`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfoExtras {
    pub trial_name: Option<String>,
    pub subject_id: Option<String>,
    pub output_directory: Option<PathBuf>,
}

/// Default subject identifier
pub const DEFAULT_SUBJECT_ID: &str = "sub";

/// Trial configuration. Everything except `file` has a default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialInfo {
    /// Path to the `.mat` export
    pub file: Option<PathBuf>,
    /// Channels to load, as named in the recording; `None` loads all
    pub channels: Option<Vec<String>>,
    /// Defaults to the file stem
    pub name: Option<String>,
    /// Defaults to `"sub"`
    pub subject_id: Option<String>,
    /// Defaults to `figures/` next to the file
    pub path_save_figures: Option<PathBuf>,
    /// Defaults to `data/` next to the file
    pub path_save_trial: Option<PathBuf>,
}

impl TrialInfo {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Fill unset fields from the file path.
    ///
    /// Fails if no file is set.
    pub fn with_defaults(self) -> Result<Self> {
        let file = self.file.ok_or_else(|| {
            Spike2Error::InvalidArgument(
                "info must include a valid full path to a data file.".to_string(),
            )
        })?;
        let parent = file.parent().map(PathBuf::from).unwrap_or_default();
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("trial")
            .to_string();

        Ok(Self {
            name: Some(self.name.unwrap_or(stem)),
            subject_id: Some(
                self.subject_id
                    .unwrap_or_else(|| DEFAULT_SUBJECT_ID.to_string()),
            ),
            path_save_figures: Some(
                self.path_save_figures
                    .unwrap_or_else(|| parent.join("figures")),
            ),
            path_save_trial: Some(self.path_save_trial.unwrap_or_else(|| parent.join("data"))),
            channels: self.channels,
            file: Some(file),
        })
    }
}
