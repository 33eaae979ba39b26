//! Trial aggregation and persistence
//!
//! A [`Trial`] decodes one export, builds every channel with the trial's
//! metadata attached and keeps the channels in file order. Trials are saved
//! as JSON snapshots under `path_save_trial` and restored with [`load`].

use crate::channels::{Channel, ChannelFactory, Waveform};
use crate::decoder;
use crate::error::{Result, Spike2Error};
use crate::types::{ChannelKind, InfoExtras, TrialInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of saved trial snapshots
pub const TRIAL_FILE_EXTENSION: &str = "json";

/// One recorded trial and its channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    info: TrialInfo,
    channels: Vec<Channel>,
    /// Set by [`Trial::save`]
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

impl Trial {
    /// Read the trial's export and build its channels
    pub fn new(info: TrialInfo) -> Result<Self> {
        let info = info.with_defaults()?;
        let file = info.file.clone().unwrap_or_default();

        let decoded = decoder::read(&file, info.channels.as_deref())?;
        let extras = InfoExtras {
            trial_name: info.name.clone(),
            subject_id: info.subject_id.clone(),
            output_directory: info.path_save_figures.clone(),
        };
        let channels = decoded
            .into_iter()
            .map(|(name, payload)| ChannelFactory::from_decoded(&name, payload, &extras))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Trial '{}' ({}): {} channels",
            info.name.as_deref().unwrap_or_default(),
            file.display(),
            channels.len()
        );
        Ok(Self {
            info,
            channels,
            saved_at: None,
        })
    }

    pub fn info(&self) -> &TrialInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.info.name.as_deref().unwrap_or_default()
    }

    pub fn subject_id(&self) -> &str {
        self.info.subject_id.as_deref().unwrap_or_default()
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.saved_at
    }

    /// `(name, kind)` for every channel, in file order
    pub fn channels(&self) -> Vec<(&str, ChannelKind)> {
        self.channels.iter().map(|c| (c.name(), c.kind())).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.name() == name)
    }

    /// Waveform channel `name`, ready for processing
    pub fn waveform_mut(&mut self, name: &str) -> Result<&mut Waveform> {
        let available: Vec<String> = self.channels.iter().map(|c| c.name().to_string()).collect();
        let channel = self
            .channel_mut(name)
            .ok_or_else(|| Spike2Error::RecordNotFound {
                requested: name.to_string(),
                available,
            })?;
        let kind = channel.kind();
        channel.as_waveform_mut().ok_or_else(|| {
            Spike2Error::InvalidArgument(format!(
                "Channel '{}' is a {} channel, not a waveform",
                name, kind
            ))
        })
    }

    /// Where [`Trial::save`] writes this trial
    pub fn save_path(&self) -> PathBuf {
        let dir = self.info.path_save_trial.clone().unwrap_or_default();
        dir.join(format!("{}.{}", self.name(), TRIAL_FILE_EXTENSION))
    }

    /// Save a JSON snapshot to `<path_save_trial>/<name>.json`, creating the
    /// directory if needed. Returns the written path.
    pub fn save(&mut self) -> Result<PathBuf> {
        let path = self.save_path();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        self.saved_at = Some(Utc::now());
        let json = serde_json::to_string(self)?;
        fs::write(&path, json)?;
        log::info!("Saved trial '{}' to {}", self.name(), path.display());
        Ok(path)
    }
}

impl fmt::Display for Trial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt_path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        writeln!(f, "{}", self.name())?;
        writeln!(f, "\tfile = {}", opt_path(&self.info.file))?;
        writeln!(f, "\tsubject_id = {}", self.subject_id())?;
        writeln!(f, "\tpath_save_figures = {}", opt_path(&self.info.path_save_figures))?;
        writeln!(f, "\tpath_save_trial = {}", opt_path(&self.info.path_save_trial))?;
        write!(f, "\tchannels")?;
        for (name, kind) in self.channels() {
            write!(f, "\n\t\t{} ({})", name, kind)?;
        }
        Ok(())
    }
}

/// Load a trial saved with [`Trial::save`]
pub fn load<P: AsRef<Path>>(path: P) -> Result<Trial> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Spike2Error::FileNotFound(path.display().to_string()));
    }
    let contents = fs::read_to_string(path)?;
    let trial: Trial = serde_json::from_str(&contents)?;
    log::info!("Loaded trial '{}' from {}", trial.name(), path.display());
    Ok(trial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_file() {
        assert!(matches!(
            Trial::new(TrialInfo::default()),
            Err(Spike2Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_rejects_non_mat_file() {
        assert!(matches!(
            Trial::new(TrialInfo::new("/tmp/trial.smr")),
            Err(Spike2Error::WrongFileType(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load("/definitely/not/here.json"),
            Err(Spike2Error::FileNotFound(_))
        ));
    }
}
