//! Record decoding
//!
//! Turns the top-level structs of a Spike2 MATLAB export into typed
//! [`DecodedPayload`]s. The channel type of a record is not stored anywhere
//! in the export; it is recovered from the number of struct fields
//! (see [`ChannelKind::from_field_count`]).

use crate::error::{Result, Spike2Error};
use crate::mat::{MatFile, MatValue, NumericArray, StructArray};
use crate::types::{
    ChannelKind, DecodedPayload, DecodedRecords, EventPayload, MarkerPayload, WaveformPayload,
    WavemarkPayload,
};
use ndarray::Array2;
use std::path::Path;

/// One top-level entry of the export, discarded after decoding
pub type RawRecord = MatValue;

/// Entries with this prefix are MATLAB metadata, not channels
pub const RESERVED_PREFIX: &str = "__";

/// Bytes per packed keyboard/textmark code cell
const CODE_CELL_BYTES: usize = 4;

/// Read a Spike2 `.mat` export and decode the requested channels.
///
/// # Arguments
/// * `path` - Path to the exported `.mat` file
/// * `channels` - Channel names as they appeared in the original recording;
///   `None` decodes every non-reserved entry
///
/// # Returns
/// Decoded payloads in file order
pub fn read<P: AsRef<Path>>(path: P, channels: Option<&[String]>) -> Result<DecodedRecords> {
    let path = path.as_ref();
    check_file_type(path)?;

    log::info!("Reading Spike2 export: {}", path.display());
    let mat = MatFile::open(path)?;
    let records = select_records(mat, channels)?;
    let decoded = decode(records)?;

    log::info!(
        "Decoded {} channels from {}",
        decoded.len(),
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    );
    Ok(decoded)
}

/// Only MATLAB exports are accepted
pub fn check_file_type(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mat") => Ok(()),
        Some(ext) => Err(Spike2Error::WrongFileType(format!(
            "Processing .{} files is not supported.",
            ext
        ))),
        None => Err(Spike2Error::WrongFileType(
            "Processing files without an extension is not supported.".to_string(),
        )),
    }
}

/// Names of all channel entries in the file, in file order
pub fn channel_names(mat: &MatFile) -> Vec<String> {
    mat.names()
        .filter(|name| !name.starts_with(RESERVED_PREFIX))
        .map(str::to_string)
        .collect()
}

/// Pick the requested records out of a parsed file.
///
/// Every requested name must exist; the error lists what the file does contain.
pub fn select_records(
    mat: MatFile,
    channels: Option<&[String]>,
) -> Result<Vec<(String, RawRecord)>> {
    let available = channel_names(&mat);

    if let Some(requested) = channels {
        if let Some(missing) = requested.iter().find(|name| !available.contains(name)) {
            return Err(Spike2Error::RecordNotFound {
                requested: missing.clone(),
                available,
            });
        }
    }

    let selected = mat
        .into_variables()
        .into_iter()
        .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
        .filter(|(name, _)| channels.map_or(true, |requested| requested.contains(name)))
        .filter(|(name, value)| {
            let skip = channels.is_none() && matches!(value, MatValue::Unsupported(_));
            if skip {
                log::warn!("Skipping '{}': unsupported array class", name);
            }
            !skip
        })
        .collect();
    Ok(selected)
}

/// Decode a batch of records.
///
/// A record with an unknown shape aborts the whole batch so that the same
/// file always yields either every requested channel or an error.
pub fn decode<I>(records: I) -> Result<DecodedRecords>
where
    I: IntoIterator<Item = (String, RawRecord)>,
{
    records
        .into_iter()
        .map(|(name, record)| {
            let payload = decode_record(&name, &record)?;
            Ok((name, payload))
        })
        .collect()
}

/// Classify a record by its field count and decode it
pub fn decode_record(name: &str, record: &RawRecord) -> Result<DecodedPayload> {
    let fields = match record {
        MatValue::Struct(fields) => fields,
        MatValue::Unsupported(class) => {
            return Err(Spike2Error::ParseError(format!(
                "'{}' is a {:?} array, which cannot be decoded",
                name, class
            )))
        }
        _ => {
            return Err(Spike2Error::UnrecognizedRecordShape {
                name: name.to_string(),
                field_count: 0,
            })
        }
    };

    let kind = ChannelKind::from_field_count(fields.field_count()).ok_or_else(|| {
        Spike2Error::UnrecognizedRecordShape {
            name: name.to_string(),
            field_count: fields.field_count(),
        }
    })?;
    log::debug!("Record '{}': {} fields -> {}", name, fields.field_count(), kind);

    let record = FieldReader { name, fields };
    let payload = match kind {
        ChannelKind::Event => DecodedPayload::Event(decode_event(&record)?),
        ChannelKind::Keyboard => DecodedPayload::Keyboard(decode_marker(&record, false)?),
        ChannelKind::Textmark => DecodedPayload::Textmark(decode_marker(&record, true)?),
        ChannelKind::Waveform => DecodedPayload::Waveform(decode_waveform(&record)?),
        ChannelKind::Wavemark => DecodedPayload::Wavemark(decode_wavemark(&record)?),
    };
    Ok(payload)
}

/// Decode packed character codes.
///
/// Each mark is a 4 byte little-endian cell whose low byte is the character.
pub fn decode_packed_codes(packed: &[u8]) -> Vec<String> {
    packed
        .iter()
        .step_by(CODE_CELL_BYTES)
        .map(|&byte| char::from(byte).to_string())
        .collect()
}

fn decode_event(record: &FieldReader<'_>) -> Result<EventPayload> {
    Ok(EventPayload {
        times: record.flat("times")?,
    })
}

fn decode_marker(record: &FieldReader<'_>, with_text: bool) -> Result<MarkerPayload> {
    let times = record.flat("times")?;
    let packed = record.numeric("codes")?.packed_bytes();
    let codes = decode_packed_codes(&packed);

    let text = if with_text {
        match record.fields.field("text") {
            Some(MatValue::Char(chars)) => chars
                .rows()
                .into_iter()
                .map(|row| row.trim_end_matches(['\0', ' ']).to_string())
                .collect(),
            _ => Vec::new(),
        }
    } else {
        Vec::new()
    };

    Ok(MarkerPayload { times, codes, text })
}

fn decode_waveform(record: &FieldReader<'_>) -> Result<WaveformPayload> {
    let mut times = record.flat("times")?;
    let mut values = record.flat("values")?;
    let units = record.units()?;
    let sampling_frequency = record.sampling_frequency()?;

    // Spike2 occasionally exports one more time stamp than samples (or vice versa)
    if times.len() != values.len() {
        let shortest = times.len().min(values.len());
        log::warn!(
            "Waveform '{}': {} times vs {} values, truncating to {}",
            record.name,
            times.len(),
            values.len(),
            shortest
        );
        times.truncate(shortest);
        values.truncate(shortest);
    }

    Ok(WaveformPayload {
        times,
        values,
        units,
        sampling_frequency,
    })
}

fn decode_wavemark(record: &FieldReader<'_>) -> Result<WavemarkPayload> {
    let units = match record.units()? {
        Some(units) => units,
        None => {
            log::debug!("Wavemark '{}' has no sorted units", record.name);
            return Ok(WavemarkPayload::default());
        }
    };

    let times = record.flat("times")?;
    let sampling_frequency = record.sampling_frequency()?;
    let action_potentials = reshape_wavemarks(record, times.len())?;

    Ok(WavemarkPayload {
        units: Some(units),
        times: Some(times),
        sampling_frequency: Some(sampling_frequency),
        action_potentials: Some(action_potentials),
    })
}

/// Split the concatenated snippet buffer into a `[template_length x count]` grid
fn reshape_wavemarks(record: &FieldReader<'_>, num_times: usize) -> Result<Array2<f64>> {
    let length = record.scalar("length")?;
    let concatenated = record.flat("values")?;

    if length.fract() != 0.0 || length < 0.0 {
        return Err(Spike2Error::MalformedWavemarkBlock(format!(
            "'{}': template length {} is not a whole number",
            record.name, length
        )));
    }
    let template_length = length as usize;
    if template_length == 0 {
        if concatenated.is_empty() && num_times == 0 {
            return Ok(Array2::zeros((0, 0)));
        }
        return Err(Spike2Error::MalformedWavemarkBlock(format!(
            "'{}': template length is 0 but {} values are present",
            record.name,
            concatenated.len()
        )));
    }
    if concatenated.len() % template_length != 0 {
        return Err(Spike2Error::MalformedWavemarkBlock(format!(
            "'{}': {} values do not divide into templates of length {}",
            record.name,
            concatenated.len(),
            template_length
        )));
    }

    let count = concatenated.len() / template_length;
    if count != num_times {
        return Err(Spike2Error::MalformedWavemarkBlock(format!(
            "'{}': {} captured waveforms but {} discharge times",
            record.name, count, num_times
        )));
    }

    Array2::from_shape_vec((template_length, count), concatenated)
        .map_err(|e| Spike2Error::MalformedWavemarkBlock(format!("'{}': {}", record.name, e)))
}

/// Named-field access on a record with diagnostics that include the record name
struct FieldReader<'a> {
    name: &'a str,
    fields: &'a StructArray,
}

impl<'a> FieldReader<'a> {
    fn get(&self, field: &str) -> Result<&'a MatValue> {
        self.fields.field(field).ok_or_else(|| {
            Spike2Error::MalformedRecord(format!(
                "'{}' has no '{}' field (fields: {})",
                self.name,
                field,
                self.fields.field_names.join(", ")
            ))
        })
    }

    fn numeric(&self, field: &str) -> Result<&'a NumericArray> {
        let value = self.get(field)?;
        value.as_numeric().ok_or_else(|| {
            Spike2Error::MalformedRecord(format!(
                "'{}'.{} is a {} array, expected numeric",
                self.name,
                field,
                value.class_name()
            ))
        })
    }

    fn flat(&self, field: &str) -> Result<Vec<f64>> {
        Ok(self.numeric(field)?.flatten())
    }

    fn scalar(&self, field: &str) -> Result<f64> {
        self.numeric(field)?.scalar().ok_or_else(|| {
            Spike2Error::MalformedRecord(format!("'{}'.{} is empty", self.name, field))
        })
    }

    /// First entry of the `units` field, `None` when it is empty
    fn units(&self) -> Result<Option<String>> {
        match self.get("units")? {
            MatValue::Char(chars) => Ok(chars.rows().into_iter().next()),
            MatValue::Cell(cells) => Ok(cells
                .cells
                .first()
                .and_then(MatValue::as_char)
                .and_then(|chars| chars.rows().into_iter().next())),
            other if other.is_empty() => Ok(None),
            other => Err(Spike2Error::MalformedRecord(format!(
                "'{}'.units is a {} array, expected char",
                self.name,
                other.class_name()
            ))),
        }
    }

    fn sampling_frequency(&self) -> Result<u32> {
        let interval = self.scalar("interval")?;
        if !(interval.is_finite() && interval > 0.0) {
            return Err(Spike2Error::MalformedRecord(format!(
                "'{}' has invalid sample interval {}",
                self.name, interval
            )));
        }
        Ok((1.0 / interval).round() as u32)
    }
}
