//! Test-only writer for Level-5 MAT files shaped like Spike2 exports
#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const CLASS_STRUCT: u32 = 2;
const CLASS_CHAR: u32 = 4;
const CLASS_DOUBLE: u32 = 6;
const CLASS_UINT8: u32 = 9;

const FIELD_NAME_LEN: usize = 32;

/// A MATLAB array; numeric data is given in column-major order
#[derive(Debug, Clone)]
pub enum Value {
    Double { dims: Vec<usize>, data: Vec<f64> },
    UInt8 { dims: Vec<usize>, data: Vec<u8> },
    Text(String),
    Struct(Vec<(String, Value)>),
}

pub fn column(data: &[f64]) -> Value {
    Value::Double {
        dims: vec![data.len(), 1],
        data: data.to_vec(),
    }
}

pub fn scalar(value: f64) -> Value {
    column(&[value])
}

pub fn empty() -> Value {
    Value::Double {
        dims: vec![0, 0],
        data: Vec::new(),
    }
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// Keyboard/textmark codes: one row of 4 bytes per mark, character in the low byte
pub fn codes(chars: &str) -> Value {
    let rows = chars.len();
    let mut data = vec![0u8; rows * 4];
    for (row, byte) in chars.bytes().enumerate() {
        data[row] = byte;
    }
    Value::UInt8 {
        dims: vec![rows, 4],
        data,
    }
}

fn record(fields: Vec<(&str, Value)>) -> Value {
    Value::Struct(
        fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

pub fn event_record(times: &[f64]) -> Value {
    record(vec![
        ("title", text("Trig")),
        ("comment", text("No comment")),
        ("resolution", scalar(1e-5)),
        ("length", scalar(times.len() as f64)),
        ("times", column(times)),
    ])
}

pub fn keyboard_record(times: &[f64], chars: &str) -> Value {
    record(vec![
        ("title", text("Keyboard")),
        ("comment", text("")),
        ("resolution", scalar(1e-5)),
        ("length", scalar(times.len() as f64)),
        ("times", column(times)),
        ("codes", if chars.is_empty() { empty() } else { codes(chars) }),
    ])
}

pub fn textmark_record(times: &[f64], chars: &str) -> Value {
    record(vec![
        ("title", text("Memory")),
        ("comment", text("")),
        ("resolution", scalar(1e-5)),
        ("length", scalar(times.len() as f64)),
        ("items", scalar(10.0)),
        ("times", column(times)),
        ("codes", codes(chars)),
        ("text", text("")),
    ])
}

pub fn waveform_record(times: &[f64], values: &[f64], interval: f64, units: &str) -> Value {
    record(vec![
        ("title", text("EMG")),
        ("comment", text("")),
        ("interval", scalar(interval)),
        ("scale", scalar(1.0)),
        ("offset", scalar(0.0)),
        ("units", text(units)),
        ("start", scalar(times.first().copied().unwrap_or(0.0))),
        ("length", scalar(values.len() as f64)),
        ("values", column(values)),
        ("times", column(times)),
    ])
}

pub fn wavemark_record(times: &[f64], values: &[f64], length: usize, units: &str) -> Value {
    record(vec![
        ("title", text("MU1")),
        ("comment", text("")),
        ("interval", scalar(4e-5)),
        ("scale", scalar(1.0)),
        ("offset", scalar(0.0)),
        ("units", text(units)),
        ("resolution", scalar(1e-5)),
        ("length", scalar(length as f64)),
        ("items", scalar(1.0)),
        ("trace", scalar(0.0)),
        ("times", column(times)),
        ("codes", codes(&"\u{1}".repeat(times.len()))),
        ("values", column(values)),
        ("traces", scalar(1.0)),
    ])
}

/// Sampled waveform with `n` samples at `fs` Hz
pub fn sampled(n: usize, fs: f64, signal: impl Fn(f64) -> f64) -> (Vec<f64>, Vec<f64>) {
    let times: Vec<f64> = (0..n).map(|i| i as f64 / fs).collect();
    let values = times.iter().map(|&t| signal(t)).collect();
    (times, values)
}

#[derive(Debug, Default)]
pub struct MatWriter {
    variables: Vec<(String, Value)>,
    compress: bool,
}

impl MatWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every variable as an `miCOMPRESSED` element
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn add(mut self, name: &str, value: Value) -> Self {
        self.variables.push((name.to_string(), value));
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut text = b"MATLAB 5.0 MAT-file, written by spike2-rs tests".to_vec();
        text.resize(116, b' ');
        out.extend_from_slice(&text);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&0x0100u16.to_le_bytes());
        out.extend_from_slice(b"IM");

        for (name, value) in &self.variables {
            let matrix = matrix(name, value);
            if self.compress {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&matrix).unwrap();
                let deflated = encoder.finish().unwrap();
                out.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
                out.extend_from_slice(&(deflated.len() as u32).to_le_bytes());
                out.extend_from_slice(&deflated);
            } else {
                out.extend_from_slice(&matrix);
            }
        }
        out
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        std::fs::write(path, self.to_bytes()).unwrap();
        path.to_path_buf()
    }
}

fn element(data_type: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + data.len() + 7);
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

fn header(class: u32, dims: &[usize], name: &str) -> Vec<u8> {
    let mut flags = Vec::new();
    flags.extend_from_slice(&class.to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());

    let dims: Vec<u8> = dims
        .iter()
        .flat_map(|&d| (d as i32).to_le_bytes())
        .collect();

    let mut out = element(MI_UINT32, &flags);
    out.extend(element(MI_INT32, &dims));
    out.extend(element(MI_INT8, name.as_bytes()));
    out
}

fn matrix(name: &str, value: &Value) -> Vec<u8> {
    let body = match value {
        Value::Double { dims, data } => {
            let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            let mut body = header(CLASS_DOUBLE, dims, name);
            body.extend(element(MI_DOUBLE, &bytes));
            body
        }
        Value::UInt8 { dims, data } => {
            let mut body = header(CLASS_UINT8, dims, name);
            body.extend(element(MI_UINT8, data));
            body
        }
        Value::Text(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let dims = if units.is_empty() {
                vec![0, 0]
            } else {
                vec![1, units.len()]
            };
            let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
            let mut body = header(CLASS_CHAR, &dims, name);
            body.extend(element(MI_UINT16, &bytes));
            body
        }
        Value::Struct(fields) => {
            let mut body = header(CLASS_STRUCT, &[1, 1], name);
            body.extend(element(MI_INT32, &(FIELD_NAME_LEN as i32).to_le_bytes()));
            let mut names = Vec::with_capacity(fields.len() * FIELD_NAME_LEN);
            for (field, _) in fields {
                let mut padded = field.as_bytes().to_vec();
                padded.resize(FIELD_NAME_LEN, 0);
                names.extend(padded);
            }
            body.extend(element(MI_INT8, &names));
            for (_, value) in fields {
                body.extend(matrix("", value));
            }
            body
        }
    };
    element(MI_MATRIX, &body)
}
