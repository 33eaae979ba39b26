//! Serde adapters for sample buffers that may hold `NaN` or infinities.
//!
//! JSON has no literal for non-finite numbers and serde_json writes them as
//! `null`, which it then refuses to read back as `f64`. These adapters keep
//! finite samples as plain numbers and write the rest as the strings `"NaN"`,
//! `"inf"` and `"-inf"`, so every saved trial can be loaded again.

use ndarray::Array2;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One sample on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample(f64);

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

struct SampleVisitor;

impl<'de> Visitor<'de> for SampleVisitor {
    type Value = Sample;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Sample, E> {
        Ok(Sample(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Sample, E> {
        Ok(Sample(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Sample, E> {
        Ok(Sample(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Sample, E> {
        match v {
            "NaN" => Ok(Sample(f64::NAN)),
            "inf" => Ok(Sample(f64::INFINITY)),
            "-inf" => Ok(Sample(f64::NEG_INFINITY)),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SampleVisitor)
    }
}

fn to_samples(values: &[f64]) -> Vec<Sample> {
    values.iter().copied().map(Sample).collect()
}

fn from_samples(samples: Vec<Sample>) -> Vec<f64> {
    samples.into_iter().map(|s| s.0).collect()
}

/// `#[serde(with = "crate::serde_samples::samples")]` for `Vec<f64>`
pub mod samples {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().copied().map(Sample))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Sample>::deserialize(deserializer).map(from_samples)
    }
}

/// Same as [`samples`] for `Option<Vec<f64>>`
pub mod optional_samples {
    use super::*;

    pub fn serialize<S: Serializer>(
        values: &Option<Vec<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        values.as_deref().map(to_samples).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<f64>>, D::Error> {
        Ok(Option::<Vec<Sample>>::deserialize(deserializer)?.map(from_samples))
    }
}

/// `Option<Array2<f64>>` as `{ "dim": [rows, cols], "data": [...] }` in row-major order
pub mod optional_grid {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Grid {
        dim: [usize; 2],
        data: Vec<Sample>,
    }

    pub fn serialize<S: Serializer>(
        grid: &Option<Array2<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        grid.as_ref()
            .map(|g| Grid {
                dim: [g.nrows(), g.ncols()],
                data: g.iter().copied().map(Sample).collect(),
            })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Array2<f64>>, D::Error> {
        Option::<Grid>::deserialize(deserializer)?
            .map(|g| {
                Array2::from_shape_vec((g.dim[0], g.dim[1]), from_samples(g.data))
                    .map_err(de::Error::custom)
            })
            .transpose()
    }
}
