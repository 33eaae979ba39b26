pub mod channels;
pub mod decoder;
pub mod error;
pub mod mat;
mod serde_samples;
pub mod signal_processing;
pub mod trial;
pub mod types;

pub use channels::{Channel, ChannelFactory, Event, Marker, Waveform, Wavemark};
pub use decoder::{decode, decode_packed_codes, decode_record, read};
pub use error::{Result, Spike2Error};
pub use signal_processing::{FilterType, ProcessingPipeline, ProcessingRecord, ProcessingStep};
pub use trial::{load, Trial};
pub use types::*;
