use thiserror::Error;

#[derive(Error, Debug)]
pub enum Spike2Error {
    #[error("{0}\nIn Spike2 export the data to .mat and start over.")]
    WrongFileType(String),

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error(
        "Channel '{requested}' does not exist in the file. Available channels: {}",
        available.join(", ")
    )]
    RecordNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error(
        "Record '{name}' has {field_count} fields, which matches no known channel type \
         (expected 5, 6, 8, 10 or 14)"
    )]
    UnrecognizedRecordShape { name: String, field_count: usize },

    #[error("Malformed wavemark block: {0}")]
    MalformedWavemarkBlock(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Failed to parse MAT container: {0}")]
    ParseError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Spike2Error>;
