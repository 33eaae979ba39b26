use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use spike2_rs::decoder;
use spike2_rs::mat::MatFile;
use spike2_rs::Spike2Error;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    supported: bool,
    size_bytes: Option<u64>,
    channels: Option<usize>,
    error: Option<String>,
}

/// Parse and decode every channel, returning the channel count
fn check_export(path: &std::path::Path) -> Result<usize, Spike2Error> {
    let mat = MatFile::open(path)?;
    let records = decoder::select_records(mat, None)?;
    Ok(decoder::decode(records)?.len())
}

pub fn execute(args: ValidateArgs) -> i32 {
    let path = args.file.as_path();
    let exists = path.is_file();
    let supported = decoder::check_file_type(path).is_ok();
    let size_bytes = std::fs::metadata(path).ok().map(|m| m.len());

    let (channels, error) = if !exists {
        (None, Some(format!("File not found: {}", path.display())))
    } else if let Err(e) = decoder::check_file_type(path) {
        (None, Some(e.to_string()))
    } else {
        match check_export(path) {
            Ok(count) => (Some(count), None),
            Err(e) => (None, Some(e.to_string())),
        }
    };

    let result = ValidateOutput {
        file: path.display().to_string(),
        exists,
        supported,
        size_bytes,
        channels,
        error: error.clone(),
    };

    if args.json {
        if !output::emit(&result, None, false) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else if let Some(ref err) = error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "File '{}' is a valid Spike2 export ({} channels, {} bytes)",
            result.file,
            channels.unwrap_or(0),
            size_bytes.unwrap_or(0)
        );
    }

    if error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
