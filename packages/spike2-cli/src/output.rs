use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Write a JSON document to stdout, or to `output_path` (parent directories
/// are created as needed).
pub fn write_output(json: &str, output_path: Option<&Path>) -> Result<(), String> {
    match output_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| {
                    format!("Failed to create output directory '{}': {}", dir.display(), e)
                })?;
            }
            std::fs::write(path, json)
                .map_err(|e| format!("Failed to write output file '{}': {}", path.display(), e))
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: Serialize>(value: &T, compact: bool) -> Result<String, String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.map_err(|e| format!("JSON serialization failed: {}", e))
}

/// Serialize and write in one step, reporting failures on stderr.
///
/// Returns `false` if nothing was written.
pub fn emit<T: Serialize>(value: &T, output_path: Option<&Path>, compact: bool) -> bool {
    match to_json(value, compact).and_then(|json| write_output(&json, output_path)) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}
