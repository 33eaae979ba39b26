pub mod info;
pub mod process;
pub mod validate;

use crate::exit_codes;
use spike2_rs::Spike2Error;

/// Exit code for a library error: problems with the input itself are input errors
pub fn exit_code_for(error: &Spike2Error) -> i32 {
    match error {
        Spike2Error::WrongFileType(_)
        | Spike2Error::FileNotFound(_)
        | Spike2Error::RecordNotFound { .. }
        | Spike2Error::InvalidArgument(_) => exit_codes::INPUT_ERROR,
        _ => exit_codes::EXECUTION_ERROR,
    }
}
