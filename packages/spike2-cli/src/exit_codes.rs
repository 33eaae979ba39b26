//! Process exit codes shared by all sub-commands

pub const SUCCESS: i32 = 0;
/// The input was readable but processing it failed
pub const EXECUTION_ERROR: i32 = 1;
/// Missing, unreadable or unsupported input, or invalid arguments
pub const INPUT_ERROR: i32 = 2;
