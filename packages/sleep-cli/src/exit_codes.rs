pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
/// Some records were skipped
pub const PARTIAL_FAILURE: i32 = 3;

/// Configuration problems are the caller's input; everything else is an execution failure
pub fn for_error(error: &sleep_rs::SleepError) -> i32 {
    match error {
        sleep_rs::SleepError::InvalidConfig(_) => INPUT_ERROR,
        _ => EXECUTION_ERROR,
    }
}
