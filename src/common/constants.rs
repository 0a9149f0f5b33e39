// Settings
pub const ENV_PREFIX: &str = "RUSTYQUERY";
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;
pub const DEFAULT_NON_DETERMINISTIC_FUNCTIONS: &[&str] = &["random", "rand", "newid", "now"];

// Query scopes reported to observers
pub const MAIN_QUERY_SCOPE: &str = "main";

// Preconditions
pub const MISSING_CTE_RESULT_MSG: &str = "No materialized result for common table expression";
pub const SET_OPERAND_WIDTH_MSG: &str = "Set operation operands have different widths";
pub const SET_KEY_OUT_OF_RANGE_MSG: &str = "Set operation key index out of range";
