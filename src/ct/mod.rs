pub mod ipm;
pub mod oracle;
pub mod parameter;

/// Reserved column carrying the abstract state identifier in every
/// submission; never a valid parameter name.
pub const STATE_COLUMN: &str = "GLOBAL_STATE";
