use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridError>;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),
    #[error("cfg error: {0}")]
    Cfg(#[from] CfgError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("malformed metadata bundle: {0}")]
    Malformed(String),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("value `{value}` does not parse as {ty}")]
    BadValue { value: String, ty: String },
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
}

/// Attribution failures are fatal: a silently mis-attributed instruction
/// corrupts every downstream coverage and parameter-model result.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("source map entry {index} is malformed: `{raw}`")]
    MalformedEntry { index: usize, raw: String },
    #[error("source map has {entries} entries but the chain holds {instructions} instructions")]
    EntryCountMismatch { entries: usize, instructions: usize },
    #[error("no basic-block entry precedes the unnamed-dispatch region at pc {pc}")]
    DispatchRegionUnanchored { pc: usize },
    #[error("jump at pc {pc} for `{function}` is not preceded by a pushed target")]
    MissingJumpTarget { pc: usize, function: String },
    #[error("unhandled attribution shape at pc {pc} for `{function}` ({visibility})")]
    UnhandledShape {
        pc: usize,
        function: String,
        visibility: String,
    },
    #[error("finalized span of `{function}` starts at pc {pc}, which is not in the chain")]
    SpanOutsideChain { pc: usize, function: String },
}

#[derive(Debug, Error)]
pub enum CfgError {
    #[error("malformed block record near line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
    #[error("block entry address {pc:#x} is not in the instruction chain")]
    UnknownEntry { pc: usize },
    #[error("block {block:#x} references unknown {role} address {pc:#x}")]
    UnknownNeighbor {
        block: usize,
        role: &'static str,
        pc: usize,
    },
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("covering engine is not configured")]
    NotConfigured,
    #[error("covering engine transport failed: {0}")]
    Transport(String),
    #[error("covering engine produced no table: {0}")]
    EmptyTable(String),
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver returned unknown while probing `{function}`")]
    Unknown { function: String },
}
