pub mod cfg;
pub mod chain;
pub mod coverage;
pub mod srcmap;
