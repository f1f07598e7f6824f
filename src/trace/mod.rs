//! Per-rank communication trace records and their parser.

pub mod types;
pub mod parser;

pub use types::*;
pub use parser::{parse_record, parse_record_bytes, parse_record_value};
