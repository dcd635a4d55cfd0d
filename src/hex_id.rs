use crate::error::{PipelineError, PipelineResult};
use crate::types::HexagonId;

const PLACEHOLDER_TOKENS: [&str; 3] = ["undefined", "null", "NaN"];

/// Converts a wire-form (decimal) identifier into geometry form (lower-case hex, no prefix).
///
/// Parses into `u64` so identifiers above 2^53 keep every bit.
pub fn to_geometry_form(wire_form: &str) -> PipelineResult<String> {
    let value = parse_wire_form(wire_form)?;
    Ok(format!("{value:x}"))
}

pub fn parse_wire_form(wire_form: &str) -> PipelineResult<u64> {
    if wire_form.is_empty()
        || PLACEHOLDER_TOKENS.contains(&wire_form)
        || !wire_form.bytes().all(|byte| byte.is_ascii_digit())
    {
        return Err(PipelineError::invalid_identifier(wire_form));
    }
    // Overflow past u64 is not a valid cell either.
    wire_form
        .parse::<u64>()
        .map_err(|_| PipelineError::invalid_identifier(wire_form))
}

impl HexagonId {
    pub fn geometry_form(&self) -> PipelineResult<String> {
        to_geometry_form(self.as_str())
    }
}
