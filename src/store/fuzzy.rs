//! Fuzzy identifier correction
//!
//! Jaro-Winkler scoring with the same 0.6 floor the entity search uses.

use strsim::jaro_winkler;

use crate::error::ScriptError;

/// Minimum similarity for a candidate to be suggested
pub const SIMILARITY_CUTOFF: f64 = 0.6;

/// Best-scoring candidate at or above the cutoff
pub fn closest_match<'a, S: AsRef<str>>(input: &str, candidates: &'a [S]) -> Option<(&'a str, f64)> {
    candidates
        .iter()
        .map(|candidate| {
            let candidate = candidate.as_ref();
            (candidate, jaro_winkler(input, candidate))
        })
        .filter(|(_, score)| *score >= SIMILARITY_CUTOFF)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Return the input when it exists among the candidates. Otherwise fail
/// with `NotFound`, suggesting the closest candidate when one is similar
/// enough.
pub fn autocorrect<S: AsRef<str>>(input: &str, candidates: &[S]) -> Result<String, ScriptError> {
    if candidates.iter().any(|c| c.as_ref() == input) {
        return Ok(input.to_string());
    }

    let suggestion = closest_match(input, candidates).map(|(best, _)| best.to_string());
    tracing::debug!("No exact match for '{}', best candidate {:?}", input, suggestion);

    Err(ScriptError::NotFound {
        identifier: input.to_string(),
        suggestion,
    })
}
