//! # Engine Primitives
//!
//! Hardcoded constants for the masq engines.
//!
//! These are compiled into the binary. The iteration cap can be lowered per
//! run through `AgglomerationOptions`, never raised above what the caller sets.

/// Number of taxonomic levels (Kingdom through Species).
pub const LEVEL_COUNT: usize = 7;

/// Default cap on the number of iterations of one fixpoint loop.
///
/// Every pair contraction removes one edge and every taxon merge removes at
/// least one node, so a healthy network converges long before this bound.
/// Hitting it means the data produced a cycle and the network is abandoned.
pub const MAX_FIXPOINT_ITERATIONS: usize = 1_000_000;

/// Magic bytes for the masq store snapshot format.
///
/// - File Header = Magic Bytes ("MASQ") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"MASQ";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// Prefix of ids minted by the sequence id strategy.
pub const SEQUENCE_ID_PREFIX: &str = "agglom";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of networks a single set operation may combine.
pub const MAX_SET_NETWORKS: usize = 10_000;

/// Maximum number of edges accepted in a single dataset import.
pub const MAX_IMPORT_EDGES: usize = 10_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_levels() {
        assert_eq!(LEVEL_COUNT, 7);
    }

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"MASQ");
    }
}
