//! Chunked transfer of RPC output.
//!
//! The RPC engine emits responses of arbitrary length; the link only
//! carries [`MAX_PAYLOAD`] bytes per Data frame.  Output is cut into
//! consecutive payloads in order, the last one possibly short.
//!
//! ```text
//! engine output:  [ 150 bytes                                  ]
//! Data frame 1:   [ 64 bytes           ]
//! Data frame 2:                         [ 64 bytes           ]
//! Data frame 3:                                               [22]
//! ```
//!
//! The receiver reassembles by concatenation; no chunk flags are needed.

use super::{DataPayload, MAX_PAYLOAD};

/// Split `data` into `ceil(len / MAX_PAYLOAD)` payloads.
///
/// Empty input yields no payloads.
pub fn chunk_payload(data: &[u8]) -> impl Iterator<Item = DataPayload> + '_ {
    // `chunks` never yields more than MAX_PAYLOAD bytes, so `new` cannot fail.
    data.chunks(MAX_PAYLOAD)
        .filter_map(|chunk| DataPayload::new(chunk).ok())
}

// ── Tests ────────────────────────────────────────────────────
