//! Inbound message envelopes.
//!
//! Raw envelopes arrive from the Session Engine as loosely-shaped JSON. This
//! module decodes them once into a tagged [`MessageContent`] variant so the
//! normalizer can match exhaustively instead of probing optional fields.

mod parser;
mod types;

pub use parser::{parse_envelope, parse_timestamp};
pub use types::*;
