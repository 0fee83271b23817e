//! # gachadex-codec
//!
//! Pure decoding for the gachapon game and marketplace programs: log lines
//! in, typed event records out. No I/O and no state, so everything here is
//! deterministic and safe to call from any task.
//!
//! The wire format is the Anchor event convention: a `"Program data: "` log
//! line carrying a base64 payload whose first 8 bytes are the event
//! discriminator (SHA-256 of `"event:<Name>"`), followed by the event's
//! fields in declaration order, little-endian.

pub mod accounts;
pub mod decoder;
pub mod discriminator;
pub mod error;
pub mod events;
pub mod wire;

pub use decoder::{decode_logs, EVENT_LOG_MARKER};
pub use error::DecodeError;
pub use events::{EventKind, EventRecord, PrizeTier, ProgramEvent};
