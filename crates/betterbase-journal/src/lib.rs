//! The hash-chained membership log: entry shape, signing, CAS append, and
//! replay into a member view.

#![forbid(unsafe_code)]

pub mod chain;
pub mod entry;
pub mod payload_crypto;
pub mod verify;

pub use chain::{append_with_retry, AppendOutcome, Chain, LogEntry, MemberStatus, MemberView};
pub use entry::{parse as parse_entry, serialize as serialize_entry, EntryPayload, EntryType};
pub use verify::verify_entry;
