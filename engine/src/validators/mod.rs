//! Per-round participation validators.
//! Each validator runs once per finalized round against the single
//! configured identity and emits a [`Message`] per issue found.

pub mod fdc;
pub mod ftso;

use crate::message::Message;

/// Output of one validator pass over a round: every issue found, in no
/// particular priority order (the emitter fans them all out regardless).
pub type ValidationReport = Vec<Message>;
