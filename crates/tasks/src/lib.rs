//! Concrete batch tasks.
//!
//! Batch bodies that run on the longrun engine. Each talks to its data
//! source through a narrow trait so the engine never sees the source itself.

#![warn(missing_docs)]

pub mod counter;
pub mod senders;

pub use counter::{CounterState, CounterTask};
pub use senders::{
    top_senders, CountSendersTask, JsonMailbox, MailMessage, MailThread, Mailbox, SendersState,
};
