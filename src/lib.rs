//! # Confman
//!
//! Conference call invitations with automatic redirection to backup contacts.
//!
//! Inviting someone into a conference places an outbound call leg and then
//! watches the switch's channel table. When the callee does not pick up in
//! time, every one of their backup contacts ("subordinates") is invited in
//! turn, each with a watch of its own, down the whole escalation tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           ORCHESTRATOR                           │
//! │   conferences · invite lists · dialplan callbacks · Op loop      │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ invite_and_watch
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         REDIRECT ENGINE                          │
//! │   one task per invitation: originate → watch → fan out           │
//! └───────┬──────────────────────┬───────────────────────┬───────────┘
//!         ▼                      ▼                       ▼
//!  ┌─────────────┐       ┌───────────────┐       ┌──────────────┐
//!  │   Switch    │       │   Directory   │       │  Event log   │
//!  │ (Asterisk)  │       │ (escalation   │       │  (live push) │
//!  │             │       │    tree)      │       │              │
//!  └─────────────┘       └───────────────┘       └──────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Invitation**: one originate plus one watch task
//! - **Watch**: polls channel state until answered, gone or timed out
//! - **Fan-out**: one new invitation per subordinate of an unreachable callee
//! - **Profile**: option bag rendered into ConfBridge options

pub mod channel;
pub mod conference;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod profile;
pub mod protocol;
pub mod snapshot;
pub mod switch;

pub use channel::{EventLog, LogSink, NotifierChannel};
pub use conference::{Conference, ConferenceHandle, Participant};
pub use config::{Config, RedirectConfig};
pub use directory::{ContactDirectory, ContactHierarchy, InMemoryDirectory};
pub use engine::RedirectEngine;
pub use error::{ConfmanError, DirectoryError, SwitchError};
pub use orchestrator::Orchestrator;
pub use profile::{ConferenceProfile, ParticipantProfile};
pub use protocol::{
    ChannelInfo, ChannelStatus, ConferenceEvent, ConferenceId, Contact, EventKind, InviteId,
    InviteRequest, Op, WatchOutcome,
};
pub use switch::{AsteriskCli, SwitchAdapter};
