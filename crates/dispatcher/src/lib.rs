//! Bounded-concurrency HTTP request dispatcher.
//!
//! A [`Dispatcher`] owns a fixed pool of workers. Idle workers announce
//! a one-shot job slot into a shared ready pool; a single match loop pairs
//! each announced slot with the next request from the job intake. Every
//! completed call is detached from its connection and delivered as an
//! [`Envelope`] through either a pull handle ([`Responses`]) or a
//! caller-supplied handler.
//!
//! ```text
//! add(request) ──► intake ──► match loop ◄── ready pool ◄── worker slots
//!                                 │                             ▲
//!                                 └──► worker ──► HttpClient ───┘
//!                                        │
//!                                        └──► arena copy ──► Envelope ──► sink
//! ```

pub mod arena;
pub mod client;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod request;
pub mod sink;
pub mod snapshot;
pub mod worker;

pub use arena::{ArenaBuffer, ArenaStats, BufferArena};
pub use client::HttpClient;
pub use dispatcher::Dispatcher;
pub use envelope::Envelope;
pub use error::{CallError, DispatchError};
pub use fanout_core::{DispatcherConfig, JobId};
pub use request::Request;
pub use sink::{ResultHandler, Responses};
pub use snapshot::{DetachedBody, ResponseSnapshot};
