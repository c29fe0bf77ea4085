//! Message passing between collaborators, engines and sinks
//!
//! All cross-thread communication in sdrflow is explicit message passing:
//!
//! ```text
//! ┌──────────────┐  EngineMessage   ┌──────────────────┐   SinkItem    ┌─────────────┐
//! │ Collaborator │ ───────────────► │  Engine worker   │ ────────────► │ Sink thread │
//! │  (UI / CLI)  │ ◄─────────────── │ (owns the source)│               │ (owns sink) │
//! └──────────────┘      Report      └──────────────────┘               └─────────────┘
//!        ▲                                                                    │
//!        └──────────────────────────── Report ────────────────────────────────┘
//! ```

mod messages;
mod queue;

pub use messages::{EngineMessage, Report, ReportQueue, SourceSettings};
pub use queue::{Envelope, MessageQueue};
