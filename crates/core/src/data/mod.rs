//! Core data model.
//!
//! These are plain, transport-agnostic types shared by every component.
//! Nothing in this module performs I/O or holds a lock; mutable state lives
//! in the owning component (`transcript`, `orchestrator`, `context`).

pub mod audio;
pub mod event;
pub mod session;
pub mod transcript;

pub use audio::{AudioChunk, PauseType, VadResult};
pub use event::Event;
pub use session::{SessionConfig, SessionId, SessionState};
pub use transcript::{ConfirmedBuffer, ConversationTurn, LiveBuffer, TranscriptSegment};
