//! Background sync of mutating actions performed while offline.
//!
//! Actions that cannot reach the origin are persisted in a FIFO queue and
//! replayed one at a time whenever connectivity comes back. Replays are
//! at-least-once; each carries its action id as an idempotency key.

mod action;
mod queue;
mod storage;

pub use action::{ActionKind, PendingAction};
pub use queue::{DrainReport, HttpReplayer, OfflineQueue, SubmitOutcome};
pub use storage::{ActionQueue, MemoryQueue, SqliteQueue};
