//! Change notification subsystem.
//!
//! # Data Flow
//! ```text
//! DirectoryWatcher ChangeEvent stream
//!     → dispatcher.rs (single consumer)
//!     → broadcaster.rs notify()
//!     → every parked long-poll request answered
//!     → browsers reload and immediately poll again
//! ```

pub mod broadcaster;
pub mod dispatcher;

pub use broadcaster::{ChangeBroadcaster, Subscription, WaitOutcome, Waiter};
pub use dispatcher::spawn_dispatcher;
