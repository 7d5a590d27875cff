//! Request routing with ordered backend fallback

pub mod attempt;
pub mod completion;

pub use attempt::{AttemptOutcome, CallAttempt};
pub use completion::CompletionRouter;
