//! Backend module - descriptors, ordered registry, and completion clients

pub mod completion;
pub mod descriptor;
pub mod registry;

pub use completion::{
    ChatChoice, ChatMessage, CompletionBackend, CompletionRequest, CompletionResponse,
    OpenAiCompatBackend, Usage,
};
pub use descriptor::{
    BackendEntry, CompletionDescriptor, ProtocolKind, SkipReason, SpeechDescriptor,
};
pub use registry::{BackendOrdering, BackendRegistry};
