mod error;

pub mod chat;
pub mod context;
pub mod generator;
pub mod orchestrate;
pub mod settings;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tools;

pub use chat::{ChatMessage, ChatRequest, CompletionRequest, Role, ToolChoice, ToolDefinition};
pub use error::CoreError;
pub use generator::{Availability, Generator, GeneratorFacade};
pub use tools::ToolExecutor;
