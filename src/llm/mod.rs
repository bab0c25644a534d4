mod client;
pub mod stream;
pub mod tool_calls;
pub mod types;

pub use client::*;
pub use stream::StreamChunk;
pub use tool_calls::ToolCallInvocation;
