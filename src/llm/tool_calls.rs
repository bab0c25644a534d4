use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::llm::types::ToolCallDelta;

#[derive(Debug, Clone, PartialEq)]
pub enum ToolArguments {
    /// Accumulated text parsed as JSON.
    Parsed(JsonValue),
    /// Text that never formed a complete JSON value (flushed by end of stream).
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallInvocation {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCallInvocation {
    /// The `customerQuery` string argument every department tool takes.
    pub fn customer_query(&self) -> Option<&str> {
        match &self.arguments {
            ToolArguments::Parsed(v) => v.get("customerQuery").and_then(JsonValue::as_str),
            ToolArguments::Raw(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    index: usize,
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn into_invocation(self, arguments: ToolArguments) -> ToolCallInvocation {
        ToolCallInvocation {
            index: self.index,
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

/// Reassembles streamed tool-call fragments into one invocation.
///
/// The stream never interleaves tool calls, so there is a single slot: the
/// first fragment opens it and fixes index/id/name, later fragments only
/// append argument text. Interleaved calls would corrupt the slot; keying
/// pending calls by `index` is the fix if that ever has to be supported.
///
/// Completion is detected when the argument text ends in `}` and parses as
/// JSON. A `}` that closes only a nested object fails to parse and the slot
/// keeps waiting. Text whose prefix happens to be valid JSON ending in `}`
/// completes early; this is a known limitation.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    current: Option<PendingToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.is_some()
    }

    pub fn feed(&mut self, delta: &ToolCallDelta) -> Option<ToolCallInvocation> {
        let fragment = delta
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .unwrap_or("");

        match self.current.as_mut() {
            Some(pending) => pending.arguments.push_str(fragment),
            None => {
                let pending = PendingToolCall {
                    index: delta.index.unwrap_or(0),
                    id: delta.id.clone().unwrap_or_default(),
                    name: delta
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default(),
                    arguments: fragment.to_string(),
                };
                debug!(name = %pending.name, id = %pending.id, "tool call started");
                self.current = Some(pending);
            }
        }

        let pending = self.current.as_ref()?;
        if !pending.arguments.ends_with('}') {
            return None;
        }
        match serde_json::from_str::<JsonValue>(&pending.arguments) {
            Ok(args) => {
                let pending = self.current.take()?;
                Some(pending.into_invocation(ToolArguments::Parsed(args)))
            }
            Err(e) => {
                warn!(err = %e, "tool call arguments not yet complete");
                None
            }
        }
    }

    /// Removes the in-flight call, if any.
    ///
    /// Arguments that parse as JSON (for example with trailing whitespace
    /// after the closing brace) are returned parsed; anything else is raw.
    pub fn take_in_flight(&mut self) -> Option<ToolCallInvocation> {
        self.current.take().map(|mut pending| {
            let raw = std::mem::take(&mut pending.arguments);
            let arguments = match serde_json::from_str::<JsonValue>(&raw) {
                Ok(args) => ToolArguments::Parsed(args),
                Err(_) => ToolArguments::Raw(raw),
            };
            pending.into_invocation(arguments)
        })
    }
}
