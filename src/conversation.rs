use anyhow::{Context, Result};
use futures::StreamExt;
use std::io::{BufRead, Write};
use tracing::{error, info, warn};

use crate::departments::DepartmentDispatcher;
use crate::error::RelayError;
use crate::llm::{AgentClient, StreamChunk, ToolCallInvocation};

/// Sent once at startup so the server assigns a thread before the first prompt.
pub const GREETING_QUERY: &str = "Hello";
/// Sent after a turn that delegated to a department.
pub const FOLLOW_UP_QUERY: &str = "summarize the current status for the customer";
pub const PROMPT: &str = "Enter your query (or type \"exit\" to quit): ";

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub thread_id: Option<String>,
    pub pending_follow_up: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts a thread id from a response; an absent one keeps the current id.
    pub fn update_thread_id(&mut self, received: Option<String>) {
        if let Some(id) = received {
            self.thread_id = Some(id);
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub had_tool_call: bool,
    pub follow_up_sent: bool,
}

pub struct Conversation<W: Write> {
    client: AgentClient,
    dispatcher: DepartmentDispatcher,
    session: Session,
    out: W,
}

impl<W: Write> Conversation<W> {
    pub fn new(client: AgentClient, dispatcher: DepartmentDispatcher, out: W) -> Self {
        Self {
            client,
            dispatcher,
            session: Session::new(),
            out,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Reads queries until `exit` or end of input.
    ///
    /// Failed turns are logged and the loop moves on; a reply without a body
    /// ends the session.
    pub async fn run<R: BufRead>(&mut self, input: R) -> Result<()> {
        if let Err(e) = self.greet().await {
            if is_missing_body(&e) {
                error!(err = %e, "ending session");
                return Ok(());
            }
            error!(err = ?e, "greeting failed");
        }

        let mut lines = input.lines();
        loop {
            self.emit(PROMPT)?;
            let Some(line) = lines.next() else {
                break;
            };
            let line = line.context("read user input")?;
            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if query.to_lowercase() == "exit" {
                break;
            }

            match self.run_turn(query).await {
                Ok(outcome) => info!(?outcome, "CS Agent response completed"),
                Err(e) if is_missing_body(&e) => {
                    error!(err = %e, "ending session");
                    break;
                }
                Err(e) => error!(err = ?e, "turn failed"),
            }
        }
        Ok(())
    }

    pub async fn greet(&mut self) -> Result<()> {
        self.stream_reply(GREETING_QUERY).await.map(|_| ())
    }

    /// One user query, plus at most one follow-up round when the reply
    /// delegated to a department. Tool calls in the follow-up are still
    /// dispatched but never trigger another round.
    pub async fn run_turn(&mut self, query: &str) -> Result<TurnOutcome> {
        let had_tool_call = self.stream_reply(query).await?;
        if had_tool_call {
            self.session.pending_follow_up = Some(FOLLOW_UP_QUERY.to_string());
        }

        let mut follow_up_sent = false;
        if let Some(follow_up) = self.session.pending_follow_up.take() {
            info!("Calling department agents...");
            self.stream_reply(&follow_up).await?;
            follow_up_sent = true;
        }

        Ok(TurnOutcome {
            had_tool_call,
            follow_up_sent,
        })
    }

    /// Sends `query` and drains the reply; returns whether it held a tool call.
    async fn stream_reply(&mut self, query: &str) -> Result<bool> {
        let response = self
            .client
            .send(query, self.session.thread_id.as_deref())
            .await?;
        self.session.update_thread_id(response.thread_id.clone());

        let chunks = response.into_chunks();
        futures::pin_mut!(chunks);

        let mut had_tool_call = false;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                StreamChunk::Content(text) => self.emit(&text)?,
                StreamChunk::ToolCall(call) => {
                    had_tool_call = true;
                    if let Some(text) = self.delegate(&call).await {
                        self.emit(&text)?;
                    }
                }
                StreamChunk::End => {
                    self.emit("\n")?;
                    break;
                }
            }
        }
        Ok(had_tool_call)
    }

    async fn delegate(&self, call: &ToolCallInvocation) -> Option<String> {
        let Some(query) = call.customer_query() else {
            warn!(tool = %call.name, id = %call.id, "tool call has no usable customerQuery; skipping");
            return None;
        };
        match self
            .dispatcher
            .dispatch(&call.name, query, self.session.thread_id.as_deref())
            .await
        {
            Ok(Some(result)) => {
                info!(department = %result.department, "department replied");
                Some(result.text)
            }
            Ok(None) => None,
            Err(e) => {
                error!(tool = %call.name, err = ?e, "department call failed");
                None
            }
        }
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).context("write output")?;
        self.out.flush().context("flush output")?;
        Ok(())
    }
}

fn is_missing_body(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<RelayError>(), Some(RelayError::MissingBody))
}
