use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::fmt;
use tracing::{debug, error, warn};

use crate::config::DepartmentsConfig;
use crate::error::RelayError;
use crate::llm::bearer_headers;
use crate::llm::types::{ChatMessage, DepartmentRequest, DepartmentResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Department {
    Sports,
    Electronics,
    Travel,
}

impl Department {
    /// Resolves the tool name the main agent uses to delegate.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "call_sports_dept" => Some(Department::Sports),
            "call_electronics_dept" => Some(Department::Electronics),
            "call_travel_dept" => Some(Department::Travel),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Department::Sports => "sports",
            Department::Electronics => "electronics",
            Department::Travel => "travel",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentResult {
    pub department: Department,
    pub text: String,
}

/// Renders a department completion for the customer.
///
/// A JSON object completion becomes `"<first key> <first value>"`; anything
/// else is returned unchanged.
pub fn format_department_response(completion: &str) -> String {
    match serde_json::from_str::<JsonValue>(completion) {
        Ok(JsonValue::Object(map)) => match map.into_iter().next() {
            Some((key, JsonValue::String(value))) => format!("{key} {value}"),
            Some((key, value)) => format!("{key} {value}"),
            None => completion.to_string(),
        },
        Ok(_) => completion.to_string(),
        Err(e) => {
            warn!(err = %e, "department completion is not JSON; using it verbatim");
            completion.to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepartmentDispatcher {
    inner: reqwest::Client,
    departments: DepartmentsConfig,
}

impl DepartmentDispatcher {
    pub fn new(departments: DepartmentsConfig, inner: reqwest::Client) -> Self {
        Self { inner, departments }
    }

    /// Delegates `query` to the department behind `tool_name`.
    ///
    /// Unknown tool names are not an error: nothing is sent and `Ok(None)`
    /// is returned.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        query: &str,
        thread_id: Option<&str>,
    ) -> Result<Option<DepartmentResult>> {
        let Some(department) = Department::from_tool_name(tool_name) else {
            warn!(tool = tool_name, "no department handles tool call; dropping it");
            return Ok(None);
        };
        let text = self.call_department(department, query, thread_id).await?;
        Ok(Some(DepartmentResult { department, text }))
    }

    async fn call_department(
        &self,
        department: Department,
        query: &str,
        thread_id: Option<&str>,
    ) -> Result<String> {
        let cfg = self.departments.get(department);
        let req = DepartmentRequest {
            messages: vec![ChatMessage::user(query)],
            thread_id: thread_id.filter(|t| !t.is_empty()).map(str::to_string),
        };

        if let Ok(payload) = serde_json::to_string_pretty(&req) {
            debug!(%department, payload=%payload, endpoint=%cfg.endpoint, "sending department payload");
        }

        let resp = self
            .inner
            .post(&cfg.endpoint)
            .headers(bearer_headers(&cfg.api_key)?)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("send {department} department request"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(%department, status=%status.as_u16(), body=%text, "department non-success status");
            return Err(RelayError::DepartmentStatus { department, status }.into());
        }

        let body: DepartmentResponse = resp
            .json()
            .await
            .with_context(|| format!("parse {department} department response"))?;
        let completion = body
            .completion
            .ok_or(RelayError::MissingCompletion(department))?;
        Ok(format_department_response(&completion))
    }
}
