//! Query run tracking and the HTTP query backend client.
//!
//! The reducer creates a pending execution synchronously so the UI can show
//! a spinner immediately; the network result re-enters the session as an
//! event and mutates exactly its own record by id.

use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// One submitted graph query and its (eventual) result rows.
#[derive(Debug, Clone)]
pub struct QueryExecution {
    /// Client-assigned, unique per submission.
    pub id: String,
    pub query: String,
    /// None while pending or on error; possibly-empty rows on success.
    pub records: Option<Vec<Value>>,
    pub status: QueryStatus,
    pub error_details: Option<String>,
}

/// Owns the query executions and the panel state around them.
#[derive(Debug, Default)]
pub struct QueryTracker {
    pub executions: Vec<QueryExecution>,
    /// Execution shown in the active results tab.
    pub active_id: Option<String>,
    pub panel_visible: bool,
    pub panel_collapsed: bool,
}

impl QueryTracker {
    pub fn create_pending(&mut self, id: String, query: String) {
        self.executions.push(QueryExecution {
            id,
            query,
            records: None,
            status: QueryStatus::Pending,
            error_details: None,
        });
    }

    /// Returns false when the id is unknown (e.g. cleared before the job
    /// finished); the completion is then dropped.
    pub fn mark_success(&mut self, id: &str, records: Vec<Value>) -> bool {
        let Some(exec) = self.executions.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        exec.status = QueryStatus::Success;
        exec.records = Some(records);
        exec.error_details = None;
        self.panel_visible = true;
        self.panel_collapsed = false;
        true
    }

    pub fn mark_error(&mut self, id: &str, details: String) -> bool {
        let Some(exec) = self.executions.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        exec.status = QueryStatus::Error;
        exec.records = None;
        exec.error_details = Some(details);
        self.panel_visible = true;
        self.panel_collapsed = false;
        true
    }

    pub fn get(&self, id: &str) -> Option<&QueryExecution> {
        self.executions.iter().find(|e| e.id == id)
    }

    pub fn clear(&mut self) {
        self.executions.clear();
        self.active_id = None;
        self.panel_visible = false;
    }
}

/// Thin client for the query-execution backend. The backend normalizes
/// record values (wide integers to numbers, temporals to ISO-8601 strings,
/// nodes/edges to plain objects); rows are kept opaque here.
pub struct QueryBackend {
    url: String,
    client: Client,
}

impl QueryBackend {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
        }
    }

    /// POST `{query}` and return the normalized record rows.
    pub async fn run(&self, query: &str) -> Result<Vec<Value>> {
        info!(query, "executing graph query");
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body: Value = resp.json().await.unwrap_or_default();
            let details = body
                .get("details")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| status.to_string());
            anyhow::bail!("{details}");
        }

        let body: Value = resp.json().await?;
        Ok(body
            .get("records")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryStatus, QueryTracker};
    use serde_json::json;

    #[test]
    fn completion_updates_exactly_its_own_record() {
        let mut tracker = QueryTracker::default();
        tracker.create_pending("a".to_string(), "MATCH (n) RETURN n".to_string());
        tracker.create_pending("b".to_string(), "MATCH (m) RETURN m".to_string());

        assert!(tracker.mark_success("b", vec![json!({"m": 1})]));

        assert_eq!(tracker.get("a").unwrap().status, QueryStatus::Pending);
        let b = tracker.get("b").unwrap();
        assert_eq!(b.status, QueryStatus::Success);
        assert_eq!(b.records.as_ref().unwrap().len(), 1);
        assert!(tracker.panel_visible);
    }

    #[test]
    fn error_clears_records_and_keeps_details() {
        let mut tracker = QueryTracker::default();
        tracker.create_pending("a".to_string(), "MATCH".to_string());
        assert!(tracker.mark_error("a", "invalid syntax".to_string()));
        let a = tracker.get("a").unwrap();
        assert_eq!(a.status, QueryStatus::Error);
        assert!(a.records.is_none());
        assert_eq!(a.error_details.as_deref(), Some("invalid syntax"));
    }

    #[test]
    fn unknown_id_completion_is_dropped() {
        let mut tracker = QueryTracker::default();
        assert!(!tracker.mark_success("ghost", Vec::new()));
        assert!(!tracker.mark_error("ghost", "x".to_string()));
    }

    #[test]
    fn clear_resets_executions_and_active_tab() {
        let mut tracker = QueryTracker::default();
        tracker.create_pending("a".to_string(), "MATCH".to_string());
        tracker.active_id = Some("a".to_string());
        tracker.panel_visible = true;
        tracker.clear();
        assert!(tracker.executions.is_empty());
        assert!(tracker.active_id.is_none());
        assert!(!tracker.panel_visible);
    }
}
