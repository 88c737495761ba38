//! Sandbox run tracking and the HTTP code-preview backend client.
//!
//! A `<code>` payload from the graph-generation agent becomes a fragment
//! submitted to the sandbox backend, which builds it into a live preview
//! and returns a URL. At most one run is tracked at a time; a new
//! submission overwrites the previous result.

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fixed target for generated preview components unless the fragment
/// overrides it. Part of the sandbox backend contract.
pub const DEFAULT_FILE_PATH: &str = "src/components/GeneratedPreview.tsx";
pub const DEFAULT_TEMPLATE_ID: &str = "chatbot-ui-nextjs-preview";

/// A code fragment to be built into a live preview.
#[derive(Debug, Clone, Serialize)]
pub struct GraphFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(rename = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl GraphFragment {
    /// Package extracted code with the default template and target path.
    pub fn for_code(code: String) -> Self {
        Self {
            template: Some(DEFAULT_TEMPLATE_ID.to_string()),
            file_path: Some(DEFAULT_FILE_PATH.to_string()),
            code,
            port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSuccess {
    pub url: String,
    pub code: String,
    #[serde(rename = "sandboxID")]
    pub sandbox_id: String,
    #[serde(default)]
    pub logs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxFailure {
    pub error: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, rename = "templateUsed")]
    pub template_used: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SandboxOutcome {
    Success(SandboxSuccess),
    Failure(SandboxFailure),
}

/// Owns the single live sandbox run and the panel state around it.
#[derive(Debug, Default)]
pub struct SandboxTracker {
    pub active_fragment: Option<GraphFragment>,
    pub result: Option<SandboxOutcome>,
    pub loading: bool,
    pub panel_visible: bool,
    pub panel_collapsed: bool,
}

impl SandboxTracker {
    /// Record a new submission; drops the previous result.
    pub fn begin(&mut self, fragment: GraphFragment) {
        self.active_fragment = Some(fragment);
        self.result = None;
        self.loading = true;
        self.panel_visible = true;
        self.panel_collapsed = false;
    }

    pub fn finish(&mut self, outcome: SandboxOutcome) {
        self.result = Some(outcome);
        self.loading = false;
    }

    pub fn clear(&mut self) {
        self.active_fragment = None;
        self.result = None;
        self.loading = false;
        self.panel_visible = false;
    }
}

/// Thin client for the sandbox backend. Failures are returned as a normal
/// outcome rather than an error: the backend explains itself in the body
/// and the session needs those details for the diagnostic message.
pub struct SandboxBackend {
    url: String,
    client: Client,
}

impl SandboxBackend {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
        }
    }

    pub async fn run(&self, fragment: &GraphFragment) -> Result<SandboxOutcome> {
        info!(
            template = fragment.template.as_deref().unwrap_or("(default)"),
            "submitting sandbox fragment"
        );
        let resp = self.client.post(&self.url).json(fragment).send().await?;

        if resp.status().is_success() {
            let success: SandboxSuccess = resp.json().await?;
            Ok(SandboxOutcome::Success(success))
        } else {
            let failure: SandboxFailure = resp.json().await.unwrap_or(SandboxFailure {
                error: "Failed to execute sandbox code.".to_string(),
                details: None,
                template_used: None,
                stack: None,
            });
            Ok(SandboxOutcome::Failure(failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_code_applies_default_template_and_path() {
        let fragment = GraphFragment::for_code("export default () => null;".to_string());
        assert_eq!(fragment.template.as_deref(), Some(DEFAULT_TEMPLATE_ID));
        assert_eq!(fragment.file_path.as_deref(), Some(DEFAULT_FILE_PATH));
        assert!(fragment.port.is_none());
    }

    #[test]
    fn new_submission_overwrites_previous_result() {
        let mut tracker = SandboxTracker::default();
        tracker.begin(GraphFragment::for_code("a".to_string()));
        tracker.finish(SandboxOutcome::Failure(SandboxFailure {
            error: "boom".to_string(),
            details: None,
            template_used: None,
            stack: None,
        }));
        assert!(!tracker.loading);
        assert!(tracker.result.is_some());

        tracker.begin(GraphFragment::for_code("b".to_string()));
        assert!(tracker.loading);
        assert!(tracker.result.is_none());
        assert_eq!(tracker.active_fragment.as_ref().unwrap().code, "b");
    }

    #[test]
    fn fragment_serializes_with_wire_field_names() {
        let fragment = GraphFragment::for_code("x".to_string());
        let wire = serde_json::to_value(&fragment).unwrap();
        assert!(wire.get("filePath").is_some());
        assert!(wire.get("template").is_some());
        assert!(wire.get("port").is_none());
    }
}
