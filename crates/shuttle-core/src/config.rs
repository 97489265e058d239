//! Configuration for the decider and the activity worker.
//!
//! Every field except the identifying ones has a default, so a config file
//! only needs to name the domain, task lists and first activity.

use std::path::Path;

use serde::Deserialize;

use crate::domain::WorkflowExecution;
use crate::error::ConfigError;
use crate::ports::Notification;

fn default_version() -> String {
    "1".to_string()
}

fn default_timeout() -> String {
    "10000".to_string()
}

fn default_routing_key_field() -> String {
    "SupplierID".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_every() -> u32 {
    20
}

/// Who operator alerts come from and go to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertConfig {
    pub from: String,
    pub to: String,
    /// Base URL of the service console; the alert body links to the execution.
    #[serde(default)]
    pub console_url: Option<String>,
}

impl AlertConfig {
    /// Build the alert for `reason` on one execution.
    pub fn notification(
        &self,
        reason: &str,
        domain: &str,
        execution: &WorkflowExecution,
    ) -> Notification {
        let body = match &self.console_url {
            Some(url) => format!(
                "{url}#execution_events:domain={domain};workflowId={};runId={}",
                execution.workflow_id, execution.run_id
            ),
            None => format!(
                "domain={domain} workflowId={} runId={}",
                execution.workflow_id, execution.run_id
            ),
        };
        Notification {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: format!("Workflow {reason} Occurred"),
            body,
        }
    }

    /// Build an alert that is not about one execution.
    pub fn plain(&self, subject: impl Into<String>, body: impl Into<String>) -> Notification {
        Notification {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeciderConfig {
    pub domain: String,
    pub task_list: String,
    pub identity: String,

    /// Activity scheduled when an execution starts.
    pub first_activity: String,
    #[serde(default = "default_version")]
    pub first_activity_version: String,
    #[serde(default = "default_timeout")]
    pub first_activity_timeout: String,

    /// Input field whose value is used as the first activity's task list.
    #[serde(default = "default_routing_key_field")]
    pub routing_key_field: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_true")]
    pub reverse_order: bool,

    /// Log a heartbeat after this many consecutive empty polls.
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u32,

    pub alerts: AlertConfig,
}

impl DeciderConfig {
    pub fn new(
        domain: impl Into<String>,
        task_list: impl Into<String>,
        identity: impl Into<String>,
        first_activity: impl Into<String>,
        alerts: AlertConfig,
    ) -> Self {
        Self {
            domain: domain.into(),
            task_list: task_list.into(),
            identity: identity.into(),
            first_activity: first_activity.into(),
            first_activity_version: default_version(),
            first_activity_timeout: default_timeout(),
            routing_key_field: default_routing_key_field(),
            page_size: default_page_size(),
            reverse_order: true,
            heartbeat_every: default_heartbeat_every(),
            alerts,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require("decider.domain", &self.domain)?;
        require("decider.task_list", &self.task_list)?;
        require("decider.identity", &self.identity)?;
        require("decider.first_activity", &self.first_activity)?;
        require("decider.routing_key_field", &self.routing_key_field)?;
        require("decider.alerts.to", &self.alerts.to)?;
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("decider.page_size must be > 0".into()));
        }
        if self.heartbeat_every == 0 {
            return Err(ConfigError::Invalid(
                "decider.heartbeat_every must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivityWorkerConfig {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u32,
}

impl ActivityWorkerConfig {
    pub fn new(
        domain: impl Into<String>,
        task_list: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            task_list: task_list.into(),
            identity: identity.into(),
            heartbeat_every: default_heartbeat_every(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require("worker.domain", &self.domain)?;
        require("worker.task_list", &self.task_list)?;
        require("worker.identity", &self.identity)?;
        if self.heartbeat_every == 0 {
            return Err(ConfigError::Invalid(
                "worker.heartbeat_every must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// File-level config: one decider and one activity worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShuttleConfig {
    pub decider: DeciderConfig,
    pub worker: ActivityWorkerConfig,
}

impl ShuttleConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ShuttleConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decider.validate()?;
        self.worker.validate()
    }
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "decider": {
            "domain": "Orders",
            "task_list": "OrderDecider",
            "identity": "RapidDecider",
            "first_activity": "loadData",
            "alerts": { "from": "support@example.com", "to": "helpdesk@example.com" }
        },
        "worker": {
            "domain": "Orders",
            "task_list": "S123",
            "identity": "worker-1"
        }
    }"#;

    #[test]
    fn minimal_file_gets_defaults() {
        let config = ShuttleConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.decider.first_activity_version, "1");
        assert_eq!(config.decider.first_activity_timeout, "10000");
        assert_eq!(config.decider.routing_key_field, "SupplierID");
        assert_eq!(config.decider.page_size, 100);
        assert!(config.decider.reverse_order);
        assert_eq!(config.decider.heartbeat_every, 20);
        assert_eq!(config.worker.heartbeat_every, 20);
    }

    #[test]
    fn empty_identity_is_rejected() {
        let raw = MINIMAL.replace("\"worker-1\"", "\"  \"");
        let err = ShuttleConfig::from_json(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("worker.identity")));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ShuttleConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { path, .. } if path.contains("not/here")));
    }

    #[test]
    fn alert_links_to_console_when_configured() {
        let alerts = AlertConfig {
            from: "support@example.com".to_string(),
            to: "helpdesk@example.com".to_string(),
            console_url: Some("https://console.example.com/swf".to_string()),
        };
        let execution = WorkflowExecution::new("order-42", "run-1");
        let n = alerts.notification("Activity Timeout", "Orders", &execution);

        assert_eq!(n.subject, "Workflow Activity Timeout Occurred");
        assert_eq!(n.to, "helpdesk@example.com");
        assert!(n.body.starts_with("https://console.example.com/swf#execution_events:"));
        assert!(n.body.contains("workflowId=order-42"));
        assert!(n.body.contains("runId=run-1"));
    }
}
