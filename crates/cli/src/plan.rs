use anyhow::{Context, Result};
use hush_core::{Shutdown, ShutdownConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A shutdown plan: simulated services and how they depend on each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(flatten)]
    pub shutdown: ShutdownConfig,

    #[serde(default, rename = "service")]
    pub services: Vec<ServiceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,

    /// How long the simulated close takes.
    #[serde(default)]
    pub delay_ms: u64,

    /// Services that must still be up while this one closes.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Plan file not found, using an empty plan");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read plan file")?;
        toml::from_str(&content).context("Failed to parse plan file")
    }

    /// Register every service, in file order, on a new orchestrator.
    pub fn build(&self) -> Result<Arc<Shutdown>> {
        let shutdown = Arc::new(Shutdown::with_config(self.shutdown.clone()));

        for service in &self.services {
            let name = service.name.clone();
            let delay = Duration::from_millis(service.delay_ms);
            let dependencies: Vec<&str> = service.depends_on.iter().map(String::as_str).collect();

            shutdown
                .add(
                    service.name.clone(),
                    move |ctx| async move {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {
                                tracing::info!(service = %name, "service closed");
                            }
                            _ = ctx.expired() => {
                                tracing::warn!(service = %name, "service close abandoned at deadline");
                            }
                        }
                    },
                    &dependencies,
                )
                .with_context(|| format!("Failed to register service {}", service.name))?;
        }

        Ok(shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hush_core::{ShutdownError, ShutdownOutcome};
    use std::io::Write;

    const PLAN: &str = r#"
timeout_ms = 2000

[[service]]
name = "database"
delay_ms = 10

[[service]]
name = "cache"

[[service]]
name = "http_server"
delay_ms = 20
depends_on = ["database", "cache"]
"#;

    fn write_plan(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_plan() {
        let file = write_plan(PLAN);
        let plan = Plan::load(file.path()).unwrap();

        assert_eq!(plan.shutdown.timeout(), Duration::from_secs(2));
        assert_eq!(plan.services.len(), 3);
        assert_eq!(plan.services[1].delay_ms, 0);
        assert_eq!(plan.services[2].depends_on, vec!["database", "cache"]);
    }

    #[test]
    fn test_missing_plan_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let plan = Plan::load(&dir.path().join("hush.toml")).unwrap();

        assert!(plan.services.is_empty());
        assert_eq!(plan.shutdown, ShutdownConfig::default());
    }

    #[test]
    fn test_invalid_plan_rejected() {
        let file = write_plan("[[service]]\ndelay_ms = 10\n");
        assert!(Plan::load(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_build_and_run() {
        let plan: Plan = toml::from_str(PLAN).unwrap();
        let shutdown = plan.build().unwrap();

        assert_eq!(shutdown.node_names().len(), 3);

        shutdown.trigger().await;
        assert_eq!(shutdown.wait().await, ShutdownOutcome::Completed);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let plan: Plan = toml::from_str(
            r#"
[[service]]
name = "http_server"
depends_on = ["database"]

[[service]]
name = "database"
"#,
        )
        .unwrap();

        let err = plan.build().err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ShutdownError>(),
            Some(ShutdownError::NodeNotFound(name)) if name == "database"
        ));
    }
}
