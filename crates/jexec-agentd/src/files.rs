use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use jexec_core::{
    collab::{ConfigSource, FetchedConfig},
    error::CoreError,
};
use jexec_model::{Configuration, EventIdentity};
use sha2::{Digest, Sha256};
use tracing::debug;

const JOB_DIR: &str = "job";
const CONFIG_FILE: &str = "config.yaml";

/// Configuration documents laid out on disk per tenant scope.
///
/// The most specific file wins: service, then stage, then project.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    root: PathBuf,
}

impl FileConfigSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Candidate files for `identity`, most specific first.
    fn candidates(&self, identity: &EventIdentity) -> Vec<PathBuf> {
        let project = self.root.join(&identity.project);
        let mut paths = Vec::with_capacity(3);
        if !identity.stage.is_empty() {
            let stage = project.join(&identity.stage);
            if !identity.service.is_empty() {
                paths.push(config_path(&stage.join(&identity.service)));
            }
            paths.push(config_path(&stage));
        }
        paths.push(config_path(&project));
        paths
    }
}

fn config_path(scope: &Path) -> PathBuf {
    scope.join(JOB_DIR).join(CONFIG_FILE)
}

/// Hex SHA-256 of the configuration file.
fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reject scope names that would resolve outside their parent directory.
fn check_component(kind: &str, value: &str) -> Result<(), CoreError> {
    let bad = value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
        || Path::new(value).is_absolute();
    if bad {
        return Err(CoreError::Configuration(format!(
            "invalid {kind} name '{value}'"
        )));
    }
    Ok(())
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn get_config(
        &self,
        identity: &EventIdentity,
        revision: Option<&str>,
    ) -> Result<FetchedConfig, CoreError> {
        if identity.project.is_empty() {
            return Err(CoreError::Configuration(
                "event carries no project".to_string(),
            ));
        }
        check_component("project", &identity.project)?;
        check_component("stage", &identity.stage)?;
        check_component("service", &identity.service)?;

        for path in self.candidates(identity) {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CoreError::Configuration(format!(
                        "cannot read {}: {e}",
                        path.display()
                    )));
                }
            };

            let config = Configuration::parse(&bytes)?;
            // Files carry no history; the event revision is recorded as-is.
            let revision_hash = revision
                .map(str::to_string)
                .unwrap_or_else(|| content_digest(&bytes));
            debug!(path = %path.display(), revision = %revision_hash, "configuration loaded");
            return Ok(FetchedConfig {
                config,
                revision_hash,
            });
        }

        Err(CoreError::Configuration(format!(
            "no {JOB_DIR}/{CONFIG_FILE} found for project '{}' stage '{}' service '{}'",
            identity.project, identity.stage, identity.service
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const CONFIG: &str = r#"
apiVersion: v2
actions:
  - name: "Run tests"
    events:
      - name: "sh.keptn.event.test.triggered"
    tasks:
      - name: "Hello"
        image: "alpine"
        cmd: ["echo"]
"#;

    fn identity(project: &str, stage: &str, service: &str) -> EventIdentity {
        EventIdentity {
            project: project.into(),
            stage: stage.into(),
            service: service.into(),
            ..Default::default()
        }
    }

    fn write(root: &Path, scope: &str, action: &str) {
        let dir = root.join(scope).join(JOB_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), CONFIG.replace("Run tests", action)).unwrap();
    }

    #[tokio::test]
    async fn most_specific_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "shop", "project");
        write(dir.path(), "shop/dev", "stage");
        write(dir.path(), "shop/dev/cart", "service");
        let source = FileConfigSource::new(dir.path());

        let got = source
            .get_config(&identity("shop", "dev", "cart"), None)
            .await
            .unwrap();
        assert_eq!(got.config.actions[0].name, "service");

        let got = source
            .get_config(&identity("shop", "dev", "billing"), None)
            .await
            .unwrap();
        assert_eq!(got.config.actions[0].name, "stage");

        let got = source
            .get_config(&identity("shop", "prod", "cart"), None)
            .await
            .unwrap();
        assert_eq!(got.config.actions[0].name, "project");
    }

    #[tokio::test]
    async fn revision_is_forwarded_or_derived_from_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "shop", "project");
        let source = FileConfigSource::new(dir.path());
        let id = identity("shop", "dev", "cart");

        let pinned = source.get_config(&id, Some("abc123")).await.unwrap();
        assert_eq!(pinned.revision_hash, "abc123");

        let first = source.get_config(&id, None).await.unwrap();
        let second = source.get_config(&id, None).await.unwrap();
        assert_eq!(
            first.revision_hash,
            hex::encode(Sha256::digest(fs::read(dir.path().join("shop/job/config.yaml")).unwrap()))
        );
        assert_eq!(first.revision_hash.len(), 64);
        assert_eq!(first.revision_hash, second.revision_hash);
    }

    #[tokio::test]
    async fn missing_or_broken_files_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileConfigSource::new(dir.path());

        let err = source
            .get_config(&identity("shop", "dev", "cart"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));

        let job = dir.path().join("shop").join(JOB_DIR);
        fs::create_dir_all(&job).unwrap();
        fs::write(job.join(CONFIG_FILE), "apiVersion: v1\nactions: []\n").unwrap();
        let err = source
            .get_config(&identity("shop", "dev", "cart"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[tokio::test]
    async fn scope_names_cannot_leave_the_root() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("root");
        fs::create_dir_all(&root).unwrap();
        write(base.path(), "evil", "injected");
        write(&root, "shop", "project");
        let source = FileConfigSource::new(&root);

        for id in [
            identity("../evil", "", ""),
            identity("shop", "..", ""),
            identity("shop", "dev", "../../../evil"),
            identity("/etc", "", ""),
            identity("shop", ".", ""),
            identity("a\\b", "", ""),
        ] {
            let err = source.get_config(&id, None).await.unwrap_err();
            assert!(matches!(err, CoreError::Configuration(_)), "{id:?}: {err:?}");
        }

        let got = source
            .get_config(&identity("shop", "dev", "cart"), None)
            .await
            .unwrap();
        assert_eq!(got.config.actions[0].name, "project");
    }
}
