use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use jexec_core::{
    backend::{Connector, JobBackend, JobPhase, JobRequest},
    env::{SecretSource, resolve_env},
    error::{CoreError, EnvError, JobError},
};
use k8s_openapi::api::{
    batch::v1::Job,
    core::v1::{Event, Pod, Secret},
};
use kube::{
    Api, Client,
    api::{ListParams, LogParams, PostParams},
};
use tracing::{debug, instrument, warn};

use crate::{
    BACKEND_NAME, KubeError, diagnostics::format_warnings, spec::TASK_CONTAINER, spec::build_job,
    status::job_phase,
};

/// Connects with the ambient configuration (in-cluster service account or kubeconfig).
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConnector;

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self) -> Result<Arc<dyn JobBackend>, CoreError> {
        let client = Client::try_default().await.map_err(KubeError::from)?;
        let version = client
            .apiserver_version()
            .await
            .map_err(|e| KubeError::Unreachable(e.to_string()))?;
        debug!(version = %version.git_version, "connected to kubernetes");
        Ok(Arc::new(KubeBackend::new(client)))
    }
}

/// Job lifecycle on one cluster.
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn pod_names(&self, job: &str, namespace: &str) -> Result<Vec<String>, KubeError> {
        let pods = self
            .api::<Pod>(namespace)
            .list(&ListParams::default().labels(&format!("job-name={job}")))
            .await?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|p| p.metadata.name)
            .collect())
    }

    async fn events_for(&self, object: &str, namespace: &str) -> Result<Vec<Event>, KubeError> {
        let events = self
            .api::<Event>(namespace)
            .list(&ListParams::default().fields(&format!("involvedObject.name={object}")))
            .await?;
        Ok(events.items)
    }
}

#[async_trait]
impl JobBackend for KubeBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    #[instrument(level = "debug", skip(self, req), fields(job = %req.name))]
    async fn create_job(&self, req: &JobRequest) -> Result<(), JobError> {
        let namespace = req.namespace();
        let env = resolve_env(
            &req.details.task,
            &req.identity,
            &req.payload,
            namespace,
            self,
        )
        .await?;
        let job = build_job(req, &env)?;

        self.api::<Job>(namespace)
            .create(&PostParams::default(), &job)
            .await
            .map_err(KubeError::from)?;
        Ok(())
    }

    async fn job_phase(&self, name: &str, namespace: &str) -> Result<JobPhase, JobError> {
        let job = self
            .api::<Job>(namespace)
            .get(name)
            .await
            .map_err(KubeError::from)?;
        Ok(job_phase(&job))
    }

    async fn job_logs(&self, name: &str, namespace: &str) -> Result<String, JobError> {
        let pods = self.api::<Pod>(namespace);
        let params = LogParams {
            container: Some(TASK_CONTAINER.to_string()),
            ..Default::default()
        };

        let mut logs = String::new();
        for pod in self.pod_names(name, namespace).await? {
            let chunk = pods.logs(&pod, &params).await.map_err(KubeError::from)?;
            logs.push_str(&chunk);
        }
        Ok(logs)
    }

    async fn failed_diagnostics(&self, name: &str, namespace: &str) -> Result<String, JobError> {
        let mut objects = vec![name.to_string()];
        match self.pod_names(name, namespace).await {
            Ok(pods) => objects.extend(pods),
            Err(e) => warn!(job = name, error = %e, "cannot list pods of job"),
        }

        let mut events = Vec::new();
        for object in &objects {
            events.extend(self.events_for(object, namespace).await?);
        }
        Ok(format_warnings(&events))
    }
}

#[async_trait]
impl SecretSource for KubeBackend {
    async fn secret_keys(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Vec<String>>, EnvError> {
        let secret = self
            .api::<Secret>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| EnvError::SecretLookup(e.to_string()))?;
        Ok(secret.as_ref().map(secret_keys))
    }
}

/// Key names of `secret`, sorted and deduplicated.
fn secret_keys(secret: &Secret) -> Vec<String> {
    let data = secret.data.iter().flat_map(|d| d.keys());
    let string_data = secret.string_data.iter().flat_map(|d| d.keys());
    data.chain(string_data)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use k8s_openapi::ByteString;

    #[test]
    fn secret_keys_are_sorted_and_merged() {
        let secret = Secret {
            data: Some(BTreeMap::from([
                ("user".to_string(), ByteString(b"admin".to_vec())),
                ("password".to_string(), ByteString(b"s3cret".to_vec())),
            ])),
            string_data: Some(BTreeMap::from([
                ("api-token".to_string(), "t".to_string()),
                ("user".to_string(), "admin".to_string()),
            ])),
            ..Default::default()
        };

        assert_eq!(secret_keys(&secret), vec!["api-token", "password", "user"]);
    }

    #[test]
    fn empty_secret_has_no_keys() {
        assert!(secret_keys(&Secret::default()).is_empty());
    }
}
