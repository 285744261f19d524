pub mod backend;
pub mod collab;
pub mod engine;
pub mod env;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod settings;

pub use engine::{EventHandler, HandleOutcome};
pub use metrics::{JobOutcome, MetricsBackend, MetricsHandle};

pub mod prelude {
    pub use crate::backend::{Connector, JobBackend, JobPhase, JobRequest, WaitOptions};
    pub use crate::collab::{ConfigSource, FetchedConfig, IntegrationRegistry, OutcomeSink};
    pub use crate::engine::{EventHandler, HandleOutcome};
    pub use crate::env::{ResolvedEnv, SecretSource};
    pub use crate::error::{CoreError, EnvError, JobError, PolicyError};
    pub use crate::policy::ImageFilter;
    pub use crate::settings::JobSettings;
}
