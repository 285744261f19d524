mod domain;
pub use domain::*;

mod error;
pub use error::{ModelError, ModelResult};

pub mod config;
pub use config::{Action, ActionEvent, Configuration, EnvEntry, Task, ValueSource};

pub mod event;
pub use event::{CloudEvent, EventIdentity};

pub mod jsonpath;
pub use jsonpath::{JsonPath, JsonPathError};

pub mod outcome;
pub use outcome::{OutcomeEvent, Status, Verdict};
