//! Common model-level constants.
//!
//! Well-known keys and limits shared between the model, the engine and the job backend.

/// The only configuration document version understood by the parser.
pub const CONFIG_API_VERSION: &str = "v2";

/// Event type sentinel matching every incoming event type.
pub const EVENT_TYPE_WILDCARD: &str = "*";

/// Lower bound for `ttlSecondsAfterFinished`.
///
/// A finished job must outlive the log collection that follows its completion.
pub const MIN_TTL_SECONDS_AFTER_FINISHED: i32 = 60;

/// Upper bound of actions per configuration and tasks per action.
///
/// Both indices are encoded with three digits in job names.
pub const MAX_INDEX: usize = 999;

/// Identity variables appended to every task environment.
pub const ENV_EVENT_PROJECT: &str = "EVENT_PROJECT";
pub const ENV_EVENT_STAGE: &str = "EVENT_STAGE";
pub const ENV_EVENT_SERVICE: &str = "EVENT_SERVICE";
