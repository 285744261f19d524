use serde::{Deserialize, Serialize};

use crate::{ModelError, jsonpath::JsonPath};

/// Where an environment value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// JSONPath evaluated against the triggering event.
    Event(JsonPath),
    /// Every key of the cluster secret named after the entry.
    Secret,
    /// Literal value used verbatim.
    Literal(String),
    /// Declaration no value can be produced from.
    ///
    /// Parsing keeps it so the rest of the configuration stays usable; resolving the
    /// task environment fails with `reason`.
    Invalid {
        value_from: String,
        value: String,
        reason: String,
    },
}

impl ValueSource {
    /// Keyword used for this source in configuration documents.
    pub fn keyword(&self) -> &str {
        match self {
            ValueSource::Event(_) => "event",
            ValueSource::Secret => "secret",
            ValueSource::Literal(_) => "string",
            ValueSource::Invalid { value_from, .. } => value_from,
        }
    }
}

/// Environment entry declared on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEnv", into = "RawEnv")]
pub struct EnvEntry {
    name: String,
    source: ValueSource,
}

impl EnvEntry {
    /// Literal `name=value` entry.
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ValueSource::Literal(value.into()),
        }
    }

    /// Entry whose value is taken from the event at `path`.
    pub fn from_event(name: impl Into<String>, path: &str) -> Result<Self, ModelError> {
        Ok(Self {
            name: name.into(),
            source: ValueSource::Event(JsonPath::parse(path)?),
        })
    }

    /// Entry importing every key of the secret called `name`.
    pub fn from_secret(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ValueSource::Secret,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ValueSource {
        &self.source
    }
}

/// Wire shape of an env entry: `{name, value, valueFrom}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnv {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    value_from: String,
}

impl From<RawEnv> for EnvEntry {
    fn from(raw: RawEnv) -> Self {
        let source = match raw.value_from.trim() {
            "event" => match JsonPath::parse(&raw.value) {
                Ok(path) => ValueSource::Event(path),
                Err(e) => ValueSource::Invalid {
                    reason: e.to_string(),
                    value_from: raw.value_from,
                    value: raw.value,
                },
            },
            "secret" => ValueSource::Secret,
            "string" => ValueSource::Literal(raw.value),
            // Without a source only plain literals are accepted.
            "" if !raw.value.trim_start().starts_with('$') => ValueSource::Literal(raw.value),
            other => ValueSource::Invalid {
                reason: ModelError::UnknownValueSource {
                    name: raw.name.clone(),
                    value_from: other.to_string(),
                }
                .to_string(),
                value_from: raw.value_from,
                value: raw.value,
            },
        };
        Self {
            name: raw.name,
            source,
        }
    }
}

impl From<EnvEntry> for RawEnv {
    fn from(e: EnvEntry) -> Self {
        let value_from = e.source.keyword().to_string();
        let value = match e.source {
            ValueSource::Event(path) => path.as_str().to_string(),
            ValueSource::Secret => String::new(),
            ValueSource::Literal(v) => v,
            ValueSource::Invalid { value, .. } => value,
        };
        RawEnv {
            name: e.name,
            value,
            value_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<EnvEntry, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn parses_each_source() {
        let e = parse("{name: HOST, value: $.data.deployment.url, valueFrom: event}").unwrap();
        assert!(matches!(e.source(), ValueSource::Event(p) if p.as_str() == "$.data.deployment.url"));

        let e = parse("{name: db-credentials, valueFrom: secret}").unwrap();
        assert_eq!(e.source(), &ValueSource::Secret);

        let e = parse("{name: MODE, value: fast, valueFrom: string}").unwrap();
        assert_eq!(e.source(), &ValueSource::Literal("fast".into()));
    }

    #[test]
    fn missing_source_is_literal_for_plain_values() {
        let e = parse("{name: MODE, value: fast}").unwrap();
        assert_eq!(e.source(), &ValueSource::Literal("fast".into()));
    }

    #[test]
    fn missing_source_with_jsonpath_value_is_kept_as_invalid() {
        let e = parse("{name: HOST, value: $.data.url}").unwrap();
        assert!(
            matches!(e.source(), ValueSource::Invalid { reason, .. } if reason.contains("unknown value source"))
        );
    }

    #[test]
    fn unknown_source_is_kept_as_invalid() {
        let e = parse("{name: HOST, value: x, valueFrom: vault}").unwrap();
        match e.source() {
            ValueSource::Invalid { value_from, reason, .. } => {
                assert_eq!(value_from, "vault");
                assert!(reason.contains("vault"), "{reason}");
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn invalid_event_path_is_kept_as_invalid() {
        let e = parse("{name: HOST, value: data.url, valueFrom: event}").unwrap();
        assert!(matches!(e.source(), ValueSource::Invalid { value_from, .. } if value_from == "event"));
    }

    #[test]
    fn invalid_entries_serialize_back_unchanged() {
        let e = parse("{name: HOST, value: x, valueFrom: vault}").unwrap();
        let yaml = serde_yaml::to_string(&e).unwrap();
        assert_eq!(parse(&yaml).unwrap(), e);
    }
}
