//! Image allowlist checked before any job of an action is submitted.
//!
//! Patterns are globs: `*` matches any run of characters (including `/`), `?` one
//! character and `[...]` a character class (`[!...]` negated). References without a
//! registry are qualified against the default public registry first, so `alpine:3`
//! and `docker.io/library/alpine:3` are the same image.
use jexec_model::Action;
use regex::Regex;
use tracing::warn;

use crate::error::PolicyError;

/// Registry assumed for references that do not name one.
pub const DEFAULT_REGISTRY: &str = "docker.io";

const DEFAULT_REPOSITORY_PREFIX: &str = "library";

/// Compiled image allowlist.
#[derive(Debug, Clone)]
pub struct ImageFilter {
    patterns: Vec<Regex>,
    allow_all: bool,
}

impl ImageFilter {
    /// Compile `patterns`.
    ///
    /// An empty list or a literal `*` accepts every image.
    pub fn build<I, S>(patterns: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let raw: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if raw.is_empty() || raw.iter().any(|p| p == "*") {
            warn!("image allowlist accepts every image; restrict it in production");
            return Ok(Self::allow_all());
        }

        let patterns = raw
            .iter()
            .map(|p| compile_glob(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            allow_all: false,
        })
    }

    /// Filter accepting every image.
    pub fn allow_all() -> Self {
        Self {
            patterns: Vec::new(),
            allow_all: true,
        }
    }

    pub fn is_allow_all(&self) -> bool {
        self.allow_all
    }

    /// Whether `image` matches at least one pattern.
    pub fn contains(&self, image: &str) -> bool {
        if self.allow_all {
            return true;
        }
        let image = normalize_image(image.trim());
        self.patterns.iter().any(|re| re.is_match(&image))
    }

    /// Check every task image of `action`; the first rejected one is reported.
    pub fn check_action(&self, action: &Action) -> Result<(), PolicyError> {
        match action.tasks.iter().find(|t| !self.contains(&t.image)) {
            Some(task) => Err(PolicyError::ImageNotAllowed {
                task: task.name.clone(),
                image: task.image.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Qualify a reference lacking a registry against [`DEFAULT_REGISTRY`].
///
/// The first path component is a registry when it contains `.` or `:` or is `localhost`.
/// Single-component names live under `library/` on the default registry.
pub fn normalize_image(image: &str) -> String {
    match image.split_once('/') {
        None => format!("{DEFAULT_REGISTRY}/{DEFAULT_REPOSITORY_PREFIX}/{image}"),
        Some((first, _)) if is_registry(first) => image.to_string(),
        Some(_) => format!("{DEFAULT_REGISTRY}/{image}"),
    }
}

fn is_registry(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn compile_glob(pattern: &str) -> Result<Regex, PolicyError> {
    // A wildcard in the first of several components may stand for the registry itself.
    let pattern = match pattern.split_once('/') {
        Some((first, _)) if has_glob_meta(first) => pattern.to_string(),
        _ => normalize_image(pattern),
    };

    let invalid = |reason: &str| PolicyError::InvalidPattern {
        pattern: pattern.clone(),
        reason: reason.to_string(),
    };

    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    class.push(c);
                }
                if !closed {
                    return Err(invalid("unterminated character class"));
                }
                if class.is_empty() {
                    return Err(invalid("empty character class"));
                }
                re.push('[');
                let body = match class.strip_prefix('!') {
                    Some(rest) => {
                        re.push('^');
                        rest
                    }
                    None => class.as_str(),
                };
                // `&&`, `--` and `~~` are set operators inside regex classes.
                let body: Vec<char> = body.chars().collect();
                for (i, &c) in body.iter().enumerate() {
                    let dash_run = c == '-'
                        && ((i > 0 && body[i - 1] == '-') || body.get(i + 1) == Some(&'-'));
                    if dash_run || matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| invalid(&e.to_string()))
}
