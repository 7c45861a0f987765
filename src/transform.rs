//! Output transforms.
//!
//! A transform turns the raw line matched on a remote host into the value
//! reported for that host, e.g. `VERSION = (1, 8, 3, 'final', 0)` into
//! `1.8.3`. Transforms are looked up by the name a descriptor gives in its
//! `outputtransform` field.
//!
//! # Example
//!
//! ```
//! use fleetcheck::transform::TransformRegistry;
//!
//! let registry = TransformRegistry::builtin();
//! let django = registry.get("django-python").unwrap();
//!
//! assert_eq!(django.apply("VERSION = (1, 8, 3, 'final', 0)").unwrap(), "1.8.3");
//! assert!(registry.get("no-such-transform").is_err());
//! ```

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("invalid transform specified: {0}")]
    UnknownTransform(String),

    #[error("transform {name}: invalid input \"{input}\"")]
    InvalidInput { name: &'static str, input: String },
}

pub type TransformFn = fn(&str) -> Result<String, TransformError>;

/// A named transform resolved from the registry.
#[derive(Clone, Copy)]
pub struct Transform {
    name: &'static str,
    func: TransformFn,
}

impl Transform {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, line: &str) -> Result<String, TransformError> {
        (self.func)(line)
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// Name to function table, built once at startup and read-only afterwards.
pub struct TransformRegistry {
    table: BTreeMap<&'static str, TransformFn>,
}

impl TransformRegistry {
    /// Returns an empty registry. Use [`with`](Self::with) to add transforms.
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Returns the registry of all transforms shipped with fleetcheck.
    pub fn builtin() -> Self {
        Self::empty()
            .with("identity", identity)
            .with("django-python", django_python)
            .with("semver", semver_literal)
    }

    /// Adds a transform, replacing any previous one with the same name.
    pub fn with(mut self, name: &'static str, func: TransformFn) -> Self {
        self.table.insert(name, func);
        self
    }

    pub fn get(&self, name: &str) -> Result<Transform, TransformError> {
        self.table
            .get_key_value(name)
            .map(|(name, func)| Transform {
                name: *name,
                func: *func,
            })
            .ok_or_else(|| TransformError::UnknownTransform(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn identity(line: &str) -> Result<String, TransformError> {
    Ok(line.trim().to_string())
}

static DJANGO_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"= \((\S+), (\S+), (\S+),").expect("valid django regex"));

/// Django's `VERSION = (major, minor, micro, ...)` tuple.
fn django_python(line: &str) -> Result<String, TransformError> {
    let caps = DJANGO_VERSION
        .captures(line)
        .ok_or_else(|| TransformError::InvalidInput {
            name: "django-python",
            input: line.trim_end().to_string(),
        })?;
    Ok(format!("{}.{}.{}", &caps[1], &caps[2], &caps[3]))
}

static SEMVER_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?").expect("valid semver regex")
});

fn semver_literal(line: &str) -> Result<String, TransformError> {
    let invalid = || TransformError::InvalidInput {
        name: "semver",
        input: line.trim_end().to_string(),
    };
    let found = SEMVER_LITERAL.find(line).ok_or_else(invalid)?;
    let version = semver::Version::parse(found.as_str()).map_err(|_| invalid())?;
    Ok(version.to_string())
}
