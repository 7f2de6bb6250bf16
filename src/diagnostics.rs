//! User-facing diagnostics
//!
//! Contract-level failures (bad config, unknown resource types, provider
//! errors) never fail the RPC itself. They travel back as diagnostics inside
//! an otherwise successful response, optionally pointing at the attribute
//! they concern.

use std::fmt;

use serde::Serialize;

use crate::proto;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The operation failed
    Error,
    /// The operation succeeded but something deserves attention
    Warning,
}

/// One step of an [`AttributePath`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStep {
    /// Attribute of an object
    AttributeName(String),
    /// Element of a map
    ElementKeyString(String),
    /// Element of a list or tuple
    ElementKeyInt(i64),
}

/// Location of a value inside a configuration or state object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributePath {
    steps: Vec<PathStep>,
}

impl AttributePath {
    /// The root of the value
    pub fn root() -> Self {
        Self::default()
    }

    /// Path to a top-level attribute
    pub fn attribute_root(name: impl Into<String>) -> Self {
        Self::root().attribute(name)
    }

    /// Step into an attribute
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.steps.push(PathStep::AttributeName(name.into()));
        self
    }

    /// Step into a map element
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(PathStep::ElementKeyString(key.into()));
        self
    }

    /// Step into a list element
    pub fn index(mut self, index: i64) -> Self {
        self.steps.push(PathStep::ElementKeyInt(index));
        self
    }

    /// Steps from the root
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("(root)");
        }
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::AttributeName(name) if i == 0 => write!(f, "{}", name)?,
                PathStep::AttributeName(name) => write!(f, ".{}", name)?,
                PathStep::ElementKeyString(key) => write!(f, "[{:?}]", key)?,
                PathStep::ElementKeyInt(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A problem reported to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// One-line summary
    pub summary: String,
    /// Longer explanation
    pub detail: String,
    /// Attribute the diagnostic refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Attach the attribute the diagnostic refers to
    pub fn with_attribute(mut self, path: AttributePath) -> Self {
        self.attribute = (!path.is_root()).then_some(path);
        self
    }

    /// Whether this is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", level, self.summary)?;
        if let Some(path) = &self.attribute {
            write!(f, " (at {})", path)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Whether any diagnostic is an error
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

// =============================================================================
// Wire conversions
// =============================================================================

impl From<PathStep> for proto::attribute_path::Step {
    fn from(step: PathStep) -> Self {
        use proto::attribute_path::step::Selector;

        let selector = match step {
            PathStep::AttributeName(name) => Selector::AttributeName(name),
            PathStep::ElementKeyString(key) => Selector::ElementKeyString(key),
            PathStep::ElementKeyInt(index) => Selector::ElementKeyInt(index),
        };
        Self {
            selector: Some(selector),
        }
    }
}

impl From<AttributePath> for proto::AttributePath {
    fn from(path: AttributePath) -> Self {
        Self {
            steps: path.steps.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<proto::AttributePath> for AttributePath {
    fn from(path: proto::AttributePath) -> Self {
        use proto::attribute_path::step::Selector;

        let steps = path
            .steps
            .into_iter()
            .filter_map(|step| step.selector)
            .map(|selector| match selector {
                Selector::AttributeName(name) => PathStep::AttributeName(name),
                Selector::ElementKeyString(key) => PathStep::ElementKeyString(key),
                Selector::ElementKeyInt(index) => PathStep::ElementKeyInt(index),
            })
            .collect();
        Self { steps }
    }
}

impl From<Diagnostic> for proto::Diagnostic {
    fn from(diag: Diagnostic) -> Self {
        let severity = match diag.severity {
            Severity::Error => proto::diagnostic::Severity::Error,
            Severity::Warning => proto::diagnostic::Severity::Warning,
        };
        Self {
            severity: severity as i32,
            summary: diag.summary,
            detail: diag.detail,
            attribute: diag.attribute.map(Into::into),
        }
    }
}

impl From<proto::Diagnostic> for Diagnostic {
    fn from(diag: proto::Diagnostic) -> Self {
        // INVALID is treated as an error so it is never silently dropped
        let severity = match proto::diagnostic::Severity::try_from(diag.severity) {
            Ok(proto::diagnostic::Severity::Warning) => Severity::Warning,
            _ => Severity::Error,
        };
        Self {
            severity,
            summary: diag.summary,
            detail: diag.detail,
            attribute: diag.attribute.map(Into::into),
        }
    }
}

/// Convert diagnostics for a response
pub fn to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics.into_iter().map(Into::into).collect()
}
