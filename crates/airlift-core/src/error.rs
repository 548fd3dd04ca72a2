//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("flight produced no resources")]
    EmptyManifest,

    #[error("invalid resource: {message}")]
    InvalidResource { message: String },

    #[error("failed to parse document {index}: {message}")]
    Document { index: usize, message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Ordered aggregation of failures collected within a single phase.
///
/// Batched phases (dry run, apply, orphan sweep, ownership validation) run
/// every item and report everything that went wrong at once, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiError {
    label: String,
    errors: Vec<String>,
}

impl MultiError {
    /// Build from collected error messages. Returns `None` when there is
    /// nothing to report, so call sites can write `if let Some(err)`.
    pub fn from_errors(label: impl Into<String>, errors: Vec<String>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(Self {
            label: label.into(),
            errors,
        })
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.label.is_empty(), self.errors.len()) {
            (true, 1) => write!(f, "{}", self.errors[0]),
            (false, 1) => write!(f, "{}: {}", self.label, self.errors[0]),
            (true, _) => write!(f, "{}", self.errors.join("\n")),
            (false, _) => {
                writeln!(f, "{}:", self.label)?;
                for (i, err) in self.errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "  - {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errors_empty_is_none() {
        assert!(MultiError::from_errors("dry run", vec![]).is_none());
    }

    #[test]
    fn test_single_error_renders_inline() {
        let err = MultiError::from_errors("dry run", vec!["boom".to_string()]).unwrap();
        assert_eq!(err.to_string(), "dry run: boom");
    }

    #[test]
    fn test_multiple_errors_render_in_order() {
        let err = MultiError::from_errors(
            "conflict(s)",
            vec!["first".to_string(), "second".to_string()],
        )
        .unwrap();
        let rendered = err.to_string();
        assert!(rendered.starts_with("conflict(s):"));
        let first = rendered.find("first").unwrap();
        let second = rendered.find("second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_unlabelled_errors() {
        let err =
            MultiError::from_errors("", vec!["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(err.to_string(), "a\nb");
    }
}
