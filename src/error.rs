//! Error taxonomy for the training engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the training engine. All of them are fatal for the run.
#[derive(Debug, Error)]
pub enum CtrnnError {
    /// A configuration value is out of range or inconsistent with the data.
    #[error("invalid configuration `{field}`: {reason}")]
    Configuration { field: String, reason: String },

    /// NaN or Inf appeared in activations, losses, gradients or tangent vectors.
    #[error("numerical failure: {context}")]
    Numerical { context: String },

    /// Reading or writing a checkpoint or config file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint or config file could not be encoded or decoded.
    #[error("cannot (de)serialize {}: {reason}", path.display())]
    Serialization { path: PathBuf, reason: String },
}

impl CtrnnError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn numerical(context: impl Into<String>) -> Self {
        Self::Numerical {
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CtrnnError>;

/// Fails with [`CtrnnError::Numerical`] unless every value is finite.
pub(crate) fn ensure_finite<'a, I>(values: I, context: impl FnOnce() -> String) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CtrnnError::numerical(context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_field() {
        let err = CtrnnError::config("optimizer.rho", "must be >= 0");
        assert_eq!(
            err.to_string(),
            "invalid configuration `optimizer.rho`: must be >= 0"
        );
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite(&[1.0, -2.0], || "ok".into()).is_ok());
        let err = ensure_finite(&[1.0, f64::NAN], || "context state".into()).unwrap_err();
        assert!(matches!(err, CtrnnError::Numerical { .. }));
    }
}
