use thiserror::Error;

/// Errors reported by chip construction and the output paths.
///
/// Register writes never fail: unknown addresses are ignored the way the
/// hardware ignores them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OplError {
    #[error("invalid chip configuration: {0}")]
    InvalidConfiguration(String),
    #[error("output buffer too small: need {needed} elements, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("could not parse chip configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OplError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = OplError::BufferTooSmall {
            needed: 1024,
            available: 10,
        };
        assert_eq!(
            err.to_string(),
            "output buffer too small: need 1024 elements, got 10"
        );

        let err = OplError::InvalidConfiguration("sample rate 0".into());
        assert!(err.to_string().contains("sample rate 0"));
    }
}
