//! Error types and result aliases shared by ratewall crates.

/// The result type used throughout ratewall-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or setting up the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value was missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_display() {
        let err = Error::configuration("LOG_LEVEL must be a level name");
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("LOG_LEVEL"));
    }
}
