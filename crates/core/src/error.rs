/// Errors produced while building a [`DispatcherConfig`](crate::DispatcherConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Worker size must be at least 1")]
    ZeroWorkers,
}
