use thiserror::Error;

/// Errors raised while assembling the client's local configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `$HOME` nor the current-user record yields a home directory.
    #[error(
        "not able to determine the user's cache directory; is `$HOME` or `$USER` part of the program environment?"
    )]
    HomeDirUnavailable,
}
