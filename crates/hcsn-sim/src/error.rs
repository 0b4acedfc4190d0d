//! Error types for the simulator binary.
//!
//! [`SimError`] is the top-level error type that wraps all possible
//! failure modes during startup, the run and the export of its logs.

/// Top-level error for the simulator binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: hcsn_core::config::ConfigError,
    },

    /// The engine rejected its configuration.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: hcsn_core::engine::EngineError,
    },

    /// Writing the run outputs failed.
    #[error("export error: {source}")]
    Export {
        /// The underlying export error.
        #[from]
        source: hcsn_core::export::ExportError,
    },

    /// Creating the output directory failed.
    #[error("output directory {path}: {source}")]
    OutputDir {
        /// The directory that could not be created.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
