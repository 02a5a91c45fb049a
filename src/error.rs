/// Crate-level error types for the outer surfaces: scanning, configuration, markdown parsing.
///
/// Reference resolution itself never fails; its problems are reported as
/// [`crate::diagnostics::Diagnostic`] values instead.
use std::path::PathBuf;

/// Every fatal error names the file, path, or reason for failure so it can be
/// rendered as a useful diagnostic without a debugger.
#[allow(clippy::error_impl_error, reason = "crate-level error type")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration layer parsed as TOML but holds an unusable value.
    #[error("invalid configuration in {}: {reason}", path.display())]
    ConfigInvalid {
        /// File the configuration was read from.
        path: PathBuf,
        /// What is wrong with the value.
        reason: String,
    },

    /// The directory handed to the scanner does not exist.
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound {
        /// Path to the missing directory.
        path: PathBuf,
    },

    /// A virtual path could not be parsed.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath {
        /// The literal path text.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization of a resolved tree failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// A markdown source could not be parsed.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A built-in markup pattern failed to compile.
    #[error("pattern: {0}")]
    Pattern(
        /// The wrapped regex error.
        #[from]
        regex::Error,
    ),

    /// TOML deserialization failed.
    #[error("toml deserialize in {}: {source}", path.display())]
    TomlDe {
        /// File holding the malformed TOML.
        path: PathBuf,
        /// The wrapped TOML deserialization error.
        source: toml::de::Error,
    },

    /// Walking the input directory failed.
    #[error("walk: {0}")]
    Walk(
        /// The wrapped directory walk error.
        #[from]
        walkdir::Error,
    ),

    /// The filesystem watcher could not be set up.
    #[error("watch failed: {reason}")]
    WatchFailed {
        /// Description of the watcher failure.
        reason: String,
    },
}
