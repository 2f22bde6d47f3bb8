//! # Packager Error Handling
//!
//! Structured error type shared by every public operation of the packager
//! core. Each variant corresponds to one failure class of the planning and
//! emission pipeline; none of them is recovered internally — a failure
//! aborts the current operation and partial output is discarded by the
//! caller (the track assembler additionally guarantees that a failed batch
//! leaves no tracks behind).
//!
//! Binaries and tests wrap these in `anyhow::Result` at the surface; the
//! library itself always speaks [`PackerError`].

use std::fmt;
use std::io;

use omaf_hevc::ParamSetError;

/// Errors produced by the packager core.
#[derive(Debug)]
pub enum PackerError {
    /// A required input was absent or empty.
    NullInput { what: String },
    /// Viewport angles outside the sphere's valid ranges.
    InvalidViewport { yaw: f32, pitch: f32 },
    /// An SPS/PPS could not be parsed or rewritten.
    InvalidParameterSet { reason: String },
    /// The viewport-math backend failed an operation.
    ViewportMathFailure { operation: String, reason: String },
    /// A packed layout could not be produced or exceeds decoder limits.
    LayoutFailure { reason: String },
    /// The packing-generator plugin was missing or refused the request.
    PluginFailure { plugin: String, reason: String },
    /// A stream index was not present in the stream set.
    StreamNotFound { stream_id: u8 },
    /// The declared video stream count does not match the streams supplied.
    InvalidVideoCount { declared: u8, found: u8 },
    /// The MPD document could not be serialised.
    XmlCreateFailure { reason: String },
    /// The output directory could not be created.
    CreateFolderFailure { path: String, source: io::Error },
    /// Wall-clock time was unavailable or unrepresentable.
    InvalidTime { reason: String },
    /// The MPD file expected on disk during a live refresh was missing.
    RealpathFailure { path: String, source: io::Error },
}

impl PackerError {
    pub fn null_input(what: impl Into<String>) -> Self {
        Self::NullInput { what: what.into() }
    }

    pub fn invalid_viewport(yaw: f32, pitch: f32) -> Self {
        Self::InvalidViewport { yaw, pitch }
    }

    pub fn viewport_math(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ViewportMathFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn layout(reason: impl Into<String>) -> Self {
        Self::LayoutFailure { reason: reason.into() }
    }

    pub fn plugin(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginFailure {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    pub fn xml(reason: impl Into<String>) -> Self {
        Self::XmlCreateFailure { reason: reason.into() }
    }

    pub fn invalid_time(reason: impl Into<String>) -> Self {
        Self::InvalidTime { reason: reason.into() }
    }

    /// Stable kind name, used in logs and by tests that assert on failure
    /// classes without matching variant payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NullInput { .. } => "null_input",
            Self::InvalidViewport { .. } => "invalid_viewport",
            Self::InvalidParameterSet { .. } => "invalid_parameter_set",
            Self::ViewportMathFailure { .. } => "viewport_math_failure",
            Self::LayoutFailure { .. } => "layout_failure",
            Self::PluginFailure { .. } => "plugin_failure",
            Self::StreamNotFound { .. } => "stream_not_found",
            Self::InvalidVideoCount { .. } => "invalid_video_count",
            Self::XmlCreateFailure { .. } => "xml_create_failure",
            Self::CreateFolderFailure { .. } => "create_folder_failure",
            Self::InvalidTime { .. } => "invalid_time",
            Self::RealpathFailure { .. } => "realpath_failure",
        }
    }
}

impl fmt::Display for PackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullInput { what } => write!(f, "missing input: {what}"),
            Self::InvalidViewport { yaw, pitch } => {
                write!(f, "viewport (yaw {yaw}, pitch {pitch}) outside the sphere")
            }
            Self::InvalidParameterSet { reason } => {
                write!(f, "parameter set rejected: {reason}")
            }
            Self::ViewportMathFailure { operation, reason } => {
                write!(f, "viewport math failed during {operation}: {reason}")
            }
            Self::LayoutFailure { reason } => write!(f, "packed layout failed: {reason}"),
            Self::PluginFailure { plugin, reason } => {
                write!(f, "packing generator '{plugin}' failed: {reason}")
            }
            Self::StreamNotFound { stream_id } => {
                write!(f, "stream {stream_id} not found in the stream set")
            }
            Self::InvalidVideoCount { declared, found } => {
                write!(f, "declared {declared} video streams, found {found}")
            }
            Self::XmlCreateFailure { reason } => write!(f, "MPD serialisation failed: {reason}"),
            Self::CreateFolderFailure { path, source } => {
                write!(f, "failed to create output folder '{path}': {source}")
            }
            Self::InvalidTime { reason } => write!(f, "invalid wall-clock time: {reason}"),
            Self::RealpathFailure { path, source } => {
                write!(f, "MPD file '{path}' unavailable for refresh: {source}")
            }
        }
    }
}

impl std::error::Error for PackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateFolderFailure { source, .. } | Self::RealpathFailure { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

impl From<ParamSetError> for PackerError {
    fn from(err: ParamSetError) -> Self {
        Self::InvalidParameterSet { reason: err.to_string() }
    }
}

/// Result type alias used across the packager core.
pub type PackerResult<T> = Result<T, PackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(PackerError::null_input("streams").kind(), "null_input");
        assert_eq!(PackerError::invalid_viewport(200.0, 0.0).kind(), "invalid_viewport");
        assert_eq!(
            PackerError::StreamNotFound { stream_id: 3 }.kind(),
            "stream_not_found"
        );
    }

    #[test]
    fn param_set_errors_map_to_invalid_parameter_set() {
        let err: PackerError = ParamSetError::InvalidSps("truncated".into()).into();
        assert_eq!(err.kind(), "invalid_parameter_set");
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn io_sources_are_chained() {
        let err = PackerError::CreateFolderFailure {
            path: "/nonexistent/out".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
