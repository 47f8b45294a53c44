//! Crate-wide error type.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;

/// Errors produced by the platform adapters.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The host OS is not the one this adapter set supports.
    #[error("platform unsupported: these adapters require macOS, host is {os}")]
    Unsupported { os: String },

    /// A native resource (window, image buffer, run loop) could not be created.
    #[error("failed to create {resource}: {reason}")]
    ResourceCreation {
        resource: &'static str,
        reason: String,
    },

    /// `set_size` was asked for more than the backing store holds.
    #[error("size {width}x{height} exceeds the allocated maximum {max_width}x{max_height}")]
    SizeExceedsMaximum {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    /// The key notifier helper could not be launched.
    #[error("failed to launch helper '{}': {source}", path.display())]
    HelperLaunch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Signalling the helper failed for a reason other than it being gone.
    #[error("failed to signal helper process {pid}: {source}")]
    HelperSignal {
        pid: u32,
        #[source]
        source: Errno,
    },

    /// The key listener endpoint could not be registered.
    #[error("failed to register key listener at '{}': {source}", path.display())]
    Registration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Only one native event loop may exist per process.
    #[error("the native event loop has already been claimed by this process")]
    EventLoopInUse,

    /// A notification line from the helper could not be parsed.
    #[error("malformed notification: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("clipboard: {0}")]
    Clipboard(#[from] arboard::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_names_the_host() {
        let err = PlatformError::Unsupported { os: "linux".into() };
        assert!(err.to_string().contains("linux"));
    }

    #[test]
    fn size_error_reports_both_sizes() {
        let err = PlatformError::SizeExceedsMaximum {
            width: 300,
            height: 20,
            max_width: 200,
            max_height: 150,
        };
        assert_eq!(
            err.to_string(),
            "size 300x20 exceeds the allocated maximum 200x150"
        );
    }
}
