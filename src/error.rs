use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the playback, capture, and export engines and by the
/// session controller.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Audio device could not be found, opened, read from, or written to
    #[error("audio device error: {0}")]
    Device(String),

    /// Source file is not a container/codec we can decode
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// File could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operation requested without its preconditions (user-visible message)
    #[error("{0}")]
    InvalidState(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl AudioError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Map a hound error raised while reading `path`.
    pub fn from_wav_read(path: impl AsRef<Path>, err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Self::io(path, e),
            other => Self::UnsupportedFormat(format!("{}: {}", path.as_ref().display(), other)),
        }
    }

    /// Map a hound error raised while writing `path`. Every write failure is an I/O failure.
    pub fn from_wav_write(path: impl AsRef<Path>, err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Self::io(path, e),
            other => Self::io(path, io::Error::other(other)),
        }
    }

    /// Map a symphonia error raised while probing or decoding `path`.
    pub fn from_decode(path: impl AsRef<Path>, err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymphoniaError;

        match err {
            SymphoniaError::IoError(e) => Self::io(path, e),
            other => Self::UnsupportedFormat(format!("{}: {}", path.as_ref().display(), other)),
        }
    }

    /// True for errors caused by a missing precondition rather than a failure.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = AudioError::io(
            "recordings/out.wav",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("recordings/out.wav"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_wav_read_format_error_is_unsupported() {
        let err = AudioError::from_wav_read("x.wav", hound::Error::FormatError("no RIFF tag found"));
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_wav_write_errors_are_io() {
        let err = AudioError::from_wav_write("x.wav", hound::Error::TooWide);
        assert!(matches!(err, AudioError::Io { .. }));
    }

    #[test]
    fn test_invalid_state_displays_message_verbatim() {
        let err = AudioError::InvalidState("Please import an audio file.".to_string());
        assert_eq!(err.to_string(), "Please import an audio file.");
        assert!(err.is_invalid_state());
    }
}
