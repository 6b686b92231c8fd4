pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod spectrogram;

pub use audio::{
    calculate_duration, list_devices, try_list_devices, AudioDevice, AudioFile, AudioFrame,
    AudioHost, CaptureBackend, CaptureConfig, CpalHost, DeviceCatalog, DeviceChoice,
    PlaybackBackend, PlaybackConfig, PlaybackReport, Player, Recorder, Recording, StopSignal,
    StreamSpec,
};
pub use config::Config;
pub use error::{AudioError, AudioResult};
pub use session::{Session, SessionConfig, SessionReport, SessionState, SessionStats};
pub use spectrogram::{export_spectrogram, SpectrogramConfig, SpectrogramExporter};
