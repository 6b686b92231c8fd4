pub mod backend;
pub mod capture;
pub mod device;
pub mod file;
pub mod host;
pub mod playback;
pub mod resample;
pub mod stop;

pub use backend::{
    AudioFrame, AudioHost, BitDepth, CaptureBackend, DeviceChoice, PlaybackBackend, StreamSpec,
};
pub use capture::{chunk_count, timestamped_path, CaptureConfig, ChunkAssembler, Recorder, Recording};
pub use device::{list_devices, try_list_devices, AudioDevice, DeviceCatalog};
pub use file::{calculate_duration, AudioFile};
pub use host::{CpalCapture, CpalHost, CpalPlayback};
pub use playback::{PlaybackConfig, PlaybackReport, Player};
pub use resample::resample_mono;
pub use stop::StopSignal;
