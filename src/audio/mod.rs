pub mod capture;
pub mod decode;
pub mod features;
pub mod file_source;
pub mod slot;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no default audio input device available")]
    NoDevice,
    #[error("audio device '{0}' not found (see --list-devices)")]
    DeviceNotFound(String),
    #[error("failed to enumerate audio devices: {0}")]
    Enumerate(String),
    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to open input stream on '{device}': {reason}")]
    StreamBuild { device: String, reason: String },
    #[error("failed to start input stream: {0}")]
    StreamPlay(String),
}

/// Something feeding sample blocks through a [`slot::BlockSender`]
pub trait AudioSource {
    fn describe(&self) -> String;

    /// True once a finite source has delivered its last block
    fn exhausted(&self) -> bool {
        false
    }

    /// Stop delivering blocks. Idempotent.
    fn close(&mut self) -> anyhow::Result<()>;
}
