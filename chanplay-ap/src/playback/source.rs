//! Leaf pipeline stage over a raw byte stream

use super::AudioStream;
use crate::error::{Error, Result};

/// Raw source stream; can be opened once
pub struct SourcePlayback {
    stream: Option<AudioStream>,
    opened: bool,
}

impl SourcePlayback {
    pub fn new(stream: AudioStream) -> Self {
        Self {
            stream: Some(stream),
            opened: false,
        }
    }

    pub(super) fn open(&mut self) -> Result<AudioStream> {
        match self.stream.take() {
            Some(stream) => {
                self.opened = true;
                Ok(stream)
            }
            None if self.opened => Err(Error::Playback(
                "source stream already consumed; wrap with a cache to read twice".to_string(),
            )),
            None => Err(Error::Playback("source stream released".to_string())),
        }
    }

    pub(super) fn dispose(&mut self) {
        self.stream = None;
    }
}
