use serde::Deserialize;

// Block size 16KB is recommend by document, but many clients accept up to 128KB.
// https://www.bittorrent.org/beps/bep_0003.html#peer-messages
const DEFAULT_MAX_BLOCK_LENGTH: u32 = 128 * 1024;
const DEFAULT_MAX_FRAME_LENGTH: u32 = 2 * 1024 * 1024;
const DEFAULT_MAX_UPLOAD_QUEUE: usize = 256;

/// Limits applied to the messages of a single peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Largest frame (id + payload) the codec will buffer.
    pub max_frame_length: u32,
    /// Largest block a peer may request from us.
    pub max_block_length: u32,
    /// How many requests from the peer are kept before new ones are dropped.
    pub max_upload_queue: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_block_length: DEFAULT_MAX_BLOCK_LENGTH,
            max_upload_queue: DEFAULT_MAX_UPLOAD_QUEUE,
        }
    }
}

impl WireConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
