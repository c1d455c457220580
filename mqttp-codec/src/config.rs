use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Codec settings a host application can embed in its own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    /// protocol version used until a CONNECT negotiates another one
    pub version: ProtocolVersion,
    /// Maximum remaining length accepted from the peer.
    ///
    /// `0` means unlimited.
    pub max_packet_size: u32,
}

impl CodecConfig {
    pub fn new(version: ProtocolVersion) -> Self {
        CodecConfig { version, max_packet_size: 0 }
    }

    #[inline]
    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }
}
