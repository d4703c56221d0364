//! Identity encoding for cross-node transport.
//!
//! Profiles leave the process inside session payloads (a shared session
//! store, a clustered map). [`IdentityCodec`] is the seam; the default
//! [`FramedJsonCodec`] writes a 4-byte big-endian length followed by the
//! JSON document.

use crate::error::{Error, Result};
use crate::profile::ProfileSet;

const LENGTH_PREFIX: usize = 4;

/// Encodes a [`ProfileSet`] into bytes and back.
pub trait IdentityCodec: Send + Sync + 'static {
    /// Encode the profiles.
    fn encode(&self, profiles: &ProfileSet) -> Result<Vec<u8>>;

    /// Decode profiles previously produced by [`IdentityCodec::encode`].
    fn decode(&self, bytes: &[u8]) -> Result<ProfileSet>;
}

/// Length-prefixed JSON framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedJsonCodec;

impl IdentityCodec for FramedJsonCodec {
    fn encode(&self, profiles: &ProfileSet) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(profiles)?;
        let len = u32::try_from(json.len())
            .map_err(|_| Error::codec(format!("identity payload too large: {} bytes", json.len())))?;
        let mut frame = Vec::with_capacity(LENGTH_PREFIX + json.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&json);
        Ok(frame)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ProfileSet> {
        let Some((prefix, payload)) = bytes.split_first_chunk::<LENGTH_PREFIX>() else {
            return Err(Error::codec(format!(
                "frame shorter than length prefix: {} bytes",
                bytes.len()
            )));
        };
        let declared = u32::from_be_bytes(*prefix) as usize;
        if payload.len() != declared {
            return Err(Error::codec(format!(
                "frame declares {declared} bytes but carries {}",
                payload.len()
            )));
        }
        Ok(serde_json::from_slice(payload)?)
    }
}
