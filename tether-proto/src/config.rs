//! Codec tuning knobs and JSON persistence.

use std::path::Path;
use std::{fs, io};

use serde::{Deserialize, Serialize};

/// What to do when a compressed section fails its sentinel or checksum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum IntegrityPolicy {
    /// Log the fault, count it, and keep decoding.
    #[default]
    Warn,
    /// Fail the decode with [`io::ErrorKind::InvalidData`].
    Strict,
}

/// Settings shared by the encoder and decoder of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct WireConfig {
    /// Reaction to a corrupted compressed section.
    pub integrity: IntegrityPolicy,
    /// zlib level (0-9) for compressed sections.
    pub compression_level: u32,
    /// Deflate level (0-9) for inline event buffers.
    pub event_compression_level: u32,
    /// Upper bound on any decoded array or string length.
    pub max_elements: usize,
    /// Upper bound on any decoded byte block, before and after inflation.
    pub max_block_len: usize,
    /// Event buffers larger than this are spilled to a shared file.
    pub inline_event_buffer_limit: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            integrity: IntegrityPolicy::Warn,
            compression_level: 6,
            event_compression_level: 1,
            max_elements: 16 * 1024 * 1024,
            max_block_len: 256 * 1024 * 1024,
            inline_event_buffer_limit: 1024 * 1024,
        }
    }
}

impl WireConfig {
    /// Returns a copy with the given integrity policy.
    #[must_use]
    pub const fn with_integrity(mut self, integrity: IntegrityPolicy) -> Self {
        self.integrity = integrity;
        self
    }

    /// Returns a copy with the given inline event buffer limit.
    #[must_use]
    pub const fn with_inline_event_buffer_limit(mut self, limit: usize) -> Self {
        self.inline_event_buffer_limit = limit;
        self
    }

    /// Loads a configuration from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Persists the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Rejects settings the codec cannot honor.
    pub fn validate(&self) -> io::Result<()> {
        if self.compression_level > 9 || self.event_compression_level > 9 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "compression levels must be in 0..=9",
            ));
        }
        if self.max_elements == 0 || self.max_block_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "decode limits must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.json");
        fs::write(&path, r#"{ "integrity": "strict", "compression_level": 9 }"#).unwrap();

        let config = WireConfig::load(&path).unwrap();
        assert_eq!(config.integrity, IntegrityPolicy::Strict);
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.event_compression_level, 1);
        assert_eq!(config.max_elements, WireConfig::default().max_elements);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.json");
        let config = WireConfig::default().with_inline_event_buffer_limit(4096);
        config.save(&path).unwrap();
        assert_eq!(WireConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn rejects_out_of_range_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wire.json");
        fs::write(&path, r#"{ "compression_level": 12 }"#).unwrap();
        let err = WireConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
