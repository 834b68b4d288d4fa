//! Handshake options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::MSGPACK_TYPE;
use crate::protocol::MAGIC_NUMBER;

/// Default budget for dialing and client construction.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options sent once per connection, before the first frame.
///
/// Durations travel as integer nanoseconds. A zero duration means no limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Options {
    /// Protocol identity, must equal [`MAGIC_NUMBER`].
    pub magic_number: u32,
    /// Codec type token for the frames that follow.
    pub codec_type: String,
    /// Client-side budget for connecting.
    #[serde(with = "duration_nanos")]
    pub connect_timeout: Duration,
    /// Server-side budget for each method invocation.
    #[serde(with = "duration_nanos")]
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: MSGPACK_TYPE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    /// Set the codec type token.
    pub fn with_codec_type(mut self, codec_type: impl Into<String>) -> Self {
        self.codec_type = codec_type.into();
        self
    }

    /// Set the connect timeout (zero disables it).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request handle timeout (zero disables it).
    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// Options as a client sends them: magic number forced, empty codec
    /// type replaced by the default.
    pub fn normalized(mut self) -> Self {
        self.magic_number = MAGIC_NUMBER;
        if self.codec_type.is_empty() {
            self.codec_type = MSGPACK_TYPE.to_string();
        }
        self
    }
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JSON_TYPE;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.magic_number, 0x3bef5c);
        assert_eq!(opts.codec_type, "application/msgpack");
        assert_eq!(opts.connect_timeout, Duration::from_secs(10));
        assert_eq!(opts.handle_timeout, Duration::ZERO);
    }

    #[test]
    fn test_json_shape() {
        let opts = Options::default().with_handle_timeout(Duration::from_millis(50));
        let json = serde_json::to_string(&opts).unwrap();
        assert_eq!(
            json,
            r#"{"MagicNumber":3927900,"CodecType":"application/msgpack","ConnectTimeout":10000000000,"HandleTimeout":50000000}"#
        );
        assert_eq!(serde_json::from_str::<Options>(&json).unwrap(), opts);
    }

    #[test]
    fn test_normalized() {
        let opts = Options {
            magic_number: 1,
            codec_type: String::new(),
            ..Options::default()
        }
        .normalized();
        assert_eq!(opts.magic_number, MAGIC_NUMBER);
        assert_eq!(opts.codec_type, MSGPACK_TYPE);

        let opts = Options::default().with_codec_type(JSON_TYPE).normalized();
        assert_eq!(opts.codec_type, JSON_TYPE);
    }
}
