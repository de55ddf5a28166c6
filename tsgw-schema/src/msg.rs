//! The binary message format for batches of metrics.
//!
//! A message consists of a header followed by the encoded batch:
//!
//! ```text
//! +--------+---------------------+-------------------+
//! | format | id (i64, big endian)| payload ...       |
//! | 1 byte | 8 bytes             |                   |
//! +--------+---------------------+-------------------+
//! ```
//!
//! The id is the time the message was produced in nanoseconds. The payload is an array of
//! [`MetricData`] encoded as JSON or MessagePack, depending on the format byte.

use std::fmt;

use crate::MetricData;

/// Size of the message header in bytes.
pub const HEADER_SIZE: usize = 9;

/// Encoding of the payload of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Format {
    /// A JSON array of metrics.
    MetricDataArrayJson,
    /// A MessagePack array of metrics.
    MetricDataArrayMsgp,
}

impl Format {
    /// Returns the format identifier written into the header.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::MetricDataArrayJson => 0,
            Self::MetricDataArrayMsgp => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::MetricDataArrayJson),
            1 => Some(Self::MetricDataArrayMsgp),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetricDataArrayJson => write!(f, "json"),
            Self::MetricDataArrayMsgp => write!(f, "msgp"),
        }
    }
}

/// Errors reading or writing messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The message is shorter than its header.
    #[error("payload too small")]
    TooSmall,
    /// The format byte is not known.
    #[error("unknown format {0}")]
    UnknownFormat(u8),
    /// The JSON payload could not be decoded.
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The MessagePack payload could not be decoded.
    #[error("invalid msgp payload: {0}")]
    MsgpDecode(#[from] rmp_serde::decode::Error),
    /// The MessagePack payload could not be encoded.
    #[error("failed to encode msgp payload: {0}")]
    MsgpEncode(#[from] rmp_serde::encode::Error),
}

/// A parsed message header with a borrowed payload.
#[derive(Clone, Copy, Debug)]
pub struct MetricMessage<'a> {
    /// Encoding of the payload.
    pub format: Format,
    /// Production time of the message in nanoseconds.
    pub id: i64,
    /// The encoded batch.
    pub payload: &'a [u8],
}

impl<'a> MetricMessage<'a> {
    /// Splits a message into its header and payload.
    ///
    /// The payload is not decoded; see [`decode_metrics`](Self::decode_metrics).
    pub fn parse(bytes: &'a [u8]) -> Result<Self, MessageError> {
        let Some((header, payload)) = bytes.split_first_chunk::<HEADER_SIZE>() else {
            return Err(MessageError::TooSmall);
        };

        let [format, id @ ..] = *header;
        let format = Format::from_byte(format).ok_or(MessageError::UnknownFormat(format))?;

        Ok(Self {
            format,
            id: i64::from_be_bytes(id),
            payload,
        })
    }

    /// Decodes the batch carried in the payload.
    pub fn decode_metrics(&self) -> Result<Vec<MetricData>, MessageError> {
        Ok(match self.format {
            Format::MetricDataArrayJson => serde_json::from_slice(self.payload)?,
            Format::MetricDataArrayMsgp => rmp_serde::from_slice(self.payload)?,
        })
    }
}

/// Encodes a batch into a message.
pub fn encode(format: Format, id: i64, metrics: &[MetricData]) -> Result<Vec<u8>, MessageError> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 64 * metrics.len());
    buf.push(format.as_byte());
    buf.extend_from_slice(&id.to_be_bytes());

    match format {
        Format::MetricDataArrayJson => serde_json::to_writer(&mut buf, metrics)?,
        Format::MetricDataArrayMsgp => {
            rmp_serde::encode::write_named(&mut buf, metrics)?;
        }
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn metric() -> MetricData {
        MetricData {
            org_id: 4,
            name: "a.b".to_owned(),
            interval: 10,
            value: 3.5,
            time: 1_700_000_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_too_small() {
        let error = MetricMessage::parse(&[0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(error.to_string(), "payload too small");
    }

    #[test]
    fn test_unknown_format() {
        let error = MetricMessage::parse(&[7, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(error.to_string(), "unknown format 7");
    }

    #[test]
    fn test_header_only() {
        let message = MetricMessage::parse(&[1, 0, 0, 0, 0, 0, 0, 1, 0]).unwrap();
        assert_eq!(message.format, Format::MetricDataArrayMsgp);
        assert_eq!(message.id, 256);
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_json_payload() {
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 0, 42];
        bytes.extend_from_slice(br#"[{"name":"a.b","org_id":4,"interval":10,"value":3.5,"time":1700000000}]"#);

        let message = MetricMessage::parse(&bytes).unwrap();
        assert_eq!(message.id, 42);
        assert_eq!(message.decode_metrics().unwrap(), vec![metric()]);
    }

    #[test]
    fn test_msgp_payload() {
        let bytes = encode(Format::MetricDataArrayMsgp, 99, &[metric(), metric()]).unwrap();
        assert_eq!(bytes[0], 1);

        let message = MetricMessage::parse(&bytes).unwrap();
        assert_eq!(message.id, 99);
        assert_eq!(message.decode_metrics().unwrap(), vec![metric(), metric()]);
    }

    #[test]
    fn test_msgp_capitalized_fields() {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Legacy<'a> {
            name: &'a str,
            org_id: i64,
            interval: i64,
        }

        let mut bytes = vec![1, 0, 0, 0, 0, 0, 0, 0, 0];
        rmp_serde::encode::write_named(
            &mut bytes,
            &[Legacy {
                name: "legacy",
                org_id: 9,
                interval: 30,
            }],
        )
        .unwrap();

        let metrics = MetricMessage::parse(&bytes)
            .unwrap()
            .decode_metrics()
            .unwrap();
        assert_eq!(metrics[0].name, "legacy");
        assert_eq!(metrics[0].org_id, 9);
        assert_eq!(metrics[0].interval, 30);
    }

    #[test]
    fn test_malformed_payload() {
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(b"[{");

        let message = MetricMessage::parse(&bytes).unwrap();
        assert!(matches!(
            message.decode_metrics(),
            Err(MessageError::Json(_))
        ));
    }
}
