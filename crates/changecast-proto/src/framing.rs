//! Wire framing for topic messages.
//!
//! A topic frame is the topic name, a NUL terminator, then a length-prefixed
//! payload:
//!
//! ```text
//! [topic bytes][0x00][length (4 bytes BE)][payload]
//! ```
//!
//! Subscribers filter on `topic + 0x00`, so prefix matching on the transport
//! never confuses `CREATED:Order` with `CREATED:OrderType`.

use crate::Error;

/// Default maximum payload size (4 MB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Terminator between the topic and the payload.
pub const TOPIC_TERMINATOR: u8 = 0;

/// Encode a payload with a length prefix.
///
/// Returns a new buffer containing `[length (4 bytes BE)][payload]`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    encode_frame_with_limit(payload, MAX_MESSAGE_SIZE)
}

/// Encode a payload with a length prefix, accepting up to `max_size` bytes.
pub fn encode_frame_with_limit(payload: &[u8], max_size: usize) -> Result<Vec<u8>, Error> {
    if payload.len() > max_size || payload.len() > u32::MAX as usize {
        return Err(Error::InvalidMessage(format!(
            "payload size {} exceeds maximum {}",
            payload.len(),
            max_size
        )));
    }

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode the length from a 4-byte header.
pub fn decode_frame_length(header: &[u8; LENGTH_PREFIX_SIZE]) -> Result<usize, Error> {
    decode_frame_length_with_limit(header, MAX_MESSAGE_SIZE)
}

fn decode_frame_length_with_limit(
    header: &[u8; LENGTH_PREFIX_SIZE],
    max_size: usize,
) -> Result<usize, Error> {
    let len = u32::from_be_bytes(*header) as usize;
    if len > max_size {
        return Err(Error::InvalidMessage(format!(
            "frame length {} exceeds maximum {}",
            len, max_size
        )));
    }
    Ok(len)
}

/// Extract the payload from a complete length-prefixed frame.
pub fn extract_payload(frame: &[u8]) -> Result<&[u8], Error> {
    extract_payload_with_limit(frame, MAX_MESSAGE_SIZE)
}

/// Extract the payload of a frame whose declared length may reach `max_size`.
pub fn extract_payload_with_limit(frame: &[u8], max_size: usize) -> Result<&[u8], Error> {
    if frame.len() < LENGTH_PREFIX_SIZE {
        return Err(Error::InvalidMessage("frame too short".to_string()));
    }

    let mut header = [0u8; LENGTH_PREFIX_SIZE];
    header.copy_from_slice(&frame[..LENGTH_PREFIX_SIZE]);
    let len = decode_frame_length_with_limit(&header, max_size)?;

    if frame.len() < LENGTH_PREFIX_SIZE + len {
        return Err(Error::InvalidMessage(format!(
            "frame incomplete: have {}, need {}",
            frame.len(),
            LENGTH_PREFIX_SIZE + len
        )));
    }

    Ok(&frame[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + len])
}

/// Subscription prefix for a topic: its bytes followed by the terminator.
pub fn topic_prefix(topic: &str) -> Result<Vec<u8>, Error> {
    validate_topic(topic)?;
    let mut prefix = Vec::with_capacity(topic.len() + 1);
    prefix.extend_from_slice(topic.as_bytes());
    prefix.push(TOPIC_TERMINATOR);
    Ok(prefix)
}

/// Encode a topic frame.
pub fn encode_topic_frame(topic: &str, payload: &[u8]) -> Result<Vec<u8>, Error> {
    encode_topic_frame_with_limit(topic, payload, MAX_MESSAGE_SIZE)
}

/// Encode a topic frame whose payload may reach `max_size` bytes.
pub fn encode_topic_frame_with_limit(
    topic: &str,
    payload: &[u8],
    max_size: usize,
) -> Result<Vec<u8>, Error> {
    let mut frame = topic_prefix(topic)?;
    frame.extend_from_slice(&encode_frame_with_limit(payload, max_size)?);
    Ok(frame)
}

/// Split a topic frame into its topic and payload.
pub fn decode_topic_frame(data: &[u8]) -> Result<(&str, &[u8]), Error> {
    decode_topic_frame_with_limit(data, MAX_MESSAGE_SIZE)
}

/// Split a topic frame whose payload may reach `max_size` bytes.
pub fn decode_topic_frame_with_limit(data: &[u8], max_size: usize) -> Result<(&str, &[u8]), Error> {
    let split = data
        .iter()
        .position(|b| *b == TOPIC_TERMINATOR)
        .ok_or_else(|| Error::InvalidMessage("missing topic terminator".to_string()))?;

    let topic = std::str::from_utf8(&data[..split])
        .map_err(|e| Error::InvalidMessage(format!("topic is not UTF-8: {}", e)))?;
    let payload = extract_payload_with_limit(&data[split + 1..], max_size)?;

    Ok((topic, payload))
}

fn validate_topic(topic: &str) -> Result<(), Error> {
    if topic.trim().is_empty() {
        return Err(Error::InvalidTopic("topic name cannot be blank".to_string()));
    }
    if topic.as_bytes().contains(&TOPIC_TERMINATOR) {
        return Err(Error::InvalidTopic(format!(
            "topic name contains a NUL byte: {:?}",
            topic
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_small() {
        let payload = b"hello";
        let frame = encode_frame(payload).unwrap();

        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + payload.len());
        assert_eq!(&frame[..4], &[0, 0, 0, 5]);
        assert_eq!(&frame[4..], payload);
    }

    #[test]
    fn test_encode_frame_too_large() {
        let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(encode_frame(&payload).is_err());
    }

    #[test]
    fn test_configured_limit() {
        let payload = vec![7u8; MAX_MESSAGE_SIZE + 1];
        assert!(encode_topic_frame("big", &payload).is_err());

        let limit = 2 * MAX_MESSAGE_SIZE;
        let frame = encode_topic_frame_with_limit("big", &payload, limit).unwrap();
        assert!(decode_topic_frame(&frame).is_err());

        let (topic, decoded) = decode_topic_frame_with_limit(&frame, limit).unwrap();
        assert_eq!(topic, "big");
        assert_eq!(decoded.len(), payload.len());

        assert!(encode_frame_with_limit(b"12345", 4).is_err());
    }

    #[test]
    fn test_extract_payload() {
        let frame = [0, 0, 0, 0];
        assert!(extract_payload(&frame).unwrap().is_empty());

        // Only the declared length is returned
        let frame = [0, 0, 0, 2, 1, 2, 3, 4, 5];
        assert_eq!(extract_payload(&frame).unwrap(), &[1, 2]);

        let frame = [0, 0, 0, 5, 1, 2];
        assert!(extract_payload(&frame).is_err());
    }

    #[test]
    fn test_topic_frame() {
        let frame = encode_topic_frame("CREATED:Order", b"payload").unwrap();
        assert!(frame.starts_with(&topic_prefix("CREATED:Order").unwrap()));

        let (topic, payload) = decode_topic_frame(&frame).unwrap();
        assert_eq!(topic, "CREATED:Order");
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_prefix_is_exact_per_topic() {
        let frame = encode_topic_frame("CREATED:OrderType", b"x").unwrap();
        assert!(!frame.starts_with(&topic_prefix("CREATED:Order").unwrap()));
    }

    #[test]
    fn test_invalid_topics() {
        assert!(topic_prefix("").is_err());
        assert!(topic_prefix("   ").is_err());
        assert!(topic_prefix("bad\0topic").is_err());
        assert!(decode_topic_frame(b"no terminator").is_err());
    }
}
