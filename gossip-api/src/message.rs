//! The message envelope shared by both channels

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::types::NodeId;
use constants::{ENVELOPE_HEADER_BYTES, MAX_PAYLOAD_SIZE};
use serde::{Deserialize, Serialize};

use crate::WireError;

/// The tag identifying what an envelope carries
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MessageType {
    /// A presence announcement carrying a discovery payload
    Discovery,
    /// A liveness refresh carrying a discovery payload
    Heartbeat,
    /// A task handed to a remote assignee
    TaskAssign,
    /// A terminal outcome reported back to a task's owner
    TaskResult,
    /// A request for a shared-memory block's metadata
    MemRequest,
    /// A response carrying a shared-memory block's metadata
    MemResponse,
    /// An instruction to record replica placement for a block
    MemReplicate,
    /// A cross-node lock-acquisition notice; reserved for future extension
    SyncLock,
    /// A cross-node lock-release notice; reserved for future extension
    SyncUnlock,
    /// A hint that some peer has been observed failing
    NodeFailure,
    /// A notice that a task has been re-assigned away from a failed peer
    TaskMigrate,
}

impl MessageType {
    /// Encode the tag as its wire value
    pub fn to_wire(self) -> u32 {
        match self {
            MessageType::Discovery => 0,
            MessageType::Heartbeat => 1,
            MessageType::TaskAssign => 2,
            MessageType::TaskResult => 3,
            MessageType::MemRequest => 4,
            MessageType::MemResponse => 5,
            MessageType::MemReplicate => 6,
            MessageType::SyncLock => 7,
            MessageType::SyncUnlock => 8,
            MessageType::NodeFailure => 9,
            MessageType::TaskMigrate => 10,
        }
    }

    /// Decode a tag from its wire value
    pub fn from_wire(value: u32) -> Result<Self, WireError> {
        match value {
            0 => Ok(MessageType::Discovery),
            1 => Ok(MessageType::Heartbeat),
            2 => Ok(MessageType::TaskAssign),
            3 => Ok(MessageType::TaskResult),
            4 => Ok(MessageType::MemRequest),
            5 => Ok(MessageType::MemResponse),
            6 => Ok(MessageType::MemReplicate),
            7 => Ok(MessageType::SyncLock),
            8 => Ok(MessageType::SyncUnlock),
            9 => Ok(MessageType::NodeFailure),
            10 => Ok(MessageType::TaskMigrate),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

/// A message envelope: the typed header plus a bounded opaque payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// What the payload is
    pub msg_type: MessageType,
    /// The minting node's id
    pub sender_id: NodeId,
    /// Seconds since the unix epoch at minting time
    pub timestamp: u64,
    /// The opaque payload, at most `MAX_PAYLOAD_SIZE` bytes
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Construct an envelope stamped with the current time
    ///
    /// Payloads over capacity are refused rather than truncated
    pub fn new(
        msg_type: MessageType,
        sender_id: NodeId,
        payload: Vec<u8>,
    ) -> Result<Self, WireError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }

        Ok(Self { msg_type, sender_id, timestamp: current_time_seconds(), payload })
    }

    /// Serialize the envelope for the discovery channel
    ///
    /// Layout, little-endian: type (1B), sender_id (8B), timestamp (8B),
    /// payload_size (2B), then the payload bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENVELOPE_HEADER_BYTES + self.payload.len());
        buf.push(self.msg_type.to_wire() as u8);
        buf.write_u64::<LittleEndian>(self.sender_id.0).expect("vec write");
        buf.write_u64::<LittleEndian>(self.timestamp).expect("vec write");
        buf.write_u16::<LittleEndian>(self.payload.len() as u16).expect("vec write");
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Deserialize an envelope from a received datagram
    ///
    /// Datagrams whose declared payload size exceeds the fixed capacity, or
    /// which end before the declared payload does, are rejected
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < ENVELOPE_HEADER_BYTES {
            return Err(WireError::Truncated);
        }

        let mut cursor = std::io::Cursor::new(bytes);
        let type_byte = cursor.read_u8().map_err(|_| WireError::Truncated)?;
        let msg_type = MessageType::from_wire(u32::from(type_byte))?;
        let sender_id = NodeId(cursor.read_u64::<LittleEndian>().map_err(|_| WireError::Truncated)?);
        let timestamp = cursor.read_u64::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let payload_size =
            cursor.read_u16::<LittleEndian>().map_err(|_| WireError::Truncated)? as usize;

        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge(payload_size));
        }

        let body = &bytes[ENVELOPE_HEADER_BYTES..];
        if body.len() < payload_size {
            return Err(WireError::Truncated);
        }

        Ok(Self { msg_type, sender_id, timestamp, payload: body[..payload_size].to_vec() })
    }
}

/// Returns a u64 representing the current unix timestamp in seconds
fn current_time_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).expect("negative timestamp").as_secs()
}

#[cfg(test)]
mod test {
    use common::types::NodeId;
    use constants::MAX_PAYLOAD_SIZE;

    use super::{Envelope, MessageType};
    use crate::WireError;

    /// Tests an encode/decode round trip of a payload-bearing envelope
    #[test]
    fn test_envelope_round_trip() {
        let env =
            Envelope::new(MessageType::TaskResult, NodeId(42), b"exit=0".to_vec()).unwrap();
        let decoded = Envelope::decode(&env.encode()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::TaskResult);
        assert_eq!(decoded.sender_id, NodeId(42));
        assert_eq!(decoded.timestamp, env.timestamp);
        assert_eq!(decoded.payload, b"exit=0");
    }

    /// Tests that an oversized payload is refused at construction
    #[test]
    fn test_oversized_payload_refused() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let res = Envelope::new(MessageType::MemResponse, NodeId(1), payload);
        assert!(matches!(res, Err(WireError::PayloadTooLarge(_))));
    }

    /// Tests that a datagram whose declared size overruns its body is rejected
    #[test]
    fn test_declared_size_overrun_rejected() {
        let env = Envelope::new(MessageType::Heartbeat, NodeId(7), vec![1, 2, 3, 4]).unwrap();
        let mut bytes = env.encode();
        bytes.truncate(bytes.len() - 2);

        assert_eq!(Envelope::decode(&bytes), Err(WireError::Truncated));
    }

    /// Tests that a declared payload size above capacity is rejected, not
    /// silently truncated
    #[test]
    fn test_capacity_overflow_rejected() {
        let env = Envelope::new(MessageType::Discovery, NodeId(7), vec![0; 8]).unwrap();
        let mut bytes = env.encode();
        // Overwrite payload_size with a value above the fixed capacity
        let oversize = (MAX_PAYLOAD_SIZE + 1) as u16;
        bytes[17..19].copy_from_slice(&oversize.to_le_bytes());

        assert!(matches!(Envelope::decode(&bytes), Err(WireError::PayloadTooLarge(_))));
    }

    /// Tests that unknown type tags fail decoding
    #[test]
    fn test_unknown_type_rejected() {
        let env = Envelope::new(MessageType::Discovery, NodeId(7), Vec::new()).unwrap();
        let mut bytes = env.encode();
        bytes[0] = 200;

        assert!(matches!(Envelope::decode(&bytes), Err(WireError::UnknownMessageType(200))));
    }
}
