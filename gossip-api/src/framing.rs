//! The framed envelope used on the connection-oriented data channel

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use common::types::NodeId;
use constants::{ENVELOPE_MAGIC, FRAME_HEADER_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

use crate::{
    message::{Envelope, MessageType},
    WireError,
};

/// The 28-byte header prefixing every data-channel message
///
/// Layout: magic (4B, big-endian), version (4B), msg_type (4B),
/// sender_node_id (8B, big-endian), sequence (4B), payload_size (4B)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    /// The protocol version the sender speaks
    pub version: u32,
    /// What the framed payload is
    pub msg_type: MessageType,
    /// The sending node's id
    pub sender_node_id: NodeId,
    /// The sender's per-connection sequence number
    pub sequence: u32,
    /// The number of payload bytes following the header
    pub payload_size: u32,
}

impl FrameHeader {
    /// Serialize the header
    pub fn encode(&self) -> [u8; FRAME_HEADER_BYTES] {
        let mut buf = Vec::with_capacity(FRAME_HEADER_BYTES);
        buf.write_u32::<BigEndian>(ENVELOPE_MAGIC).expect("vec write");
        buf.write_u32::<LittleEndian>(self.version).expect("vec write");
        buf.write_u32::<LittleEndian>(self.msg_type.to_wire()).expect("vec write");
        buf.write_u64::<BigEndian>(self.sender_node_id.0).expect("vec write");
        buf.write_u32::<LittleEndian>(self.sequence).expect("vec write");
        buf.write_u32::<LittleEndian>(self.payload_size).expect("vec write");

        buf.try_into().expect("header width")
    }

    /// Deserialize a header
    ///
    /// A magic mismatch yields `BadMagic`; per the channel contract the
    /// receiver drops such frames without a response
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < FRAME_HEADER_BYTES {
            return Err(WireError::Truncated);
        }

        let mut cursor = Cursor::new(bytes);
        let magic = cursor.read_u32::<BigEndian>().map_err(|_| WireError::Truncated)?;
        if magic != ENVELOPE_MAGIC {
            return Err(WireError::BadMagic(magic));
        }

        let version = cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let msg_type = MessageType::from_wire(
            cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated)?,
        )?;
        let sender_node_id =
            NodeId(cursor.read_u64::<BigEndian>().map_err(|_| WireError::Truncated)?);
        let sequence = cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let payload_size = cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated)?;

        if payload_size as usize > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge(payload_size as usize));
        }

        Ok(Self { version, msg_type, sender_node_id, sequence, payload_size })
    }
}

/// Frame an envelope for the data channel
pub fn frame_envelope(envelope: &Envelope, sequence: u32) -> Vec<u8> {
    let header = FrameHeader {
        version: PROTOCOL_VERSION,
        msg_type: envelope.msg_type,
        sender_node_id: envelope.sender_id,
        sequence,
        payload_size: envelope.payload.len() as u32,
    };

    let mut buf = Vec::with_capacity(FRAME_HEADER_BYTES + envelope.payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&envelope.payload);
    buf
}

#[cfg(test)]
mod test {
    use common::types::NodeId;
    use constants::{FRAME_HEADER_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

    use super::{frame_envelope, FrameHeader};
    use crate::{
        message::{Envelope, MessageType},
        WireError,
    };

    /// Tests a header encode/decode round trip
    #[test]
    fn test_header_round_trip() {
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            msg_type: MessageType::TaskAssign,
            sender_node_id: NodeId(0xabcd),
            sequence: 17,
            payload_size: 128,
        };

        let bytes = header.encode();
        assert_eq!(bytes.len(), FRAME_HEADER_BYTES);
        assert_eq!(FrameHeader::decode(&bytes).unwrap(), header);
    }

    /// Tests that a frame with mismatched magic is reported for silent drop
    #[test]
    fn test_bad_magic() {
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            msg_type: MessageType::MemRequest,
            sender_node_id: NodeId(1),
            sequence: 0,
            payload_size: 0,
        };

        let mut bytes = header.encode();
        bytes[0] = 0x00;
        assert!(matches!(FrameHeader::decode(&bytes), Err(WireError::BadMagic(_))));
    }

    /// Tests that a declared payload size over capacity is rejected
    #[test]
    fn test_oversized_frame_rejected() {
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            msg_type: MessageType::MemResponse,
            sender_node_id: NodeId(1),
            sequence: 0,
            payload_size: (MAX_PAYLOAD_SIZE + 1) as u32,
        };

        assert!(matches!(
            FrameHeader::decode(&header.encode()),
            Err(WireError::PayloadTooLarge(_))
        ));
    }

    /// Tests framing an envelope end to end
    #[test]
    fn test_frame_envelope() {
        let env = Envelope::new(MessageType::TaskMigrate, NodeId(9), vec![5; 10]).unwrap();
        let framed = frame_envelope(&env, 3);

        assert_eq!(framed.len(), FRAME_HEADER_BYTES + 10);
        let header = FrameHeader::decode(&framed[..FRAME_HEADER_BYTES]).unwrap();
        assert_eq!(header.msg_type, MessageType::TaskMigrate);
        assert_eq!(header.sender_node_id, NodeId(9));
        assert_eq!(header.sequence, 3);
        assert_eq!(header.payload_size, 10);
        assert_eq!(&framed[FRAME_HEADER_BYTES..], &[5; 10]);
    }

    /// Tests the full receiver path over a framed envelope: split the
    /// header off the wire bytes, decode it, take exactly payload_size
    /// bytes, and reconstruct an envelope matching the one sent
    #[test]
    fn test_framed_round_trip() {
        let sent =
            Envelope::new(MessageType::TaskAssign, NodeId(0xbeef), b"descriptor".to_vec())
                .unwrap();
        let framed = frame_envelope(&sent, 41);

        // The receiver reads a fixed-width header first, then the payload
        let (header_bytes, rest) = framed.split_at(FRAME_HEADER_BYTES);
        let header = FrameHeader::decode(header_bytes).unwrap();
        assert_eq!(header.version, PROTOCOL_VERSION);

        let payload = rest[..header.payload_size as usize].to_vec();
        let received = Envelope {
            msg_type: header.msg_type,
            sender_id: header.sender_node_id,
            timestamp: sent.timestamp,
            payload,
        };
        assert_eq!(received, sent);
    }
}
