//! The bit-exact discovery payload broadcast with every announcement

use std::io::Cursor;
use std::net::SocketAddr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use common::types::{NodeId, PeerRecord, PeerStatus};
use constants::{ADDR_TEXT_BYTES, DISCOVERY_PAYLOAD_BYTES, HOST_NAME_BYTES};

use crate::WireError;

/// A node's self-description as carried in Discovery and Heartbeat envelopes
///
/// Wire layout, little-endian, 111 bytes total:
/// node_id (8B), host_name (64B NUL-padded), address text (16B NUL-padded),
/// data_port (2B), cpu_load (4B), memory_usage (4B), reputation (4B),
/// tasks_completed (4B), tasks_failed (4B), status (1B)
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryPayload {
    /// The announcing node's id
    pub node_id: NodeId,
    /// The announcing node's host name, truncated to the wire field width
    pub host_name: String,
    /// The announcing node's address as text; receivers prefer the observed
    /// datagram source over this field
    pub address: String,
    /// The TCP port the announcing node accepts data connections on
    pub data_port: u16,
    /// The announcing node's cpu load, normalized to [0, 1]
    pub cpu_load: f32,
    /// The announcing node's memory utilization, normalized to [0, 1]
    pub memory_usage: f32,
    /// The announcing node's self-reported reputation
    pub reputation: f32,
    /// Tasks the announcing node has completed
    pub tasks_completed: u32,
    /// Tasks the announcing node has failed
    pub tasks_failed: u32,
    /// The announcing node's status
    pub status: PeerStatus,
}

impl DiscoveryPayload {
    /// Build a payload from the local node's registry record
    pub fn from_record(record: &PeerRecord) -> Self {
        Self {
            node_id: record.node_id,
            host_name: record.host_name.clone(),
            address: record.address.ip().to_string(),
            data_port: record.address.port(),
            cpu_load: record.cpu_load,
            memory_usage: record.memory_usage,
            reputation: record.reputation,
            tasks_completed: record.tasks_completed,
            tasks_failed: record.tasks_failed,
            status: record.status,
        }
    }

    /// Serialize to the fixed 111-byte wire layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DISCOVERY_PAYLOAD_BYTES);
        buf.write_u64::<LittleEndian>(self.node_id.0).expect("vec write");
        write_padded(&mut buf, &self.host_name, HOST_NAME_BYTES);
        write_padded(&mut buf, &self.address, ADDR_TEXT_BYTES);
        buf.write_u16::<LittleEndian>(self.data_port).expect("vec write");
        buf.write_f32::<LittleEndian>(self.cpu_load).expect("vec write");
        buf.write_f32::<LittleEndian>(self.memory_usage).expect("vec write");
        buf.write_f32::<LittleEndian>(self.reputation).expect("vec write");
        buf.write_u32::<LittleEndian>(self.tasks_completed).expect("vec write");
        buf.write_u32::<LittleEndian>(self.tasks_failed).expect("vec write");
        buf.push(self.status.to_wire());

        debug_assert_eq!(buf.len(), DISCOVERY_PAYLOAD_BYTES);
        buf
    }

    /// Deserialize from the fixed wire layout
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < DISCOVERY_PAYLOAD_BYTES {
            return Err(WireError::Truncated);
        }

        let mut cursor = Cursor::new(bytes);
        let node_id = NodeId(cursor.read_u64::<LittleEndian>().map_err(|_| WireError::Truncated)?);
        let host_name = read_padded(&mut cursor, HOST_NAME_BYTES)?;
        let address = read_padded(&mut cursor, ADDR_TEXT_BYTES)?;
        let data_port = cursor.read_u16::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let cpu_load = cursor.read_f32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let memory_usage = cursor.read_f32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let reputation = cursor.read_f32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let tasks_completed = cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let tasks_failed = cursor.read_u32::<LittleEndian>().map_err(|_| WireError::Truncated)?;
        let status = PeerStatus::from_wire(cursor.read_u8().map_err(|_| WireError::Truncated)?);

        Ok(Self {
            node_id,
            host_name,
            address,
            data_port,
            cpu_load,
            memory_usage,
            reputation,
            tasks_completed,
            tasks_failed,
            status,
        })
    }

    /// The socket address this payload advertises
    pub fn advertised_addr(&self) -> Option<SocketAddr> {
        let ip = self.address.parse().ok()?;
        Some(SocketAddr::new(ip, self.data_port))
    }
}

/// Write a string into a fixed-width NUL-padded field, truncating over-long
/// input at the field boundary
fn write_padded(buf: &mut Vec<u8>, value: &str, width: usize) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(width);
    buf.extend_from_slice(&bytes[..take]);
    buf.resize(buf.len() + (width - take), 0);
}

/// Read a fixed-width NUL-padded string field
fn read_padded(cursor: &mut Cursor<&[u8]>, width: usize) -> Result<String, WireError> {
    let start = cursor.position() as usize;
    let bytes = *cursor.get_ref();
    if bytes.len() < start + width {
        return Err(WireError::Truncated);
    }

    let field = &bytes[start..start + width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    let value = String::from_utf8_lossy(&field[..end]).into_owned();

    cursor.set_position((start + width) as u64);
    Ok(value)
}
