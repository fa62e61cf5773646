//! Binary packing of the server list response.
//!
//! The payload handed to the cipher has a fixed shape: the requesting
//! client's own endpoint, the echoed field-name block, one block per
//! matched server, and a terminator. All multi-byte integers are
//! big-endian on the wire.

use log::warn;
use shared::GameServerRecord;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Per-record marker: public ip / public port only.
pub const MARKER_PUBLIC: u8 = 81;
/// Reserved marker: public ip / public port (alternate form, unused).
pub const MARKER_PUBLIC_ALT: u8 = 85;
/// Reserved marker: public + private endpoint (unused).
pub const MARKER_WITH_PRIVATE: u8 = 115;
/// Reserved marker: public + private endpoint + icmp ip (unused).
pub const MARKER_WITH_PRIVATE_ICMP: u8 = 126;

/// Separator between a record's address block and its field values.
const ADDRESS_SEPARATOR: u8 = 0xff;
/// Terminator closing the whole list.
const LIST_TERMINATOR: [u8; 5] = [0x00, 0xff, 0xff, 0xff, 0xff];

/// Packs the matched servers into the response payload.
///
/// Records are written in the order given; field values are rendered
/// through the record's accessor table so client-supplied names can never
/// abort the response.
pub fn pack_server_list(
    client: SocketAddr,
    servers: &[GameServerRecord],
    fields: &[String],
) -> Vec<u8> {
    let mut data = Vec::new();

    data.extend_from_slice(&client_ipv4(&client).octets());
    data.extend_from_slice(&client.port().to_be_bytes());

    // The count is a single byte; field names past 255 cannot be
    // represented and are dropped so the count always matches the block.
    let fields = &fields[..fields.len().min(u8::MAX as usize)];
    data.push(fields.len() as u8);
    data.push(0x00);
    for field in fields {
        data.extend_from_slice(field.as_bytes());
        data.extend_from_slice(&[0x00, 0x00]);
    }

    for server in servers {
        data.push(MARKER_PUBLIC);
        data.extend_from_slice(&server_ipv4(server).octets());
        data.extend_from_slice(&server.query_port.to_be_bytes());
        data.push(ADDRESS_SEPARATOR);

        for (i, field) in fields.iter().enumerate() {
            data.extend_from_slice(server.field_value(field).as_bytes());
            if i < fields.len() - 1 {
                data.extend_from_slice(&[0x00, 0xff]);
            }
        }

        data.push(0x00);
    }

    data.extend_from_slice(&LIST_TERMINATOR);

    data
}

fn client_ipv4(addr: &SocketAddr) -> Ipv4Addr {
    match addr.ip() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(ip) => ip.to_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}

fn server_ipv4(server: &GameServerRecord) -> Ipv4Addr {
    server.ip_address.parse().unwrap_or_else(|_| {
        warn!("Unparseable server address {:?}", server.ip_address);
        Ipv4Addr::UNSPECIFIED
    })
}
