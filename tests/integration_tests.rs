//! Integration tests for the server list retrieval path.
//!
//! These tests exercise the full pipeline over real TCP sockets and
//! validate the binary wire layout with an independent reference decoder.

use server::network::RetrieveServer;
use server::packet::pack_server_list;
use server::registry::ServerRegistry;
use shared::{cipher, GameServerRecord, CIPHER_KEY};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A response payload taken apart by the reference decoder.
#[derive(Debug, PartialEq)]
struct DecodedResponse {
    client_ip: [u8; 4],
    client_port: u16,
    fields: Vec<String>,
    servers: Vec<DecodedServer>,
}

#[derive(Debug, PartialEq)]
struct DecodedServer {
    marker: u8,
    ip: [u8; 4],
    port: u16,
    values: Vec<String>,
}

/// Independent decoder for the packed wire layout. Deliberately written
/// against the documented format, not the packer's code.
fn decode_server_list(payload: &[u8]) -> Result<DecodedResponse, String> {
    if payload.len() < 8 {
        return Err("payload shorter than header".to_string());
    }

    let client_ip = [payload[0], payload[1], payload[2], payload[3]];
    let client_port = u16::from_be_bytes([payload[4], payload[5]]);
    let field_count = payload[6] as usize;
    if payload[7] != 0 {
        return Err("reserved header byte not zero".to_string());
    }

    let mut at = 8;
    let mut fields = Vec::new();
    for _ in 0..field_count {
        let start = at;
        while at < payload.len() && payload[at] != 0 {
            at += 1;
        }
        if at + 1 >= payload.len() || payload[at] != 0 || payload[at + 1] != 0 {
            return Err("field name not double-NUL terminated".to_string());
        }
        fields.push(String::from_utf8_lossy(&payload[start..at]).into_owned());
        at += 2;
    }

    let mut servers = Vec::new();
    loop {
        let rest = &payload[at..];
        if rest == [0x00, 0xff, 0xff, 0xff, 0xff] {
            break;
        }
        if rest.len() < 8 {
            return Err("truncated record block".to_string());
        }

        let marker = rest[0];
        let ip = [rest[1], rest[2], rest[3], rest[4]];
        let port = u16::from_be_bytes([rest[5], rest[6]]);
        if rest[7] != 0xff {
            return Err("missing address separator".to_string());
        }
        at += 8;

        let mut values = Vec::new();
        for i in 0..field_count {
            let start = at;
            if i + 1 < field_count {
                // Values are joined with 0x00 0xff.
                while at + 1 < payload.len() && !(payload[at] == 0x00 && payload[at + 1] == 0xff) {
                    at += 1;
                }
                if at + 1 >= payload.len() {
                    return Err("missing value separator".to_string());
                }
                values.push(String::from_utf8_lossy(&payload[start..at]).into_owned());
                at += 2;
            } else {
                // The last value runs to the record terminator.
                while at < payload.len() && payload[at] != 0x00 {
                    at += 1;
                }
                if at >= payload.len() {
                    return Err("missing record terminator".to_string());
                }
                values.push(String::from_utf8_lossy(&payload[start..at]).into_owned());
                at += 1;
            }
        }
        if field_count == 0 {
            if payload.get(at) != Some(&0x00) {
                return Err("missing record terminator".to_string());
            }
            at += 1;
        }

        servers.push(DecodedServer {
            marker,
            ip,
            port,
            values,
        });
    }

    Ok(DecodedResponse {
        client_ip,
        client_port,
        fields,
        servers,
    })
}

fn record(hostname: &str, ip: &str, port: u16) -> GameServerRecord {
    GameServerRecord {
        valid: true,
        ip_address: ip.to_string(),
        query_port: port,
        hostname: hostname.to_string(),
        gamename: "whamdowfr".to_string(),
        gametype: "ranked".to_string(),
        maxplayers: 8,
        ..Default::default()
    }
}

fn build_request(game: &str, validate_and_filter: &str, fields: &str) -> Vec<u8> {
    [
        "\x01\x12",
        "\x03",
        game,
        "whamdowfr",
        validate_and_filter,
        fields,
        "\x04",
    ]
    .join("\x00")
    .into_bytes()
}

async fn start_server(records: Vec<GameServerRecord>) -> SocketAddr {
    let registry = Arc::new(ServerRegistry::new());
    for record in records {
        let id = format!("{}:{}", record.ip_address, record.query_port);
        registry.register(id, record).await;
    }

    let server = RetrieveServer::bind("127.0.0.1:0".parse().unwrap(), registry)
        .await
        .expect("Failed to bind test server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

/// Reads until the peer goes quiet; empty result means no response came.
async fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match timeout(Duration::from_millis(300), stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => out.extend_from_slice(&chunk[..n]),
            _ => break,
        }
    }
    out
}

/// WIRE FORMAT TESTS
mod wire_format_tests {
    use super::*;

    /// Packing then decoding reproduces every field value in order.
    #[test]
    fn pack_roundtrip_reproduces_field_values() {
        let mut first = record("alpha", "10.0.0.5", 27015);
        first.numplayers = 3;
        first.natneg = true;
        let mut second = record("beta", "10.0.0.6", 27016);
        second.numplayers = 0;
        second.groupid = Some(9);

        let fields: Vec<String> = ["hostname", "numplayers", "natneg", "groupid", "localip0"]
            .iter()
            .map(|f| f.to_string())
            .collect();

        let client: SocketAddr = "192.0.2.7:31337".parse().unwrap();
        let payload = pack_server_list(client, &[first, second], &fields);
        let decoded = decode_server_list(&payload).expect("payload should decode");

        assert_eq!(decoded.client_ip, [192, 0, 2, 7]);
        assert_eq!(decoded.client_port, 31337);
        assert_eq!(decoded.fields, fields);
        assert_eq!(decoded.servers.len(), 2);

        let first = &decoded.servers[0];
        assert_eq!(first.marker, 81);
        assert_eq!(first.ip, [10, 0, 0, 5]);
        assert_eq!(first.port, 27015);
        // missing groupid renders "", unknown localip0 renders "0"
        assert_eq!(first.values, vec!["alpha", "3", "1", "", "0"]);

        let second = &decoded.servers[1];
        assert_eq!(second.values, vec!["beta", "0", "0", "9", "0"]);
    }

    /// Zero matched records still yields a valid, decodable response.
    #[test]
    fn empty_result_decodes() {
        let client: SocketAddr = "10.1.1.1:1024".parse().unwrap();
        let fields = vec!["hostname".to_string()];
        let payload = pack_server_list(client, &[], &fields);

        let decoded = decode_server_list(&payload).unwrap();
        assert_eq!(decoded.fields, vec!["hostname"]);
        assert!(decoded.servers.is_empty());
    }

    /// Records with no requested fields still carry their terminator.
    #[test]
    fn zero_field_records_decode() {
        let client: SocketAddr = "10.1.1.1:1024".parse().unwrap();
        let payload = pack_server_list(client, &[record("alpha", "10.0.0.5", 27015)], &[]);

        let decoded = decode_server_list(&payload).unwrap();
        assert_eq!(decoded.servers.len(), 1);
        assert!(decoded.servers[0].values.is_empty());
    }
}

/// END-TO-END TESTS over real TCP
mod end_to_end_tests {
    use super::*;

    #[tokio::test]
    async fn single_record_browse() {
        let addr = start_server(vec![record("alpha", "10.0.0.5", 27015)]).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_request("whamdowfr", "fkT>_2Cr", "\\hostname"))
            .await
            .unwrap();

        let encrypted = read_response(&mut stream).await;
        assert!(!encrypted.is_empty());

        let payload = cipher::decode(CIPHER_KEY, b"fkT>_2Cr", &encrypted);
        let decoded = decode_server_list(&payload).unwrap();

        assert_eq!(decoded.client_ip, [127, 0, 0, 1]);
        assert_eq!(decoded.fields, vec!["hostname"]);
        assert_eq!(decoded.servers.len(), 1);

        let server = &decoded.servers[0];
        assert_eq!(server.marker, 81);
        assert_eq!(server.ip, [10, 0, 0, 5]);
        assert_eq!(server.port, 27015);
        assert_eq!(server.values, vec!["alpha"]);
    }

    #[tokio::test]
    async fn wrong_game_gets_no_bytes_and_connection_survives() {
        let addr = start_server(vec![record("alpha", "10.0.0.5", 27015)]).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_request("battlefield2", "fkT>_2Cr", "\\hostname"))
            .await
            .unwrap();
        assert!(read_response(&mut stream).await.is_empty());

        // Same connection, correct game: still served.
        stream
            .write_all(&build_request("WHAMDOWFR", "fkT>_2Cr", "\\hostname"))
            .await
            .unwrap();
        let encrypted = read_response(&mut stream).await;
        assert!(!encrypted.is_empty());

        let payload = cipher::decode(CIPHER_KEY, b"fkT>_2Cr", &encrypted);
        let decoded = decode_server_list(&payload).unwrap();
        assert_eq!(decoded.servers.len(), 1);
    }

    #[tokio::test]
    async fn broken_filter_expression_is_repaired_and_applied() {
        let mut busy = record("busy", "10.0.0.5", 27015);
        busy.numplayers = 5;
        busy.gametype = "gpm_cq".to_string();
        let mut empty = record("empty", "10.0.0.6", 27016);
        empty.numplayers = 0;
        empty.gametype = "gpm_cq".to_string();

        let addr = start_server(vec![busy, empty]).await;

        // The infamous unjoined filter straight from the client.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_request(
                "whamdowfr",
                "fkT>_2Crnumplayers > 0gametype like '%gpm_cq%'",
                "\\hostname\\numplayers",
            ))
            .await
            .unwrap();

        let encrypted = read_response(&mut stream).await;
        let payload = cipher::decode(CIPHER_KEY, b"fkT>_2Cr", &encrypted);
        let decoded = decode_server_list(&payload).unwrap();

        assert_eq!(decoded.servers.len(), 1);
        assert_eq!(decoded.servers[0].values, vec!["busy", "5"]);
    }

    #[tokio::test]
    async fn unusable_filter_fails_open() {
        let addr = start_server(vec![
            record("alpha", "10.0.0.5", 27015),
            record("beta", "10.0.0.6", 27016),
        ])
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_request(
                "whamdowfr",
                "fkT>_2Crnumplayers >>> broken",
                "\\hostname",
            ))
            .await
            .unwrap();

        let encrypted = read_response(&mut stream).await;
        let payload = cipher::decode(CIPHER_KEY, b"fkT>_2Cr", &encrypted);
        let decoded = decode_server_list(&payload).unwrap();

        // Both valid servers come back rather than an error or nothing.
        assert_eq!(decoded.servers.len(), 2);
    }

    #[tokio::test]
    async fn invalid_records_are_hidden() {
        let mut hidden = record("hidden", "10.0.0.9", 27019);
        hidden.valid = false;

        let addr = start_server(vec![record("alpha", "10.0.0.5", 27015), hidden]).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_request("whamdowfr", "fkT>_2Cr", "\\hostname"))
            .await
            .unwrap();

        let encrypted = read_response(&mut stream).await;
        let payload = cipher::decode(CIPHER_KEY, b"fkT>_2Cr", &encrypted);
        let decoded = decode_server_list(&payload).unwrap();

        assert_eq!(decoded.servers.len(), 1);
        assert_eq!(decoded.servers[0].values, vec!["alpha"]);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_list() {
        let addr = start_server(vec![]).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&build_request("whamdowfr", "fkT>_2Cr", "\\hostname\\mapname"))
            .await
            .unwrap();

        let encrypted = read_response(&mut stream).await;
        let payload = cipher::decode(CIPHER_KEY, b"fkT>_2Cr", &encrypted);
        let decoded = decode_server_list(&payload).unwrap();

        assert_eq!(decoded.fields, vec!["hostname", "mapname"]);
        assert!(decoded.servers.is_empty());
    }
}
