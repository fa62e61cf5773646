use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub mod cipher;

/// Game identifier expected in every browse request (token index 2).
pub const GAME_NAME: &str = "whamdowfr";

/// Fixed key for the response cipher, see http://aluigi.altervista.org/papers/gslist.cfg
pub const CIPHER_KEY: &[u8] = b"pXL838";

/// Length of the validation token prefixed to the filter expression.
pub const VALIDATE_LENGTH: usize = 8;

/// A value read from a named server attribute.
///
/// `Null` means the attribute exists but carries no value (e.g. a server
/// that never reported a group id); it is distinct from an unknown
/// attribute name, which lookup reports as `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl AttrValue {
    /// Renders the value the way the wire format expects: booleans as
    /// "1"/"0", missing values as the empty string.
    pub fn render(&self) -> String {
        match self {
            AttrValue::Str(s) => s.clone(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            AttrValue::Null => String::new(),
        }
    }
}

/// One registered game server as reported by the heartbeat side.
///
/// The query path only ever reads these; registration, heartbeats and
/// validity flagging live in the reporting service.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GameServerRecord {
    pub valid: bool,
    pub ip_address: String,
    pub query_port: u16,

    pub hostname: String,
    pub gamename: String,
    pub gamever: String,
    pub mapname: String,
    pub gametype: String,
    pub gamevariant: String,
    pub gamemode: String,
    pub country: String,
    pub modname: String,
    pub password: bool,
    pub natneg: bool,
    pub devmode: bool,
    pub hostport: u16,
    pub numplayers: i64,
    pub maxplayers: i64,
    pub numwaiting: i64,
    pub maxwaiting: i64,
    pub numservers: i64,
    pub statechanged: i64,
    pub groupid: Option<i64>,
}

/// Attribute names that may appear in a client filter expression.
///
/// `valid`, `ip_address` and `query_port` are addressable by name (clients
/// may request anything) but are kept out of this set so the connective
/// repair pass never treats them as filter terms.
pub const FILTERABLE_ATTRIBUTES: &[&str] = &[
    "hostname",
    "gamename",
    "gamever",
    "mapname",
    "gametype",
    "gamevariant",
    "gamemode",
    "country",
    "modname",
    "password",
    "natneg",
    "devmode",
    "hostport",
    "numplayers",
    "maxplayers",
    "numwaiting",
    "maxwaiting",
    "numservers",
    "statechanged",
    "groupid",
];

impl GameServerRecord {
    /// Looks up an attribute by its wire name.
    ///
    /// This is the explicit accessor table behind both filter evaluation
    /// and response packing; an unknown name yields `None`, never an error.
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        let value = match name {
            "valid" => AttrValue::Bool(self.valid),
            "ip_address" => AttrValue::Str(self.ip_address.clone()),
            "query_port" => AttrValue::Int(self.query_port as i64),
            "hostname" => AttrValue::Str(self.hostname.clone()),
            "gamename" => AttrValue::Str(self.gamename.clone()),
            "gamever" => AttrValue::Str(self.gamever.clone()),
            "mapname" => AttrValue::Str(self.mapname.clone()),
            "gametype" => AttrValue::Str(self.gametype.clone()),
            "gamevariant" => AttrValue::Str(self.gamevariant.clone()),
            "gamemode" => AttrValue::Str(self.gamemode.clone()),
            "country" => AttrValue::Str(self.country.clone()),
            "modname" => AttrValue::Str(self.modname.clone()),
            "password" => AttrValue::Bool(self.password),
            "natneg" => AttrValue::Bool(self.natneg),
            "devmode" => AttrValue::Bool(self.devmode),
            "hostport" => AttrValue::Int(self.hostport as i64),
            "numplayers" => AttrValue::Int(self.numplayers),
            "maxplayers" => AttrValue::Int(self.maxplayers),
            "numwaiting" => AttrValue::Int(self.numwaiting),
            "maxwaiting" => AttrValue::Int(self.maxwaiting),
            "numservers" => AttrValue::Int(self.numservers),
            "statechanged" => AttrValue::Int(self.statechanged),
            "groupid" => match self.groupid {
                Some(id) => AttrValue::Int(id),
                None => AttrValue::Null,
            },
            _ => return None,
        };
        Some(value)
    }

    /// Renders a client-requested field for the response body.
    ///
    /// Field names come straight off the wire and must never abort the
    /// response: unknown names render as "0", value-less attributes as "".
    pub fn field_value(&self, name: &str) -> String {
        match self.attribute(name) {
            Some(value) => value.render(),
            None => "0".to_string(),
        }
    }
}

/// One endpoint pair of a NAT negotiation session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NatNegPeer {
    pub public_address: SocketAddr,
    pub communication_address: SocketAddr,
    pub is_host: bool,
}

/// A NAT negotiation pairing tracked by the negotiation service.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NatNegClient {
    pub client_id: i32,
    pub host: NatNegPeer,
    pub guest: NatNegPeer,
}
