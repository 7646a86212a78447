// WireGuard peer-coordination — shared wire types
// Distributed under the MIT software license.

//! Fixed-layout control message and supporting identifiers.
//!
//! The wire format must match an existing C++ deployment byte-for-byte.
//! Field sizes and offsets are therefore not derived from
//! `std::mem::size_of` — they are hard-coded constants, and `codec.rs`
//! builds/parses the byte image explicitly.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Length of the public-key field on the wire: base64 of a 32-byte X25519
/// key, NUL-padded to this size.
pub const PUBLIC_KEY_FIELD_LEN: usize = 45;

/// Length of the allowed-ips field on the wire: NUL-terminated ASCII.
pub const ALLOWED_IPS_FIELD_LEN: usize = 256;

/// Total cleartext `ControlMessage` size, in bytes.
pub const CONTROL_MESSAGE_LEN: usize = 4 + 6 + 4 + 4 + PUBLIC_KEY_FIELD_LEN + 4 + 2 + ALLOWED_IPS_FIELD_LEN;

/// Total envelope size: nonce (24B) + ciphertext (cleartext + 16B MAC).
pub const ENVELOPE_LEN: usize = 24 + CONTROL_MESSAGE_LEN + 16;

/// Default coordinator TCP port.
pub const DEFAULT_PORT: u16 = 51822;

/// Control message discriminant. Encoded as a little-endian `u32` on the
/// wire, matching the original `enum class AUTOCONN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageKind {
    Hello = 0,
    Ping = 1,
    Pong = 2,
    Ok = 3,
    Nok = 4,
    Bye = 5,
    Exist = 6,
}

impl MessageKind {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Hello,
            1 => Self::Ping,
            2 => Self::Pong,
            3 => Self::Ok,
            4 => Self::Nok,
            5 => Self::Bye,
            6 => Self::Exist,
            _ => return None,
        })
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hello => "HELLO",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Ok => "OK",
            Self::Nok => "NOK",
            Self::Bye => "BYE",
            Self::Exist => "EXIST",
        };
        f.write_str(s)
    }
}

/// A 6-byte hardware address, normalized to lowercase colon-separated text
/// (`"aa:bb:cc:dd:ee:ff"`) when used as a registry/pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub fn as_bytes(&self) -> [u8; 6] {
        self.0
    }

    /// Lowercase, colon-separated form used as the registry/pool key.
    pub fn to_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct MacAddrParseError(String);

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(MacAddrParseError(s.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (i, p) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(p, 16).map_err(|_| MacAddrParseError(s.to_string()))?;
        }
        Ok(MacAddr(bytes))
    }
}

/// The plaintext control record exchanged between client and coordinator.
///
/// Field order and sizes mirror `original_source/src/autoc/inc/message.h`
/// exactly; see `codec.rs` for the byte-level encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub kind: MessageKind,
    pub mac_addr: MacAddr,
    pub vpn_ip: Ipv4Addr,
    pub vpn_netmask: Ipv4Addr,
    /// Base64 of a 32-byte X25519 key, NUL-padded to 45 bytes on the wire.
    pub public_key: String,
    pub endpoint_ip: Ipv4Addr,
    pub endpoint_port: u16,
    /// NUL-terminated ASCII, e.g. `"10.0.0.0/24,192.168.1.0/24"`.
    pub allowed_ips: String,
}

impl ControlMessage {
    /// Build a bare `NOK` — no payload beyond its kind, zeroed fields.
    pub fn nok(mac_addr: MacAddr) -> Self {
        Self {
            kind: MessageKind::Nok,
            mac_addr,
            vpn_ip: Ipv4Addr::UNSPECIFIED,
            vpn_netmask: Ipv4Addr::UNSPECIFIED,
            public_key: String::new(),
            endpoint_ip: Ipv4Addr::UNSPECIFIED,
            endpoint_port: 0,
            allowed_ips: String::new(),
        }
    }
}

/// Current seconds-since-epoch, used for `last_seen`/timestamps.
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
