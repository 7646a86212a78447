// Distributed under the MIT software license.

//! Byte-exact encode/decode of [`ControlMessage`] to the wire layout
//! fixed by the existing deployment (see `original_source/src/autoc/inc/message.h`):
//!
//! ```text
//! off  size  field
//! 0    4     kind (u32, enum, little-endian)
//! 4    6     mac_addr
//! 10   4     vpn_ip       (octets in a.b.c.d print order)
//! 14   4     vpn_netmask  (octets in a.b.c.d print order)
//! 18   45    public_key   (base64, NUL-padded)
//! 63   4     endpoint_ip  (octets in a.b.c.d print order)
//! 67   2     endpoint_port (u16, host/native byte order — preserved from the original)
//! 69   256   allowed_ips  (NUL-terminated ASCII)
//! total: 325 bytes
//! ```
//!
//! IP fields are stored and read as raw octets in printed order
//! (`a.b.c.d`), not as a byte-swapped integer — this sidesteps the
//! original's accidental octet-reversal in `byteArrayToIpAddress` while
//! reproducing the same printed addresses. `endpoint_port` is written
//! with native byte order, not `to_be`/`htons`, matching the original
//! wire behavior.

use crate::types::{
    ControlMessage, MacAddr, MessageKind, ALLOWED_IPS_FIELD_LEN, CONTROL_MESSAGE_LEN,
    PUBLIC_KEY_FIELD_LEN,
};
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("short buffer: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
    #[error("unknown message kind discriminant: {0}")]
    UnknownKind(u32),
    #[error("public_key field is not valid UTF-8/ASCII")]
    InvalidPublicKey,
    #[error("allowed_ips field is not valid UTF-8/ASCII")]
    InvalidAllowedIps,
}

/// Encode a [`ControlMessage`] to its fixed 325-byte cleartext image.
pub fn encode(msg: &ControlMessage) -> [u8; CONTROL_MESSAGE_LEN] {
    let mut buf = [0u8; CONTROL_MESSAGE_LEN];

    buf[0..4].copy_from_slice(&(msg.kind as u32).to_le_bytes());
    buf[4..10].copy_from_slice(&msg.mac_addr.as_bytes());
    buf[10..14].copy_from_slice(&msg.vpn_ip.octets());
    buf[14..18].copy_from_slice(&msg.vpn_netmask.octets());

    write_nul_padded(&mut buf[18..18 + PUBLIC_KEY_FIELD_LEN], msg.public_key.as_bytes());

    buf[63..67].copy_from_slice(&msg.endpoint_ip.octets());
    buf[67..69].copy_from_slice(&msg.endpoint_port.to_ne_bytes());

    write_nul_padded(&mut buf[69..69 + ALLOWED_IPS_FIELD_LEN], msg.allowed_ips.as_bytes());

    buf
}

/// Decode a [`ControlMessage`] from a 325-byte cleartext buffer.
pub fn decode(buf: &[u8]) -> Result<ControlMessage, CodecError> {
    if buf.len() != CONTROL_MESSAGE_LEN {
        return Err(CodecError::ShortBuffer {
            expected: CONTROL_MESSAGE_LEN,
            actual: buf.len(),
        });
    }

    let kind_raw = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let kind = MessageKind::from_u32(kind_raw).ok_or(CodecError::UnknownKind(kind_raw))?;

    let mac_addr = MacAddr(buf[4..10].try_into().unwrap());
    let vpn_ip = Ipv4Addr::new(buf[10], buf[11], buf[12], buf[13]);
    let vpn_netmask = Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]);

    let public_key = read_nul_padded(&buf[18..18 + PUBLIC_KEY_FIELD_LEN])
        .ok_or(CodecError::InvalidPublicKey)?;

    let endpoint_ip = Ipv4Addr::new(buf[63], buf[64], buf[65], buf[66]);
    let endpoint_port = u16::from_ne_bytes(buf[67..69].try_into().unwrap());

    let allowed_ips = read_nul_padded(&buf[69..69 + ALLOWED_IPS_FIELD_LEN])
        .ok_or(CodecError::InvalidAllowedIps)?;

    Ok(ControlMessage {
        kind,
        mac_addr,
        vpn_ip,
        vpn_netmask,
        public_key,
        endpoint_ip,
        endpoint_port,
        allowed_ips,
    })
}

fn write_nul_padded(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len().saturating_sub(1));
    dst[..n].copy_from_slice(&src[..n]);
    for b in &mut dst[n..] {
        *b = 0;
    }
}

/// Read a NUL-terminated (or NUL-padded) ASCII field, rejecting non-ASCII.
fn read_nul_padded(src: &[u8]) -> Option<String> {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    let slice = &src[..end];
    if !slice.is_ascii() {
        return None;
    }
    Some(String::from_utf8_lossy(slice).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    fn sample() -> ControlMessage {
        ControlMessage {
            kind: MessageKind::Hello,
            mac_addr: "02:00:00:00:00:01".parse().unwrap(),
            vpn_ip: Ipv4Addr::new(10, 1, 0, 1),
            vpn_netmask: Ipv4Addr::new(255, 255, 255, 0),
            public_key: "AAAA".to_string(),
            endpoint_ip: Ipv4Addr::new(203, 0, 113, 7),
            endpoint_port: 51820,
            allowed_ips: "10.1.0.1/32".to_string(),
        }
    }

    #[test]
    fn round_trip() {
        let msg = sample();
        let buf = encode(&msg);
        let decoded = decode(&buf).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn wire_layout_matches_spec_offsets() {
        let msg = sample();
        let buf = encode(&msg);
        assert_eq!(buf.len(), 325);
        assert_eq!(&buf[0..4], &0u32.to_le_bytes());
        assert_eq!(&buf[4..10], &[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&buf[10..14], &[10, 1, 0, 1]);
        assert_eq!(&buf[14..18], &[255, 255, 255, 0]);
        assert_eq!(&buf[18..22], b"AAAA");
        assert_eq!(buf[22], 0); // NUL padding after "AAAA"
        assert_eq!(&buf[63..67], &[203, 0, 113, 7]);
        assert_eq!(&buf[67..69], &51820u16.to_ne_bytes());
        assert_eq!(&buf[69..80], b"10.1.0.1/32");
        assert_eq!(buf[80], 0);
    }

    #[test]
    fn rejects_short_buffer() {
        let err = decode(&[0u8; 10]).unwrap_err();
        assert_eq!(err, CodecError::ShortBuffer { expected: 325, actual: 10 });
    }

    #[test]
    fn nok_has_no_meaningful_payload() {
        let mac: MacAddr = "ff:ff:ff:ff:ff:ff".parse().unwrap();
        let msg = ControlMessage::nok(mac);
        let buf = encode(&msg);
        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded.kind, MessageKind::Nok);
        assert_eq!(decoded.mac_addr, mac);
    }
}
