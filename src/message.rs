//! Text message framing for the lease protocol.
//!
//! Every message is a single ASCII line carried in one UDP datagram. The
//! kind tag comes first, followed by a colon and `;`-separated fields.
//!
//! # Message Grammar
//!
//! ```text
//! DHCPDISCOVER: MAC <identity> [free text, ignored]
//! DHCPREQUEST:  IP=<ip>; MAC <identity>
//! DHCPRELEASE:  IP=<ip>; MAC <identity>
//! DHCPOFFER:    IP=<ip>; MASK=<mask>; GATEWAY=<gw>; DNS=<dns>; LEASE=<seconds>
//! DHCPACK:      IP=<ip>; MASK=<mask>; GATEWAY=<gw>; DNS=<dns>; LEASE=<seconds>
//! ```
//!
//! OFFER and ACK must carry exactly five fields in the order above. Anything
//! else is rejected as a whole; there are no partial results.
//!
//! Senders written in C often transmit the terminating NUL. Decoding stops at
//! the first NUL byte, so such padding is harmless.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::identity::ClientIdentity;

/// Free text appended to DISCOVER. Receivers ignore it.
const DISCOVER_COMMENT: &str = "configuration request";

/// Longest dotted-quad IPv4 address (`255.255.255.255`).
const MAX_ADDRESS_LEN: usize = 15;

/// Number of fields in an OFFER or ACK body.
const LEASE_FIELD_COUNT: usize = 5;

const MAC_MARKER: &str = "MAC";

/// The five message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Discover,
    Offer,
    Request,
    Ack,
    Release,
}

impl MessageKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Discover => "DHCPDISCOVER",
            Self::Offer => "DHCPOFFER",
            Self::Request => "DHCPREQUEST",
            Self::Ack => "DHCPACK",
            Self::Release => "DHCPRELEASE",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "DHCPDISCOVER" => Some(Self::Discover),
            "DHCPOFFER" => Some(Self::Offer),
            "DHCPREQUEST" => Some(Self::Request),
            "DHCPACK" => Some(Self::Ack),
            "DHCPRELEASE" => Some(Self::Release),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discover => "DISCOVER",
            Self::Offer => "OFFER",
            Self::Request => "REQUEST",
            Self::Ack => "ACK",
            Self::Release => "RELEASE",
        };
        f.write_str(name)
    }
}

/// Network parameters granted by a server in an OFFER or ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOffer {
    pub assigned_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns_server: Ipv4Addr,
    pub lease_seconds: u32,
}

impl LeaseOffer {
    /// T1: half the lease duration, in seconds.
    pub fn renewal_seconds(&self) -> u64 {
        u64::from(self.lease_seconds) / 2
    }

    /// T2: seven eighths of the lease duration, in seconds.
    pub fn rebinding_seconds(&self) -> u64 {
        u64::from(self.lease_seconds) * 7 / 8
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.lease_seconds))
    }

    pub fn renewal_time(&self) -> Duration {
        Duration::from_secs(self.renewal_seconds())
    }

    pub fn rebinding_time(&self) -> Duration {
        Duration::from_secs(self.rebinding_seconds())
    }

    fn encode_fields(&self) -> String {
        format!(
            "IP={}; MASK={}; GATEWAY={}; DNS={}; LEASE={}",
            self.assigned_ip, self.subnet_mask, self.gateway, self.dns_server, self.lease_seconds
        )
    }

    fn parse_fields(body: &str) -> Result<Self> {
        let fields: Vec<&str> = body.split(';').map(str::trim).collect();
        if fields.len() != LEASE_FIELD_COUNT {
            return Err(Error::InvalidMessage(format!(
                "expected {} lease fields, found {}",
                LEASE_FIELD_COUNT,
                fields.len()
            )));
        }

        let lease = field_value(fields[4], "LEASE")?;
        let lease_seconds: i64 = lease
            .parse()
            .map_err(|_| Error::InvalidMessage(format!("LEASE '{}' is not a number", lease)))?;
        let lease_seconds = u32::try_from(lease_seconds).map_err(|_| {
            Error::InvalidMessage(format!("LEASE {} is out of range", lease_seconds))
        })?;

        Ok(Self {
            assigned_ip: address_field(fields[0], "IP")?,
            subnet_mask: address_field(fields[1], "MASK")?,
            gateway: address_field(fields[2], "GATEWAY")?,
            dns_server: address_field(fields[3], "DNS")?,
            lease_seconds,
        })
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    Discover {
        identity: ClientIdentity,
    },
    Request {
        identity: ClientIdentity,
        ip: Ipv4Addr,
    },
    Release {
        identity: ClientIdentity,
        ip: Ipv4Addr,
    },
    Offer(LeaseOffer),
    Ack(LeaseOffer),
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Discover { .. } => MessageKind::Discover,
            Self::Request { .. } => MessageKind::Request,
            Self::Release { .. } => MessageKind::Release,
            Self::Offer(_) => MessageKind::Offer,
            Self::Ack(_) => MessageKind::Ack,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let tag = self.kind().tag();
        let text = match self {
            Self::Discover { identity } => {
                format!("{}: {} {} {}", tag, MAC_MARKER, identity, DISCOVER_COMMENT)
            }
            Self::Request { identity, ip } | Self::Release { identity, ip } => {
                format!("{}: IP={}; {} {}", tag, ip, MAC_MARKER, identity)
            }
            Self::Offer(offer) | Self::Ack(offer) => {
                format!("{}: {}", tag, offer.encode_fields())
            }
        };
        text.into_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let used = data.iter().position(|byte| *byte == 0).unwrap_or(data.len());
        let text = String::from_utf8_lossy(&data[..used]);

        let (tag, body) = text
            .split_once(':')
            .ok_or_else(|| Error::InvalidMessage("missing message kind".to_string()))?;
        let kind = MessageKind::from_tag(tag.trim()).ok_or_else(|| {
            Error::InvalidMessage(format!("unknown message kind '{}'", tag.trim()))
        })?;

        match kind {
            MessageKind::Discover => Ok(Self::Discover {
                identity: identity_after_marker(body)?,
            }),
            MessageKind::Request => {
                let (identity, ip) = parse_client_fields(body)?;
                Ok(Self::Request { identity, ip })
            }
            MessageKind::Release => {
                let (identity, ip) = parse_client_fields(body)?;
                Ok(Self::Release { identity, ip })
            }
            MessageKind::Offer => Ok(Self::Offer(LeaseOffer::parse_fields(body)?)),
            MessageKind::Ack => Ok(Self::Ack(LeaseOffer::parse_fields(body)?)),
        }
    }
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.encode()))
    }
}

fn field_value<'a>(field: &'a str, key: &str) -> Result<&'a str> {
    match field.split_once('=') {
        Some((name, value)) if name.trim() == key => Ok(value.trim()),
        _ => Err(Error::InvalidMessage(format!(
            "expected {}=<value>, found '{}'",
            key, field
        ))),
    }
}

fn address_field(field: &str, key: &str) -> Result<Ipv4Addr> {
    let value = field_value(field, key)?;
    if value.len() > MAX_ADDRESS_LEN {
        return Err(Error::InvalidMessage(format!(
            "{} value '{}' exceeds {} characters",
            key, value, MAX_ADDRESS_LEN
        )));
    }
    value
        .parse()
        .map_err(|_| Error::InvalidMessage(format!("{} value '{}' is not IPv4", key, value)))
}

fn identity_after_marker(text: &str) -> Result<ClientIdentity> {
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == MAC_MARKER {
            let identity = tokens
                .next()
                .ok_or_else(|| Error::InvalidMessage("MAC marker without identity".to_string()))?;
            return identity.trim_end_matches(';').parse();
        }
    }
    Err(Error::InvalidMessage("missing MAC marker".to_string()))
}

fn parse_client_fields(body: &str) -> Result<(ClientIdentity, Ipv4Addr)> {
    let (ip_field, rest) = body
        .split_once(';')
        .ok_or_else(|| Error::InvalidMessage("missing IP field".to_string()))?;
    let ip = address_field(ip_field.trim(), "IP")?;
    let identity = identity_after_marker(rest)?;
    Ok((identity, ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_offer() -> LeaseOffer {
        LeaseOffer {
            assigned_ip: Ipv4Addr::new(192, 168, 1, 10),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns_server: Ipv4Addr::new(8, 8, 8, 8),
            lease_seconds: 120,
        }
    }

    fn sample_identity() -> ClientIdentity {
        ClientIdentity::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee])
    }

    #[test]
    fn test_encode_offer_text() {
        let encoded = ProtocolMessage::Offer(sample_offer()).encode();
        assert_eq!(
            encoded,
            b"DHCPOFFER: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=120"
        );
    }

    #[test]
    fn test_encode_request_and_release_text() {
        let identity = sample_identity();
        let ip = Ipv4Addr::new(192, 168, 1, 10);

        let request = ProtocolMessage::Request { identity, ip }.encode();
        assert_eq!(request, b"DHCPREQUEST: IP=192.168.1.10; MAC 00:aa:bb:cc:dd:ee");

        let release = ProtocolMessage::Release { identity, ip }.encode();
        assert_eq!(release, b"DHCPRELEASE: IP=192.168.1.10; MAC 00:aa:bb:cc:dd:ee");
    }

    #[test]
    fn test_decode_ack() {
        let data = b"DHCPACK: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=120";
        let message = ProtocolMessage::decode(data).unwrap();
        assert_eq!(message, ProtocolMessage::Ack(sample_offer()));
        assert_eq!(message.kind(), MessageKind::Ack);
    }

    #[test]
    fn test_decode_stops_at_nul() {
        let mut data = ProtocolMessage::Offer(sample_offer()).encode();
        data.push(0);
        data.extend_from_slice(b"garbage after terminator");
        assert_eq!(
            ProtocolMessage::decode(&data).unwrap(),
            ProtocolMessage::Offer(sample_offer())
        );
    }

    #[test]
    fn test_decode_discover_ignores_commentary() {
        let data = "DHCPDISCOVER: MAC 00:aa:bb:cc:dd:ee Solicitud de configuración".as_bytes();
        let message = ProtocolMessage::decode(data).unwrap();
        assert_eq!(
            message,
            ProtocolMessage::Discover {
                identity: sample_identity()
            }
        );
    }

    #[test]
    fn test_decode_request_with_trailing_text() {
        let data = b"DHCPREQUEST: IP=10.0.0.5; MAC 00:aa:bb:cc:dd:ee trailing words";
        let message = ProtocolMessage::decode(data).unwrap();
        assert_eq!(
            message,
            ProtocolMessage::Request {
                identity: sample_identity(),
                ip: Ipv4Addr::new(10, 0, 0, 5),
            }
        );
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        let four = b"DHCPOFFER: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8";
        assert!(ProtocolMessage::decode(four).is_err());

        let six = b"DHCPACK: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=120; EXTRA=1";
        assert!(ProtocolMessage::decode(six).is_err());
    }

    #[test]
    fn test_bad_lease_values_rejected() {
        let missing = b"DHCPACK: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=";
        assert!(ProtocolMessage::decode(missing).is_err());

        let text = b"DHCPACK: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=soon";
        assert!(ProtocolMessage::decode(text).is_err());

        let negative = b"DHCPACK: IP=192.168.1.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=-5";
        assert!(ProtocolMessage::decode(negative).is_err());
    }

    #[test]
    fn test_fields_out_of_order_rejected() {
        let data = b"DHCPOFFER: MASK=255.255.255.0; IP=192.168.1.10; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=120";
        assert!(ProtocolMessage::decode(data).is_err());
    }

    #[test]
    fn test_overlong_address_rejected() {
        let data = b"DHCPOFFER: IP=0192.0168.0001.10; MASK=255.255.255.0; GATEWAY=192.168.1.1; DNS=8.8.8.8; LEASE=120";
        assert!(ProtocolMessage::decode(data).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(ProtocolMessage::decode(b"DHCPNAK: no").is_err());
        assert!(ProtocolMessage::decode(b"no colon here").is_err());
        assert!(ProtocolMessage::decode(b"").is_err());
    }

    #[test]
    fn test_timers_derived_from_lease() {
        let offer = sample_offer();
        assert_eq!(offer.renewal_seconds(), 60);
        assert_eq!(offer.rebinding_seconds(), 105);
        assert_eq!(offer.lease_duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_rebinding_does_not_overflow() {
        let offer = LeaseOffer {
            lease_seconds: u32::MAX,
            ..sample_offer()
        };
        assert_eq!(offer.rebinding_seconds(), u64::from(u32::MAX) * 7 / 8);
    }
}
