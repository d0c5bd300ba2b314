//! Client identity generation.
//!
//! Every client instance carries a MAC-like token of six octets, rendered as
//! `00:xx:xx:xx:xx:xx`. The first octet is always zero; the remaining five
//! come from a PRNG seeded with the wall-clock second, the process id, and a
//! per-instance value.
//!
//! The seed only changes once per second. Two instances created in the same
//! second with the same instance value produce the same identity.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};

/// Number of octets in an identity.
pub const IDENTITY_LEN: usize = 6;

/// A MAC-like client identifier, immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIdentity([u8; IDENTITY_LEN]);

impl ClientIdentity {
    /// Generates a fresh identity for the given instance.
    ///
    /// `instance` distinguishes units started by the same process in the
    /// same second (single-instance mode passes 0).
    pub fn generate(instance: u64) -> Self {
        let seed = (chrono::Utc::now().timestamp() as u64)
            .wrapping_add(u64::from(std::process::id()))
            .wrapping_add(instance);
        Self::from_seed(seed)
    }

    /// Derives an identity from an explicit seed.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut octets = [0u8; IDENTITY_LEN];
        rng.fill(&mut octets[1..]);
        Self(octets)
    }

    pub fn octets(&self) -> [u8; IDENTITY_LEN] {
        self.0
    }
}

impl From<[u8; IDENTITY_LEN]> for ClientIdentity {
    fn from(octets: [u8; IDENTITY_LEN]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":");
        f.write_str(&rendered)
    }
}

impl FromStr for ClientIdentity {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut octets = [0u8; IDENTITY_LEN];
        let mut parts = text.split(':');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::InvalidMessage(format!("identity too short: {}", text)))?;
            if part.len() != 2 || !part.bytes().all(|byte| byte.is_ascii_hexdigit()) {
                return Err(Error::InvalidMessage(format!(
                    "identity octet '{}' is not two hex digits",
                    part
                )));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| {
                Error::InvalidMessage(format!("identity octet '{}' is not hex", part))
            })?;
        }

        if parts.next().is_some() {
            return Err(Error::InvalidMessage(format!(
                "identity too long: {}",
                text
            )));
        }

        Ok(Self(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_identity_format(rendered: &str) {
        assert_eq!(rendered.len(), 17);
        assert!(rendered.starts_with("00:"));
        for (index, ch) in rendered.chars().enumerate() {
            if index % 3 == 2 {
                assert_eq!(ch, ':');
            } else {
                assert!(ch.is_ascii_digit() || ('a'..='f').contains(&ch), "bad char {ch}");
            }
        }
    }

    #[test]
    fn test_generated_identity_format() {
        for instance in 0..64 {
            let identity = ClientIdentity::generate(instance);
            assert_identity_format(&identity.to_string());
            assert_eq!(identity.octets()[0], 0);
        }
    }

    #[test]
    fn test_seeded_identity_is_deterministic() {
        assert_eq!(ClientIdentity::from_seed(42), ClientIdentity::from_seed(42));
        assert_ne!(ClientIdentity::from_seed(42), ClientIdentity::from_seed(43));
    }

    #[test]
    fn test_display_and_parse() {
        let identity = ClientIdentity::from([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(identity.to_string(), "00:1a:2b:3c:4d:5e");
        assert_eq!("00:1a:2b:3c:4d:5e".parse::<ClientIdentity>().unwrap(), identity);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("00:1a:2b:3c:4d".parse::<ClientIdentity>().is_err());
        assert!("00:1a:2b:3c:4d:5e:6f".parse::<ClientIdentity>().is_err());
        assert!("00:1a:2b:3c:4d:zz".parse::<ClientIdentity>().is_err());
        assert!("001a2b3c4d5e".parse::<ClientIdentity>().is_err());
        assert!("00:+a:2b:3c:4d:5e".parse::<ClientIdentity>().is_err());
    }
}
