use std::net::Ipv4Addr;

use proptest::prelude::*;

use leaseclient::{ClientIdentity, Error, LeaseOffer, ProtocolMessage};

fn any_ipv4() -> impl Strategy<Value = Ipv4Addr> {
    any::<[u8; 4]>().prop_map(Ipv4Addr::from)
}

fn any_lease() -> impl Strategy<Value = LeaseOffer> {
    (any_ipv4(), any_ipv4(), any_ipv4(), any_ipv4(), any::<u32>()).prop_map(
        |(assigned_ip, subnet_mask, gateway, dns_server, lease_seconds)| LeaseOffer {
            assigned_ip,
            subnet_mask,
            gateway,
            dns_server,
            lease_seconds,
        },
    )
}

fn any_identity() -> impl Strategy<Value = ClientIdentity> {
    any::<u64>().prop_map(ClientIdentity::from_seed)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(5000))]

    #[test]
    fn decode_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = ProtocolMessage::decode(&data);
    }

    #[test]
    fn decode_never_panics_on_arbitrary_offer_bodies(body in ".{0,200}") {
        let _ = ProtocolMessage::decode(format!("DHCPOFFER: {}", body).as_bytes());
        let _ = ProtocolMessage::decode(format!("DHCPREQUEST: {}", body).as_bytes());
    }

    #[test]
    fn offer_and_ack_survive_encode_decode(lease in any_lease()) {
        let offer = ProtocolMessage::Offer(lease);
        prop_assert_eq!(ProtocolMessage::decode(&offer.encode()).unwrap(), offer);

        let ack = ProtocolMessage::Ack(lease);
        prop_assert_eq!(ProtocolMessage::decode(&ack.encode()).unwrap(), ack);
    }

    #[test]
    fn client_messages_survive_encode_decode(identity in any_identity(), ip in any_ipv4()) {
        for message in [
            ProtocolMessage::Discover { identity },
            ProtocolMessage::Request { identity, ip },
            ProtocolMessage::Release { identity, ip },
        ] {
            prop_assert_eq!(ProtocolMessage::decode(&message.encode()).unwrap(), message);
        }
    }

    #[test]
    fn wrong_field_counts_always_rejected(
        lease in any_lease(),
        keep in 0usize..5,
        extra in 1usize..4,
    ) {
        let encoded = String::from_utf8(ProtocolMessage::Ack(lease).encode()).unwrap();
        let (_, body) = encoded.split_once(": ").unwrap();
        let fields: Vec<&str> = body.split("; ").collect();

        let fewer = format!("DHCPACK: {}", fields[..keep].join("; "));
        prop_assert!(matches!(
            ProtocolMessage::decode(fewer.as_bytes()),
            Err(Error::InvalidMessage(_))
        ));

        let mut longer = fields.clone();
        longer.extend(std::iter::repeat_n("LEASE=1", extra));
        let more = format!("DHCPOFFER: {}", longer.join("; "));
        prop_assert!(matches!(
            ProtocolMessage::decode(more.as_bytes()),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn identities_always_render_as_mac_tokens(seed in any::<u64>()) {
        let rendered = ClientIdentity::from_seed(seed).to_string();
        prop_assert_eq!(rendered.len(), 17);
        prop_assert!(rendered.starts_with("00:"));
        prop_assert!(rendered
            .split(':')
            .all(|octet| octet.len() == 2
                && octet.chars().all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))));
    }

    #[test]
    fn non_numeric_lease_always_rejected(lease in any_lease(), junk in "[a-zA-Z]{1,8}") {
        let encoded = String::from_utf8(ProtocolMessage::Offer(lease).encode()).unwrap();
        let (prefix, _) = encoded.rsplit_once("LEASE=").unwrap();
        let tampered = format!("{}LEASE={}", prefix, junk);
        prop_assert!(ProtocolMessage::decode(tampered.as_bytes()).is_err());
    }
}
