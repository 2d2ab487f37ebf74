// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for security group rule compilation
//!
//! These tests use proptest to generate random address and port ranges and
//! verify that:
//! 1. A range decomposes into CIDR blocks that cover it exactly, in order
//! 2. Every block is aligned to its own size
//! 3. The decomposition is never longer than one block per address
//! 4. Port parsing accepts every well-formed spec and rejects inverted ranges

use std::net::Ipv4Addr;

use proptest::prelude::*;

use cf_controllers::crd::PortRange;
use cf_controllers::resources::network_policy::{
    ip_range_to_cidrs, parse_destination, parse_ports,
};

/// Split `a.b.c.d/n` into (first address, prefix length)
fn block(cidr: &str) -> (u64, u32) {
    let (address, prefix) = cidr.split_once('/').unwrap();
    let address: Ipv4Addr = address.parse().unwrap();
    (u64::from(u32::from(address)), prefix.parse().unwrap())
}

fn block_size(prefix: u32) -> u64 {
    1u64 << (32 - prefix)
}

/// An ordered pair of addresses no more than `span` apart
fn address_range(span: u32) -> impl Strategy<Value = (u32, u32)> {
    (any::<u32>(), 0..=span).prop_map(|(start, width)| (start, start.saturating_add(width)))
}

proptest! {
    #[test]
    fn cidrs_cover_range_exactly((start, end) in address_range(100_000)) {
        let cidrs = ip_range_to_cidrs(Ipv4Addr::from(start), Ipv4Addr::from(end));

        let mut next = u64::from(start);
        for cidr in &cidrs {
            let (first, prefix) = block(cidr);
            prop_assert_eq!(first, next, "gap or overlap at {}", cidr);
            next = first + block_size(prefix);
        }
        prop_assert_eq!(next, u64::from(end) + 1);
    }

    #[test]
    fn cidrs_are_aligned((start, end) in address_range(1_000_000)) {
        for cidr in ip_range_to_cidrs(Ipv4Addr::from(start), Ipv4Addr::from(end)) {
            let (first, prefix) = block(&cidr);
            prop_assert_eq!(first % block_size(prefix), 0, "{} is misaligned", cidr);
        }
    }

    #[test]
    fn cidrs_are_no_longer_than_addresses((start, end) in address_range(5_000)) {
        let cidrs = ip_range_to_cidrs(Ipv4Addr::from(start), Ipv4Addr::from(end));
        prop_assert!(!cidrs.is_empty());
        prop_assert!(cidrs.len() as u64 <= u64::from(end - start) + 1);
        // Greedy decomposition never needs more than two blocks per prefix length
        prop_assert!(cidrs.len() <= 62);
    }

    #[test]
    fn single_address_is_one_host_block(address in any::<u32>()) {
        let address = Ipv4Addr::from(address);
        prop_assert_eq!(ip_range_to_cidrs(address, address), vec![format!("{}/32", address)]);
    }

    #[test]
    fn destination_ranges_match_decomposition((start, end) in address_range(10_000)) {
        let (start, end) = (Ipv4Addr::from(start), Ipv4Addr::from(end));
        let parsed = parse_destination(&format!("{}-{}", start, end)).unwrap();
        prop_assert_eq!(parsed, ip_range_to_cidrs(start, end));
    }

    #[test]
    fn inverted_destination_ranges_are_rejected(a in any::<u32>(), b in any::<u32>()) {
        prop_assume!(a != b);
        let (low, high) = (Ipv4Addr::from(a.min(b)), Ipv4Addr::from(a.max(b)));
        let input = format!("{}-{}", high, low);
        prop_assert!(parse_destination(&input).is_err());
    }

    #[test]
    fn port_lists_parse(ports in prop::collection::vec(any::<u16>(), 1..8)) {
        let spec = ports.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
        let parsed = parse_ports(&spec).unwrap();
        let expected: Vec<PortRange> = ports.into_iter().map(PortRange::single).collect();
        prop_assert_eq!(parsed, expected);
    }

    #[test]
    fn port_ranges_parse(a in any::<u16>(), b in any::<u16>()) {
        let (min_port, max_port) = (a.min(b), a.max(b));
        let parsed = parse_ports(&format!("{}-{}", min_port, max_port)).unwrap();
        prop_assert_eq!(parsed, vec![PortRange { min_port, max_port }]);

        if min_port != max_port {
            let input = format!("{}-{}", max_port, min_port);
            prop_assert!(parse_ports(&input).is_err());
        }
    }
}
