//! Address allocation within the VPN subnet.
//!
//! Unlike a monotonic "next free counter" allocator, this always returns the
//! smallest host address not currently in use, so addresses released by a
//! deleted peer become available for reuse immediately.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::IpNet;

use crate::error::{ConfigError, Result};

/// Parses `subnet` and returns its reserved gateway address
/// (`network_address + 1`).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSubnet`] if `subnet` does not parse, or is
/// not IPv4.
pub fn gateway_address(subnet: &str) -> Result<IpAddr> {
    let net = parse_v4(subnet)?;
    let base = u32::from(net.network());
    Ok(IpAddr::V4(Ipv4Addr::from(base + 1)))
}

/// Returns the smallest host address in `subnet` not present in
/// `assigned`, skipping the reserved gateway address and the network and
/// broadcast addresses.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSubnet`] if `subnet` is malformed, or
/// [`ConfigError::SubnetExhausted`] if every host address is taken.
pub fn allocate(subnet: &str, assigned: &HashSet<IpAddr>) -> Result<IpAddr> {
    let net = parse_v4(subnet)?;
    let base = u32::from(net.network());
    let broadcast = u32::from(net.broadcast());
    let gateway = base + 1;

    for host in (base + 1)..broadcast {
        if host == gateway {
            continue;
        }
        let candidate = IpAddr::V4(Ipv4Addr::from(host));
        if !assigned.contains(&candidate) {
            return Ok(candidate);
        }
    }

    Err(ConfigError::SubnetExhausted)
}

fn parse_v4(subnet: &str) -> Result<ipnet::Ipv4Net> {
    let net = IpNet::from_str(subnet).map_err(|e| ConfigError::InvalidSubnet(e.to_string()))?;
    match net {
        IpNet::V4(v4) => Ok(v4),
        IpNet::V6(_) => Err(ConfigError::InvalidSubnet(format!(
            "{subnet} is IPv6, only IPv4 VPN subnets are supported"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_is_network_address_plus_one() {
        assert_eq!(
            gateway_address("10.0.0.0/24").unwrap(),
            "10.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn first_allocation_skips_gateway() {
        let used = HashSet::new();
        let ip = allocate("10.0.0.0/24", &used).unwrap();
        assert_eq!(ip, "10.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn allocation_returns_lowest_free_after_gap_released() {
        let mut used = HashSet::new();
        used.insert("10.0.0.2".parse().unwrap());
        used.insert("10.0.0.3".parse().unwrap());
        used.insert("10.0.0.5".parse().unwrap());

        // .4 was released and must win over .6, even though .6 was never used.
        let ip = allocate("10.0.0.0/24", &used).unwrap();
        assert_eq!(ip, "10.0.0.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn exhausted_subnet_errors() {
        let net: ipnet::Ipv4Net = "10.0.0.0/30".parse().unwrap();
        let mut used = HashSet::new();
        // /30 has hosts .1 (gateway) and .2 only; claim .2 too.
        used.insert(IpAddr::V4(Ipv4Addr::from(u32::from(net.network()) + 2)));
        let err = allocate("10.0.0.0/30", &used).unwrap_err();
        assert!(matches!(err, ConfigError::SubnetExhausted));
    }

    #[test]
    fn invalid_subnet_is_rejected() {
        assert!(matches!(
            allocate("not-a-subnet", &HashSet::new()),
            Err(ConfigError::InvalidSubnet(_))
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn allocate_never_returns_gateway_network_broadcast_or_assigned(
                third_octet in 0u8..=255,
                assigned_hosts in prop::collection::hash_set(1u8..=254, 0..20),
            ) {
                let subnet = format!("10.0.{third_octet}.0/24");
                let gateway = gateway_address(&subnet).unwrap();
                let assigned: HashSet<IpAddr> = assigned_hosts
                    .iter()
                    .map(|&h| IpAddr::V4(Ipv4Addr::new(10, 0, third_octet, h)))
                    .collect();

                if let Ok(ip) = allocate(&subnet, &assigned) {
                    prop_assert_ne!(ip, gateway);
                    prop_assert!(!assigned.contains(&ip));
                    let IpAddr::V4(v4) = ip else { unreachable!("subnet is IPv4") };
                    prop_assert_ne!(v4.octets()[3], 0);
                    prop_assert_ne!(v4.octets()[3], 255);
                }
            }

            #[test]
            fn allocate_returns_the_smallest_free_host(
                third_octet in 0u8..=255,
                assigned_hosts in prop::collection::hash_set(1u8..=254, 0..20),
            ) {
                let subnet = format!("10.0.{third_octet}.0/24");
                let assigned: HashSet<IpAddr> = assigned_hosts
                    .iter()
                    .map(|&h| IpAddr::V4(Ipv4Addr::new(10, 0, third_octet, h)))
                    .collect();

                let ip = allocate(&subnet, &assigned).unwrap();
                let IpAddr::V4(v4) = ip else { unreachable!("subnet is IPv4") };
                let won = v4.octets()[3];

                for host in 2..won {
                    let candidate = IpAddr::V4(Ipv4Addr::new(10, 0, third_octet, host));
                    prop_assert!(assigned.contains(&candidate), "host {host} was free but not chosen");
                }
            }
        }
    }
}
