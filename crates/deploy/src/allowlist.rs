//! Peer-address authorisation.
//!
//! The check is provider-agnostic: an address inside *any* provider's ranges
//! authorises the request. Which provider sent it is decided later, from the
//! payload shape.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::config::ProviderConfig;
use crate::types::Provider;

/// The union of every provider's permitted network ranges.
#[derive(Debug, Clone, Default)]
pub struct AddressAllowlist {
    ranges: Vec<(Provider, IpNet)>,
}

impl AddressAllowlist {
    /// Collects the ranges of every configured provider.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let ranges = config
            .iter()
            .flat_map(|(provider, settings)| {
                settings
                    .allowed_networks
                    .iter()
                    .map(move |net| (provider, *net))
            })
            .collect();
        Self { ranges }
    }

    /// Returns `true` if `peer` falls inside any configured range.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are compared as IPv4.
    pub fn is_authorized(&self, peer: IpAddr) -> bool {
        self.first_matching_provider(peer).is_some()
    }

    /// Returns the provider whose range first contains `peer`.
    ///
    /// For logging only; the payload, not the range, decides the provider.
    pub fn first_matching_provider(&self, peer: IpAddr) -> Option<Provider> {
        let peer = peer.to_canonical();
        self.ranges
            .iter()
            .find(|(_, net)| net.contains(&peer))
            .map(|(provider, _)| *provider)
    }

    /// Parses `peer` and checks it; unparseable addresses are not authorised.
    pub fn is_authorized_str(&self, peer: &str) -> bool {
        peer.trim()
            .parse::<IpAddr>()
            .is_ok_and(|addr| self.is_authorized(addr))
    }

    /// Number of ranges across all providers.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns `true` when no provider configured any range.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{parse_network, ProviderSettings};

    fn settings(networks: &[&str]) -> ProviderSettings {
        ProviderSettings {
            allowed_networks: networks.iter().map(|n| parse_network(n).unwrap()).collect(),
            ssh_account: String::new(),
            watch: Vec::new(),
        }
    }

    fn allowlist() -> AddressAllowlist {
        let mut providers = BTreeMap::new();
        providers.insert(Provider::GitHub, settings(&["192.30.252.0/22"]));
        providers.insert(Provider::Bitbucket, settings(&["104.192.143.0/24", "2401:1d80::/32"]));
        AddressAllowlist::from_config(&ProviderConfig::new(providers))
    }

    #[test]
    fn address_in_any_provider_range_is_authorized() {
        let allowlist = allowlist();
        assert!(allowlist.is_authorized_str("192.30.253.17"));
        assert!(allowlist.is_authorized_str("104.192.143.1"));
        assert!(allowlist.is_authorized_str("2401:1d80::1"));
    }

    #[test]
    fn address_outside_all_ranges_is_rejected() {
        let allowlist = allowlist();
        assert!(!allowlist.is_authorized_str("8.8.8.8"));
        assert!(!allowlist.is_authorized_str("127.0.0.1"));
    }

    #[test]
    fn malformed_address_is_rejected() {
        let allowlist = allowlist();
        assert!(!allowlist.is_authorized_str("not-an-ip"));
        assert!(!allowlist.is_authorized_str(""));
        assert!(!allowlist.is_authorized_str("192.30.252.0/22"));
    }

    #[test]
    fn ipv4_mapped_address_matches_ipv4_range() {
        assert!(allowlist().is_authorized_str("::ffff:192.30.252.10"));
    }

    #[test]
    fn repeated_checks_agree() {
        let allowlist = allowlist();
        for _ in 0..3 {
            assert!(allowlist.is_authorized_str("192.30.252.1"));
            assert!(!allowlist.is_authorized_str("10.0.0.1"));
        }
    }

    #[test]
    fn loopback_exemption_authorizes_localhost() {
        let mut providers = BTreeMap::new();
        providers.insert(Provider::GitHub, settings(&["192.30.252.0/22"]));
        let config = ProviderConfig::new(providers).with_loopback_exemption();
        let allowlist = AddressAllowlist::from_config(&config);
        assert!(allowlist.is_authorized_str("127.0.0.1"));
        assert!(allowlist.is_authorized_str("::1"));
        assert_eq!(allowlist.len(), 3);
    }
}
