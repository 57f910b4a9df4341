use super::network::NetworkRange;
use ipnet::IpNet;
use std::collections::{BTreeSet, HashSet};
use std::net::{IpAddr, SocketAddr};

/// Immutable point-in-time set of network ranges.
///
/// Ranges are indexed by address family. A refresh always builds a new set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    v4: Vec<NetworkRange>,
    v6: Vec<NetworkRange>,
}

impl RangeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set, keeping the first occurrence of each block.
    ///
    /// Only the first region label of a repeated block survives, so region
    /// filtering has to happen before the set is built.
    pub fn new(ranges: impl IntoIterator<Item = NetworkRange>) -> Self {
        let mut seen: HashSet<IpNet> = HashSet::new();
        let mut set = Self::default();

        for range in ranges {
            if !seen.insert(range.network()) {
                continue;
            }
            match range.network() {
                IpNet::V4(_) => set.v4.push(range),
                IpNet::V6(_) => set.v6.push(range),
            }
        }

        set
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkRange> {
        self.v4.iter().chain(self.v6.iter())
    }

    /// Distinct region labels present in the set
    pub fn regions(&self) -> BTreeSet<&str> {
        self.iter().filter_map(NetworkRange::region).collect()
    }

    /// Check whether a textual address (optionally with a port) is inside any range.
    ///
    /// Addresses that cannot be parsed are never contained, so callers fall
    /// back to the edge redirect.
    pub fn contains(&self, addr: &str) -> bool {
        match parse_addr(addr) {
            Some(ip) => self.contains_ip(ip),
            None => false,
        }
    }

    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(_) => self.v4.iter().any(|range| range.contains(&ip)),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.contains_ip(IpAddr::V4(v4)),
                None => self.v6.iter().any(|range| range.contains(&ip)),
            },
        }
    }
}

impl FromIterator<NetworkRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = NetworkRange>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Parse `ip`, `ip:port`, `[ipv6]` or `[ipv6]:port`.
pub(crate) fn parse_addr(addr: &str) -> Option<IpAddr> {
    let addr = addr.trim();

    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Some(socket.ip());
    }

    addr.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(|inner| inner.parse().ok())
}
