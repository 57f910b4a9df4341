use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

/// A CIDR block with the region it is published for.
///
/// The stored network is always truncated, so `network().addr()` is the
/// canonical network address of the block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkRange {
    network: IpNet,
    region: Option<String>,
}

impl NetworkRange {
    pub fn new(network: IpNet, region: Option<&str>) -> Self {
        Self {
            network: network.trunc(),
            region: region.map(normalize_region).filter(|r| !r.is_empty()),
        }
    }

    /// Parse a block in `addr/prefix` notation.
    pub fn parse(cidr: &str, region: Option<&str>) -> Result<Self, ipnet::AddrParseError> {
        let network: IpNet = cidr.trim().parse()?;
        Ok(Self::new(network, region))
    }

    pub fn network(&self) -> IpNet {
        self.network
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.network.contains(addr)
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{} ({})", self.network, region),
            None => write!(f, "{}", self.network),
        }
    }
}

pub(crate) fn normalize_region(region: &str) -> String {
    region.trim().to_lowercase()
}
