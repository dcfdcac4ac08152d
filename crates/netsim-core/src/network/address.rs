//! IPv4 subnet bookkeeping and sequential host address assignment.

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::network::topology::Topology;
use crate::network::types::IfaceId;

/// An IPv4 address range, given by a network address and a contiguous mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Creates a subnet from a base address and a dotted mask such as `255.255.255.0`. Host bits
    /// set in `base` are cleared.
    pub fn new(base: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, AddressError> {
        let bits = u32::from(mask);
        // A contiguous mask is a run of ones followed by a run of zeros.
        if bits.leading_ones() + bits.trailing_zeros() != 32 {
            return Err(AddressError::InvalidMask(mask));
        }
        Self::with_prefix(base, bits.leading_ones() as u8)
    }

    /// Creates a subnet from a base address and a prefix length.
    pub fn with_prefix(base: Ipv4Addr, prefix_len: u8) -> Result<Self, AddressError> {
        if prefix_len > 32 {
            return Err(AddressError::InvalidPrefix(prefix_len));
        }
        let network = Ipv4Addr::from(u32::from(base) & mask_bits(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// The `/24` network containing `base`.
    pub fn slash24(base: Ipv4Addr) -> Self {
        Self {
            network: Ipv4Addr::from(u32::from(base) & mask_bits(24)),
            prefix_len: 24,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.prefix_len))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask_bits(self.prefix_len))
    }

    /// The number of assignable host addresses, excluding the network and broadcast addresses.
    pub fn capacity(&self) -> u64 {
        let size = 1u64 << (32 - u32::from(self.prefix_len));
        size.saturating_sub(2)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask_bits(self.prefix_len) == u32::from(self.network)
    }

    /// The `n`th host address (starting at 1), if it fits in the subnet.
    fn host(&self, n: u64) -> Option<Ipv4Addr> {
        (n >= 1 && n <= self.capacity())
            .then(|| Ipv4Addr::from(u32::from(self.network) + n as u32))
    }
}

fn mask_bits(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Subnet {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || AddressError::Parse(s.to_owned());
        let (base, len) = s.split_once('/').ok_or_else(parse_err)?;
        let base = base.parse::<Ipv4Addr>().map_err(|_| parse_err())?;
        // Accept both `10.1.1.0/24` and `10.1.1.0/255.255.255.0`.
        match len.parse::<u8>() {
            Ok(len) => Self::with_prefix(base, len),
            Err(_) => {
                let mask = len.parse::<Ipv4Addr>().map_err(|_| parse_err())?;
                Self::new(base, mask)
            }
        }
    }
}

impl TryFrom<String> for Subnet {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

/// Hands out sequential host addresses from one subnet.
///
/// Several assignments through the same allocator continue numbering where the previous one
/// stopped, so addresses never repeat within the allocator's subnet.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    subnet: Subnet,
    next_host: u64,
}

impl AddressAllocator {
    pub fn new(subnet: Subnet) -> Self {
        Self {
            subnet,
            next_host: 1,
        }
    }

    pub fn subnet(&self) -> Subnet {
        self.subnet
    }

    /// The number of addresses still available.
    pub fn remaining(&self) -> u64 {
        (self.subnet.capacity() + 1).saturating_sub(self.next_host)
    }

    /// Assigns the next free addresses to `ifaces`, in the order given. Either every interface
    /// receives an address or none does.
    ///
    /// An interface that already holds an address is re-addressed.
    pub fn assign(
        &mut self,
        topology: &mut Topology,
        ifaces: &[IfaceId],
    ) -> Result<Vec<std::net::Ipv4Addr>, AddressError> {
        if let Some(&id) = ifaces.iter().find(|&&id| topology.iface(id).is_none()) {
            return Err(AddressError::UnknownInterface(id));
        }
        let requested = ifaces.len() as u64;
        let available = self.remaining();
        if requested > available {
            return Err(AddressError::AddressSpaceExhausted {
                subnet: self.subnet,
                requested,
                available,
            });
        }
        let mut assigned = Vec::with_capacity(ifaces.len());
        for &id in ifaces {
            // Both checks above guarantee that the host exists and the interface is known.
            let Some(addr) = self.subnet.host(self.next_host) else {
                unreachable!("host {} outside {}", self.next_host, self.subnet);
            };
            self.next_host += 1;
            topology.set_address(id, addr, self.subnet);
            assigned.push(addr);
        }
        log::debug!("assigned {} addresses in {}", assigned.len(), self.subnet);
        Ok(assigned)
    }
}

/// Assigns sequential host addresses from `subnet` to `ifaces`, starting at the first host
/// address. Every call is independent: two calls with the same subnet hand out the same
/// addresses.
pub fn assign_subnet(
    topology: &mut Topology,
    ifaces: &[IfaceId],
    subnet: Subnet,
) -> Result<Vec<Ipv4Addr>, AddressError> {
    AddressAllocator::new(subnet).assign(topology, ifaces)
}

/// Address configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// More interfaces than free host addresses.
    #[error("subnet {subnet} cannot hold {requested} more interfaces ({available} left)")]
    AddressSpaceExhausted {
        /// The subnet being assigned from.
        subnet: Subnet,
        /// The number of interfaces supplied.
        requested: u64,
        /// The number of addresses still free.
        available: u64,
    },

    /// The mask is not a run of ones followed by zeros.
    #[error("invalid subnet mask {0}")]
    InvalidMask(Ipv4Addr),

    /// The prefix length exceeds 32.
    #[error("invalid prefix length /{0}")]
    InvalidPrefix(u8),

    /// The interface is not part of the topology.
    #[error("interface {0} does not exist")]
    UnknownInterface(IfaceId),

    /// Malformed subnet notation.
    #[error("failed to parse subnet `{0}`")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::LinkParams;
    use crate::units::{Mbps, Millisecs};

    fn bus(topology: &mut Topology, n: usize) -> Vec<IfaceId> {
        let nodes = topology.add_nodes(n);
        let params = LinkParams::csma(Mbps::new(100), Millisecs::new(1));
        let (_, ifaces) = topology.connect(&nodes, params).unwrap();
        ifaces
    }

    #[test]
    fn point_to_point_addresses_in_install_order() -> anyhow::Result<()> {
        let mut topology = Topology::new();
        let nodes = topology.add_nodes(2);
        let params = LinkParams::point_to_point(Mbps::new(5), Millisecs::new(2));
        let (_, ifaces) = topology.connect(&nodes, params)?;
        let subnet = Subnet::new(
            Ipv4Addr::new(10, 1, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        )?;
        let addrs = assign_subnet(&mut topology, &ifaces, subnet)?;
        assert_eq!(
            addrs,
            vec![Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 2)]
        );
        assert_eq!(topology.iface(ifaces[0]).unwrap().address(), Some(addrs[0]));
        assert_eq!(topology.iface(ifaces[1]).unwrap().address(), Some(addrs[1]));
        Ok(())
    }

    #[test]
    fn slash24_clears_host_bits() -> anyhow::Result<()> {
        let subnet = Subnet::slash24(Ipv4Addr::new(10, 1, 3, 77));
        assert_eq!(subnet, "10.1.3.0/255.255.255.0".parse()?);
        assert_eq!(subnet.capacity(), 254);
        Ok(())
    }

    #[test]
    fn exact_capacity_succeeds_without_duplicates() -> anyhow::Result<()> {
        for prefix_len in [24, 28, 29, 30] {
            let subnet = Subnet::with_prefix(Ipv4Addr::new(10, 1, 2, 0), prefix_len)?;
            let mut topology = Topology::new();
            let ifaces = bus(&mut topology, subnet.capacity() as usize);
            let addrs = assign_subnet(&mut topology, &ifaces, subnet)?;
            let mut unique = addrs.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), addrs.len());
            assert!(addrs.iter().all(|&a| subnet.contains(a)));
            assert!(!addrs.contains(&subnet.network()));
            assert!(!addrs.contains(&subnet.broadcast()));
        }
        Ok(())
    }

    #[test]
    fn over_capacity_fails_and_assigns_nothing() -> anyhow::Result<()> {
        for prefix_len in [28, 29, 30, 31, 32] {
            let subnet = Subnet::with_prefix(Ipv4Addr::new(10, 1, 2, 0), prefix_len)?;
            let mut topology = Topology::new();
            let ifaces = bus(&mut topology, subnet.capacity() as usize + 1);
            let res = assign_subnet(&mut topology, &ifaces, subnet);
            assert!(matches!(
                res,
                Err(AddressError::AddressSpaceExhausted { .. })
            ));
            assert!(ifaces
                .iter()
                .all(|&id| topology.iface(id).unwrap().address().is_none()));
        }
        Ok(())
    }

    #[test]
    fn allocator_continues_numbering() -> anyhow::Result<()> {
        let mut topology = Topology::new();
        let stations = bus(&mut topology, 3);
        let ap = bus(&mut topology, 1);
        let mut allocator = AddressAllocator::new("10.1.3.0/24".parse()?);
        allocator.assign(&mut topology, &stations)?;
        let ap_addrs = allocator.assign(&mut topology, &ap)?;
        assert_eq!(ap_addrs, vec![Ipv4Addr::new(10, 1, 3, 4)]);
        assert_eq!(allocator.remaining(), 250);
        Ok(())
    }

    #[test]
    fn independent_calls_reuse_subnet() -> anyhow::Result<()> {
        let mut topology = Topology::new();
        let a = bus(&mut topology, 2);
        let b = bus(&mut topology, 2);
        let subnet: Subnet = "10.1.1.0/24".parse()?;
        let first = assign_subnet(&mut topology, &a, subnet)?;
        let second = assign_subnet(&mut topology, &b, subnet)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn subnet_parsing() -> anyhow::Result<()> {
        let subnet: Subnet = "10.2.1.77/255.255.255.0".parse()?;
        assert_eq!(subnet.to_string(), "10.2.1.0/24");
        assert_eq!(subnet.capacity(), 254);
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(10, 2, 1, 255));
        assert!(matches!(
            Subnet::new(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 255, 0)),
            Err(AddressError::InvalidMask(..))
        ));
        assert!(matches!(
            "10.0.0.0/33".parse::<Subnet>(),
            Err(AddressError::InvalidPrefix(33))
        ));
        assert!("10.0.0.0".parse::<Subnet>().is_err());
        Ok(())
    }

    #[test]
    fn unknown_interface_fails() {
        let mut topology = Topology::new();
        let subnet = Subnet::with_prefix(Ipv4Addr::new(10, 1, 1, 0), 24).unwrap();
        let res = assign_subnet(&mut topology, &[IfaceId::new(3)], subnet);
        assert!(matches!(res, Err(AddressError::UnknownInterface(..))));
    }
}
