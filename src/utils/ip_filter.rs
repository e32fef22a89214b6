use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// One entry of the `ALLOWED_IPS` list: an exact address or an IPv4 CIDR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedNetwork {
    Exact(IpAddr),
    V4Cidr { base: u32, prefix: u8 },
}

impl AllowedNetwork {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (AllowedNetwork::Exact(allowed), ip) => *allowed == ip,
            (AllowedNetwork::V4Cidr { base, prefix }, IpAddr::V4(v4)) => {
                let mask = mask_for(*prefix);
                (u32::from(v4) & mask) == (base & mask)
            }
            (AllowedNetwork::V4Cidr { .. }, IpAddr::V6(_)) => false,
        }
    }
}

fn mask_for(prefix: u8) -> u32 {
    if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) }
}

impl FromStr for AllowedNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((range, bits)) => {
                let base: std::net::Ipv4Addr = range
                    .parse()
                    .map_err(|_| format!("invalid CIDR base address: {s}"))?;
                let prefix: u8 = bits
                    .parse()
                    .ok()
                    .filter(|p| *p <= 32)
                    .ok_or_else(|| format!("invalid CIDR prefix: {s}"))?;
                Ok(AllowedNetwork::V4Cidr { base: u32::from(base), prefix })
            }
            None => s
                .parse::<IpAddr>()
                .map(AllowedNetwork::Exact)
                .map_err(|_| format!("invalid IP address: {s}")),
        }
    }
}

impl fmt::Display for AllowedNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowedNetwork::Exact(ip) => write!(f, "{ip}"),
            AllowedNetwork::V4Cidr { base, prefix } => {
                write!(f, "{}/{}", std::net::Ipv4Addr::from(*base), prefix)
            }
        }
    }
}

/// An empty allow-list admits everyone.
pub fn is_allowed(allowed: &[AllowedNetwork], ip: IpAddr) -> bool {
    allowed.is_empty() || allowed.iter().any(|net| net.contains(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn exact_match() {
        let list = vec!["10.0.0.5".parse::<AllowedNetwork>().unwrap()];
        assert!(is_allowed(&list, ip("10.0.0.5")));
        assert!(!is_allowed(&list, ip("10.0.0.6")));
    }

    #[test]
    fn cidr_match() {
        let list = vec!["192.168.1.0/24".parse::<AllowedNetwork>().unwrap()];
        assert!(is_allowed(&list, ip("192.168.1.200")));
        assert!(!is_allowed(&list, ip("192.168.2.1")));
        assert!(!is_allowed(&list, ip("::1")));
    }

    #[test]
    fn empty_list_allows_all() {
        assert!(is_allowed(&[], ip("8.8.8.8")));
    }

    #[test]
    fn rejects_bad_entries() {
        assert!("10.0.0.0/33".parse::<AllowedNetwork>().is_err());
        assert!("not-an-ip".parse::<AllowedNetwork>().is_err());
        assert_eq!(
            "10.1.0.0/16".parse::<AllowedNetwork>().unwrap().to_string(),
            "10.1.0.0/16"
        );
    }
}
