//! Expected resource counts per template, used as progress totals

use std::collections::BTreeMap;

pub const DOMAIN_RESOURCES: usize = 35;
pub const DOMAIN_PEERING_RESOURCES: usize = 4;
pub const DOMAIN_PEER_ROUTE_RESOURCES: usize = 2;
pub const DOMAIN_VPN_RESOURCES: usize = 4;
pub const DOMAIN_INTERNET_ACCESS_RESOURCES: usize = 3;
pub const DOMAIN_NO_INTERNET_ACCESS_RESOURCES: usize = 1;

/// Network, master and one compute group
pub const CLUSTER_RESOURCES: usize = 45;
pub const SOLO_CLUSTER_RESOURCES: usize = 46;
pub const COMPUTE_GROUP_RESOURCES: usize = 10;

/// Components are free-form templates
pub const COMPONENT_RESOURCES: usize = 0;

fn set(params: &BTreeMap<String, String>, key: &str) -> bool {
    params.get(key).is_some_and(|v| !v.is_empty())
}

/// Resources a domain stack creates given its resolved parameters
pub fn domain_resource_count(params: &BTreeMap<String, String>) -> usize {
    let mut count = DOMAIN_RESOURCES;
    if set(params, "PeerVPC") {
        count += DOMAIN_PEERING_RESOURCES;
        if set(params, "PeerVPCRouteTable") {
            count += DOMAIN_PEER_ROUTE_RESOURCES;
        }
    }
    if params.get("AllowInternetAccess").map(String::as_str) == Some("0") {
        count = count - DOMAIN_INTERNET_ACCESS_RESOURCES + DOMAIN_NO_INTERNET_ACCESS_RESOURCES;
    }
    if set(params, "VPNCustomerGateway") {
        count += DOMAIN_VPN_RESOURCES;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bare_domain() {
        assert_eq!(domain_resource_count(&params(&[("AllowInternetAccess", "1")])), 35);
    }

    #[test]
    fn test_peered_domain() {
        assert_eq!(domain_resource_count(&params(&[("PeerVPC", "vpc-9")])), 39);
        assert_eq!(
            domain_resource_count(&params(&[
                ("PeerVPC", "vpc-9"),
                ("PeerVPCRouteTable", "rtb-9")
            ])),
            41
        );
        // route table alone does nothing
        assert_eq!(domain_resource_count(&params(&[("PeerVPCRouteTable", "rtb-9")])), 35);
    }

    #[test]
    fn test_private_vpn_domain() {
        assert_eq!(
            domain_resource_count(&params(&[
                ("AllowInternetAccess", "0"),
                ("VPNCustomerGateway", "cgw-1")
            ])),
            37
        );
    }
}
