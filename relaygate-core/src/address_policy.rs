//! Private-address policy for target URLs.
//!
//! Rejects targets whose host is spelled as a local or private address, so
//! the gateway cannot be used to reach its own network (SSRF).
//!
//! # Limitation
//!
//! Only the literal host of the URL is classified. A public hostname whose
//! DNS record points at a private address is not detected, and neither is a
//! record that changes between check and fetch (DNS rebinding).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::{GatewayError, Result};

/// Classification of a target host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressClass {
    /// Publicly routable, or a hostname that is not spelled as a local address.
    Routable,
    /// Loopback, unspecified, private-range or link-local.
    Private,
}

/// Rejects the URL with [`GatewayError::PrivateTargetBlocked`] if its host is private.
///
/// # Example
///
/// ```
/// use relaygate_core::address_policy::check_target;
/// use url::Url;
///
/// assert!(check_target(&Url::parse("https://example.com/").unwrap()).is_ok());
/// assert!(check_target(&Url::parse("http://192.168.1.5/admin").unwrap()).is_err());
/// ```
pub fn check_target(url: &Url) -> Result<()> {
    let class = match url.host() {
        Some(Host::Domain(domain)) => classify_hostname(domain),
        Some(Host::Ipv4(ip)) => classify_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => classify_ip(IpAddr::V6(ip)),
        None => return Err(GatewayError::InvalidTarget("target has no host".into())),
    };

    match class {
        AddressClass::Routable => Ok(()),
        AddressClass::Private => Err(GatewayError::PrivateTargetBlocked(
            url.host_str().unwrap_or_default().to_string(),
        )),
    }
}

/// Classifies a hostname by its spelling.
///
/// Hostnames that parse as IP literals (with or without IPv6 brackets) are
/// classified as addresses. Names are only matched against `localhost`.
pub fn classify_hostname(host: &str) -> AddressClass {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let unbracketed = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return classify_ip(ip);
    }

    if host == "localhost" || host.ends_with(".localhost") {
        return AddressClass::Private;
    }

    AddressClass::Routable
}

/// Classifies an IP address.
pub fn classify_ip(ip: IpAddr) -> AddressClass {
    let private = match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(v4),
            None => is_private_v6(v6),
        },
    };

    if private {
        AddressClass::Private
    } else {
        AddressClass::Routable
    }
}

// 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16, 127.0.0.0/8, 0.0.0.0/8, 169.254.0.0/16
fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.octets()[0] == 0
}

// ::, ::1, fc00::/7 (unique local), fe80::/10 (link local)
fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback() || ip.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(url: &str) -> Result<()> {
        check_target(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_public_targets_allowed() {
        assert!(check("https://example.com/").is_ok());
        assert!(check("https://8.8.8.8/").is_ok());
        assert!(check("https://172.32.0.1/").is_ok());
        assert!(check("https://192.169.0.1/").is_ok());
        assert!(check("https://[2001:db8::1]/").is_ok());
    }

    #[test]
    fn test_private_ipv4_ranges_blocked() {
        for url in [
            "http://10.0.0.1/",
            "http://10.255.255.255/",
            "http://172.16.0.1/",
            "http://172.31.255.255/",
            "http://192.168.1.5/",
            "http://127.0.0.1:8080/",
            "http://127.1.2.3/",
            "http://0.0.0.0/",
        ] {
            let err = check(url).unwrap_err();
            assert!(
                matches!(err, GatewayError::PrivateTargetBlocked(_)),
                "{url} should be blocked"
            );
        }
    }

    #[test]
    fn test_private_target_status_is_forbidden() {
        let err = check("https://192.168.1.5/").unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_localhost_blocked() {
        assert!(check("http://localhost/").is_err());
        assert!(check("http://LOCALHOST:3000/").is_err());
        assert!(check("http://localhost./").is_err());
        assert!(check("http://app.localhost/").is_err());
    }

    #[test]
    fn test_ipv6_local_blocked() {
        assert!(check("http://[::]/").is_err());
        assert!(check("http://[::1]/").is_err());
        assert!(check("http://[fd00::1]/").is_err());
        assert!(check("http://[fe80::1]/").is_err());
        assert!(check("http://[::ffff:192.168.0.1]/").is_err());
    }

    #[test]
    fn test_link_local_metadata_blocked() {
        assert!(check("http://169.254.169.254/latest/meta-data").is_err());
    }

    #[test]
    fn test_obfuscated_ipv4_normalized_by_parser() {
        // The URL parser canonicalizes numeric hosts before classification.
        assert!(check("http://2130706433/").is_err());
        assert!(check("http://0x7f.0.0.1/").is_err());
    }

    #[test]
    fn test_hostname_resolving_privately_is_not_detected() {
        // Documented limitation: only the spelling is classified.
        assert_eq!(classify_hostname("internal.example.com"), AddressClass::Routable);
    }

    #[test]
    fn test_classify_hostname_literals() {
        assert_eq!(classify_hostname("192.168.0.10"), AddressClass::Private);
        assert_eq!(classify_hostname("[::]"), AddressClass::Private);
        assert_eq!(classify_hostname("93.184.216.34"), AddressClass::Routable);
    }
}
