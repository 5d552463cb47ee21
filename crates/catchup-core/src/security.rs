//! URL Safety Gate (C1, spec.md §4.1) — SSRF protection shared by every
//! fetcher adapter, the content enhancer, and the notifier fanout.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;

use crate::error::{SecurityError, SecurityResult};

const MAX_URL_LEN: usize = 2048;
const EPHEMERAL_PORT_RANGE: std::ops::RangeInclusive<u16> = 32768..=65535;

fn private_cidrs() -> Vec<IpNet> {
    vec![
        "10.0.0.0/8".parse().unwrap(),
        "172.16.0.0/12".parse().unwrap(),
        "192.168.0.0/16".parse().unwrap(),
        "169.254.0.0/16".parse().unwrap(), // link-local / cloud metadata
        "127.0.0.0/8".parse().unwrap(),    // loopback
        "::1/128".parse().unwrap(),
        "fc00::/7".parse().unwrap(), // IPv6 private
        "fe80::/10".parse().unwrap(), // IPv6 link-local
    ]
}

static PRIVATE_CIDRS: LazyLock<Vec<IpNet>> = LazyLock::new(private_cidrs);

/// Whether `ip` falls in a blocked (private/loopback/link-local) range.
fn is_private(ip: &IpAddr) -> bool {
    PRIVATE_CIDRS.iter().any(|cidr| cidr.contains(ip))
}

/// Configuration for the gate's one documented escape hatch (spec.md §4.1,
/// §9 Open Questions): loopback addresses on ephemeral high ports are
/// allowed through, to permit test fixtures (e.g. a `wiremock` server bound
/// to `127.0.0.1:<ephemeral>`). The observed system leaves this permanently
/// on; we keep it togglable per the spec's explicit instruction.
#[derive(Debug, Clone, Copy)]
pub struct GateOptions {
    pub allow_loopback_ephemeral_ports: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            allow_loopback_ephemeral_ports: true,
        }
    }
}

/// The URL Safety Gate. Stateless aside from its options; safe to share
/// across tasks via `Clone` (all fields are `Copy`).
#[derive(Debug, Clone, Default)]
pub struct UrlGate {
    options: GateOptions,
}

impl UrlGate {
    pub fn new(options: GateOptions) -> Self {
        Self { options }
    }

    /// Parse + scheme + length checks only — no DNS lookup. Used to reject
    /// obviously-bad URLs cheaply (spec.md §8: "URL length > 2048 chars:
    /// rejected without DNS lookup").
    pub fn check_syntax(&self, raw: &str) -> SecurityResult<url::Url> {
        if raw.len() > MAX_URL_LEN {
            return Err(SecurityError::TooLong { max: MAX_URL_LEN });
        }
        let parsed = url::Url::parse(raw).map_err(|e| SecurityError::Malformed(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(SecurityError::UnsupportedScheme(other.to_string())),
        }
        if parsed.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(SecurityError::Malformed("missing host".to_string()));
        }
        Ok(parsed)
    }

    /// Full gate: syntax checks, then DNS resolution and private-address
    /// rejection (spec.md §4.1 algorithm).
    pub async fn check(&self, raw: &str) -> SecurityResult<()> {
        let parsed = self.check_syntax(raw)?;
        let host = parsed.host_str().expect("checked above");

        // Literal IP host — skip DNS, check directly.
        if let Ok(ip) = host.parse::<IpAddr>() {
            if self.is_blocked(ip, parsed.port_or_known_default()) {
                return Err(SecurityError::PrivateAddress(host.to_string()));
            }
            return Ok(());
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| SecurityError::DnsFailure {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let mut saw_any = false;
        for addr in addrs {
            saw_any = true;
            if self.is_blocked(addr.ip(), Some(port)) {
                return Err(SecurityError::PrivateAddress(format!(
                    "{host} resolved to {}",
                    addr.ip()
                )));
            }
        }
        if !saw_any {
            return Err(SecurityError::DnsFailure {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            });
        }
        Ok(())
    }

    fn is_blocked(&self, ip: IpAddr, port: Option<u16>) -> bool {
        if !is_private(&ip) {
            return false;
        }
        if self.options.allow_loopback_ephemeral_ports && ip.is_loopback() {
            if let Some(p) = port {
                if EPHEMERAL_PORT_RANGE.contains(&p) {
                    return false;
                }
            }
        }
        true
    }

    /// A [`reqwest::dns::Resolve`] backed by this gate, so a client built
    /// with [`dns_resolver`](reqwest::ClientBuilder::dns_resolver) re-checks
    /// every hostname at the exact resolution used to open the connection —
    /// closing the DNS-rebinding window between `check()`'s own lookup and
    /// the client's independent one (a short-TTL record could otherwise
    /// answer safely for the gate and then rebind to a private address
    /// microseconds later, for the actual request).
    pub fn resolver(&self) -> GatedResolver {
        GatedResolver { gate: self.clone() }
    }
}

/// DNS resolver that drops any address the gate would block. Installed via
/// `ClientBuilder::dns_resolver` so literal-IP hosts (which `reqwest` never
/// routes through a custom resolver) still rely on [`UrlGate::check`]'s own
/// literal-IP branch, while hostname resolution is pinned to addresses this
/// resolver itself just validated.
#[derive(Clone)]
pub struct GatedResolver {
    gate: UrlGate,
}

impl reqwest::dns::Resolve for GatedResolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let allowed: Vec<std::net::SocketAddr> =
                addrs.filter(|addr| !is_private(&addr.ip())).collect();
            if allowed.is_empty() {
                return Err(Box::new(SecurityError::PrivateAddress(host))
                    as Box<dyn std::error::Error + Send + Sync>);
            }
            Ok(Box::new(allowed.into_iter()) as reqwest::dns::Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> UrlGate {
        UrlGate::default()
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            gate().check_syntax("ftp://example.com/"),
            Err(SecurityError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            gate().check_syntax("file:///etc/passwd"),
            Err(SecurityError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            gate().check_syntax("not a url"),
            Err(SecurityError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_urls_over_length_cap() {
        let long = format!("https://example.com/{}", "a".repeat(3000));
        assert!(matches!(
            gate().check_syntax(&long),
            Err(SecurityError::TooLong { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_literal_private_ips() {
        assert!(gate().check("http://10.0.0.1/").await.is_err());
        assert!(gate().check("http://192.168.1.1/").await.is_err());
        assert!(gate().check("http://169.254.169.254/").await.is_err());
    }

    #[tokio::test]
    async fn rejects_loopback_on_non_ephemeral_port() {
        // spec.md §8 scenario 6: http://127.0.0.1:8080 is not in the
        // ephemeral-port test range and must be rejected.
        assert!(gate().check("http://127.0.0.1:8080/").await.is_err());
    }

    #[tokio::test]
    async fn allows_loopback_on_ephemeral_port() {
        assert!(gate().check("http://127.0.0.1:45000/").await.is_ok());
    }

    #[tokio::test]
    async fn loopback_ephemeral_allowance_can_be_disabled() {
        let strict = UrlGate::new(GateOptions {
            allow_loopback_ephemeral_ports: false,
        });
        assert!(strict.check("http://127.0.0.1:45000/").await.is_err());
    }

    #[tokio::test]
    async fn allows_public_https_urls() {
        assert!(gate().check("https://example.com/").await.is_ok());
    }
}
