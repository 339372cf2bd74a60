//! Endpoint configuration and request security.

use async_trait::async_trait;
use hyper::HeaderMap;
use std::sync::Arc;

/// Pluggable request authentication; a `false` verdict yields a bodyless
/// `403`.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> bool;
}

/// DNS-rebinding protection: allowlist checks on `Host` and `Origin`.
#[derive(Debug, Clone)]
pub struct DnsRebindingConfig {
    /// Hostnames (no port) accepted in `Host`
    pub allowed_hosts: Vec<String>,
    /// Full origins accepted in `Origin`; when empty, the origin's host is
    /// checked against `allowed_hosts` instead
    pub allowed_origins: Vec<String>,
}

impl Default for DnsRebindingConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "::1".to_string(),
            ],
            allowed_origins: Vec::new(),
        }
    }
}

impl DnsRebindingConfig {
    fn host_allowed(&self, host_header: &str) -> bool {
        let host = if let Some(rest) = host_header.strip_prefix('[') {
            // Bracketed IPv6, optionally with port
            rest.split_once(']').map(|(h, _)| h).unwrap_or(rest)
        } else if host_header.matches(':').count() > 1 {
            // Bare IPv6 literal
            host_header
        } else {
            host_header
                .split_once(':')
                .map(|(h, _)| h)
                .unwrap_or(host_header)
        };
        self.allowed_hosts.iter().any(|allowed| allowed == host)
    }

    /// Validate the request's `Host` and (if present) `Origin` headers.
    pub fn validate(&self, headers: &HeaderMap) -> bool {
        let host_ok = headers
            .get(hyper::header::HOST)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|host| self.host_allowed(host));
        if !host_ok {
            return false;
        }

        match headers
            .get(hyper::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
        {
            None => true,
            Some("null") => false,
            Some(origin) => {
                if !self.allowed_origins.is_empty() {
                    return self.allowed_origins.iter().any(|allowed| allowed == origin);
                }
                origin
                    .strip_prefix("http://")
                    .or_else(|| origin.strip_prefix("https://"))
                    .is_some_and(|rest| self.host_allowed(rest))
            }
        }
    }
}

/// Configuration for [`crate::StreamableHttpService`].
#[derive(Clone, Default)]
pub struct HttpServerConfig {
    /// Reject DELETE with 405 when false
    pub allow_client_termination: bool,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub dns_rebinding: Option<DnsRebindingConfig>,
}

impl HttpServerConfig {
    pub fn new() -> Self {
        Self {
            allow_client_termination: true,
            authenticator: None,
            dns_rebinding: None,
        }
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_dns_rebinding_protection(mut self, config: DnsRebindingConfig) -> Self {
        self.dns_rebinding = Some(config);
        self
    }

    pub fn without_client_termination(mut self) -> Self {
        self.allow_client_termination = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HOST, ORIGIN};

    fn headers(host: &str, origin: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(HOST, host.parse().unwrap());
        if let Some(origin) = origin {
            map.insert(ORIGIN, origin.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_default_hosts_allowed() {
        let config = DnsRebindingConfig::default();
        assert!(config.validate(&headers("localhost:8080", None)));
        assert!(config.validate(&headers("127.0.0.1", None)));
        assert!(!config.validate(&headers("evil.example.com", None)));
    }

    #[test]
    fn test_null_origin_rejected() {
        let config = DnsRebindingConfig::default();
        assert!(!config.validate(&headers("localhost", Some("null"))));
    }

    #[test]
    fn test_origin_falls_back_to_host_allowlist() {
        let config = DnsRebindingConfig::default();
        assert!(config.validate(&headers("localhost", Some("http://localhost:3000"))));
        assert!(!config.validate(&headers("localhost", Some("http://evil.example.com"))));
    }

    #[test]
    fn test_configured_origins_are_exact() {
        let config = DnsRebindingConfig {
            allowed_origins: vec!["https://app.example.com".to_string()],
            ..Default::default()
        };
        assert!(config.validate(&headers("localhost", Some("https://app.example.com"))));
        assert!(!config.validate(&headers("localhost", Some("https://other.example.com"))));
    }
}
