//! Binding arrangement.
//!
//! A binding is a resolved TCP address plus the site configs that asked to
//! live on it. The lifecycle engine consumes bindings, never raw configs:
//! two sites whose hostnames resolve to the same socket address share one
//! listener.

use crate::config::loader::ConfigError;
use crate::config::schema::SiteConfig;
use std::net::SocketAddr;
use tokio::net::lookup_host;

/// Site configs grouped by resolved listen address, in first-seen order.
pub type Bindings = Vec<(SocketAddr, Vec<SiteConfig>)>;

/// Resolve each site's host:port and group the sites by socket address.
///
/// Order is preserved on both levels so that downstream iteration (and the
/// later-wins tie-break for duplicate hosts) is deterministic. Mixing TLS
/// and non-TLS sites on one address is rejected here, before any listener
/// is touched.
pub async fn arrange(configs: Vec<SiteConfig>) -> Result<Bindings, ConfigError> {
    let mut bindings: Bindings = Vec::new();

    for config in configs {
        let addr = resolve(&config).await?;
        match bindings.iter_mut().find(|(existing, _)| *existing == addr) {
            Some((_, group)) => group.push(config),
            None => bindings.push((addr, vec![config])),
        }
    }

    for (addr, group) in &bindings {
        let tls = group[0].tls.enabled;
        if group.iter().any(|c| c.tls.enabled != tls) {
            return Err(ConfigError::MixedTls { address: *addr });
        }
    }

    Ok(bindings)
}

/// Resolve a site's address, preferring IPv4 so that e.g. `localhost` and
/// `127.0.0.1` land on the same listener.
async fn resolve(config: &SiteConfig) -> Result<SocketAddr, ConfigError> {
    let address = config.address();
    let mut addrs: Vec<SocketAddr> = lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(|source| ConfigError::Resolve { address: address.clone(), source })?
        .collect();
    addrs.sort_by_key(|a| !a.is_ipv4());
    addrs.into_iter().next().ok_or(ConfigError::BadAddress { address })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsSettings;

    #[tokio::test]
    async fn groups_aliases_of_one_address() {
        let configs = vec![
            SiteConfig::new("localhost", 4040),
            SiteConfig::new("127.0.0.1", 4040),
            SiteConfig::new("127.0.0.1", 5050),
        ];
        let bindings = arrange(configs).await.unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].1.len(), 2);
        assert_eq!(bindings[1].1.len(), 1);
    }

    #[tokio::test]
    async fn preserves_first_seen_order() {
        let configs = vec![SiteConfig::new("127.0.0.1", 9090), SiteConfig::new("127.0.0.1", 8080)];
        let bindings = arrange(configs).await.unwrap();
        assert_eq!(bindings[0].0.port(), 9090);
        assert_eq!(bindings[1].0.port(), 8080);
    }

    #[tokio::test]
    async fn rejects_mixed_tls_on_one_address() {
        let mut secure = SiteConfig::new("127.0.0.1", 4040);
        secure.tls = TlsSettings { enabled: true, ..TlsSettings::default() };
        let plain = SiteConfig::new("localhost", 4040);

        let err = arrange(vec![secure, plain]).await.unwrap_err();
        assert!(matches!(err, ConfigError::MixedTls { .. }));
    }
}
