use super::identity::DeviceIdentity;
use crate::config::DeviceConfig;
use crate::error::DeviceInfoError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Platform device-info query
#[async_trait]
pub trait DeviceInfoProvider: Send + Sync {
    async fn query(&self) -> Result<DeviceIdentity, DeviceInfoError>;
}

/// Provider answering with a fixed identity
#[derive(Debug, Clone)]
pub struct StaticDeviceInfo {
    identity: DeviceIdentity,
}

impl StaticDeviceInfo {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self { identity }
    }
}

impl From<&DeviceConfig> for StaticDeviceInfo {
    fn from(config: &DeviceConfig) -> Self {
        Self::new(DeviceIdentity::new(
            config.manufacturer.clone(),
            config.model.clone(),
            config.os_version.clone(),
        ))
    }
}

#[async_trait]
impl DeviceInfoProvider for StaticDeviceInfo {
    async fn query(&self) -> Result<DeviceIdentity, DeviceInfoError> {
        Ok(self.identity.clone())
    }
}

/// Resolves the device identity once and caches it for its own lifetime.
///
/// Construct one at startup and hand the resolved value to consumers.
pub struct DeviceIdentityResolver {
    provider: Arc<dyn DeviceInfoProvider>,
    identity: OnceCell<DeviceIdentity>,
}

impl DeviceIdentityResolver {
    pub fn new(provider: Arc<dyn DeviceInfoProvider>) -> Self {
        Self {
            provider,
            identity: OnceCell::new(),
        }
    }

    /// Query the platform on first call; later calls return the cached value.
    ///
    /// Query failures resolve to [`DeviceIdentity::unknown`].
    pub async fn resolve(&self) -> DeviceIdentity {
        self.identity
            .get_or_init(|| async {
                match self.provider.query().await {
                    Ok(identity) => {
                        info!("Resolved device identity: {}", identity);
                        identity
                    }
                    Err(e) => {
                        warn!("Device identity query failed, using sentinel: {}", e);
                        DeviceIdentity::unknown()
                    }
                }
            })
            .await
            .clone()
    }

    /// Cached identity, if already resolved
    pub fn cached(&self) -> Option<&DeviceIdentity> {
        self.identity.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DeviceInfoProvider for CountingProvider {
        async fn query(&self) -> Result<DeviceIdentity, DeviceInfoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DeviceInfoError::QueryFailed {
                    details: "binder died".to_string(),
                })
            } else {
                Ok(DeviceIdentity::new("samsung", "SM-G991B", "14"))
            }
        }
    }

    #[tokio::test]
    async fn test_resolve_caches_identity() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let resolver = DeviceIdentityResolver::new(provider.clone());
        assert!(resolver.cached().is_none());

        let first = resolver.resolve().await;
        let second = resolver.resolve().await;
        assert_eq!(first, second);
        assert_eq!(first.manufacturer, "samsung");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(resolver.cached().is_some());
    }

    #[tokio::test]
    async fn test_resolve_failure_yields_sentinel() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let resolver = DeviceIdentityResolver::new(provider.clone());

        let identity = resolver.resolve().await;
        assert!(identity.is_unknown());
        assert_eq!(identity.manufacturer, "Unknown");
        assert_eq!(identity.model, "Unknown");
        assert_eq!(identity.os_version, "");
        assert!(identity.model_key().is_none());

        // The sentinel is cached too
        resolver.resolve().await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_static_provider_from_config() {
        let config = DeviceConfig {
            manufacturer: "Google".to_string(),
            model: "Pixel 8".to_string(),
            os_version: "15".to_string(),
        };
        let resolver = DeviceIdentityResolver::new(Arc::new(StaticDeviceInfo::from(&config)));
        let identity = resolver.resolve().await;
        assert_eq!(identity.to_string(), "Google Pixel 8 (15)");
        assert_eq!(identity.model_key(), Some("Pixel 8"));
    }
}
