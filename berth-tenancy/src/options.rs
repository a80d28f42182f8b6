// Tenancy options and configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::namespace::DEFAULT_MAX_TENANT_ID;

/// Configuration for the tenancy engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenancyOptions {
    /// Largest tenant id the namespace resolver accepts.
    pub max_tenant_id: i64,
    /// Bound on the tenant-keyed namespace-existence cache.
    pub cache_capacity: usize,
    /// Request-scoped budget for checking a connection out of the pool.
    /// On expiry the request fails without having mutated any namespace.
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for TenancyOptions {
    fn default() -> Self {
        Self {
            max_tenant_id: DEFAULT_MAX_TENANT_ID,
            cache_capacity: 1024,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl TenancyOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tenant_id < 1 {
            return Err("max_tenant_id must be positive".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be non-zero".to_string());
        }
        if self.acquire_timeout.is_zero() {
            return Err("acquire_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TenancyOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_cache() {
        let opts = TenancyOptions {
            cache_capacity: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }
}
