//! Administrative pool identity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PoolId;
use crate::error::ObserverError;

/// Identity and metadata of a monitored pool.
///
/// Created once through [`crate::persistence::SqliteStore::create_pool`],
/// changed only by administrative updates and never deleted automatically.
/// Every time-series row references a `PoolIdentity` by `pool_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolIdentity {
    /// Unique pool identifier.
    pub pool_id: PoolId,
    /// Human-readable pool name.
    pub pool_name: String,
    /// Observer page URL scraped every cycle.
    pub observer_url: String,
    /// Client owning the hashrate.
    pub client_name: String,
    /// Country of the mining site.
    pub country: String,
    /// Operating company.
    pub company: String,
    /// Site location.
    pub location: String,
    /// Contact address for the client.
    pub contact_email: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Whether the pool is scraped.
    pub active: bool,
    /// Provisioning timestamp.
    pub created_at: DateTime<Utc>,
    /// Last administrative update.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to provision a new pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPool {
    /// Unique pool identifier.
    pub pool_id: PoolId,
    /// Human-readable pool name.
    pub pool_name: String,
    /// Observer page URL.
    pub observer_url: String,
    /// Client owning the hashrate.
    #[serde(default)]
    pub client_name: String,
    /// Country of the mining site.
    #[serde(default)]
    pub country: String,
    /// Operating company.
    #[serde(default)]
    pub company: String,
    /// Site location.
    #[serde(default)]
    pub location: String,
    /// Contact address for the client.
    #[serde(default)]
    pub contact_email: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the pool is scraped. Defaults to `true`.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewPool {
    /// Checks the fields that the scraper depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::InvalidRequest`] for an empty name or a
    /// non-HTTP observer URL.
    pub fn validate(&self) -> Result<(), ObserverError> {
        if self.pool_name.trim().is_empty() {
            return Err(ObserverError::InvalidRequest(format!(
                "pool {} has an empty name",
                self.pool_id
            )));
        }
        validate_observer_url(&self.observer_url)
    }
}

/// Partial administrative update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUpdate {
    /// New pool name.
    #[serde(default)]
    pub pool_name: Option<String>,
    /// New observer URL.
    #[serde(default)]
    pub observer_url: Option<String>,
    /// New client name.
    #[serde(default)]
    pub client_name: Option<String>,
    /// New country.
    #[serde(default)]
    pub country: Option<String>,
    /// New company.
    #[serde(default)]
    pub company: Option<String>,
    /// New location.
    #[serde(default)]
    pub location: Option<String>,
    /// New contact address.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Replacement tag list.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// New active flag.
    #[serde(default)]
    pub active: Option<bool>,
}

impl PoolUpdate {
    /// Returns `true` if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the update to an identity in place, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::InvalidRequest`] if the new name is empty or
    /// the new observer URL is not HTTP(S).
    pub fn apply(&self, identity: &mut PoolIdentity) -> Result<(), ObserverError> {
        if let Some(name) = &self.pool_name {
            if name.trim().is_empty() {
                return Err(ObserverError::InvalidRequest(
                    "pool name must not be empty".to_string(),
                ));
            }
            identity.pool_name.clone_from(name);
        }
        if let Some(url) = &self.observer_url {
            validate_observer_url(url)?;
            identity.observer_url.clone_from(url);
        }
        if let Some(v) = &self.client_name {
            identity.client_name.clone_from(v);
        }
        if let Some(v) = &self.country {
            identity.country.clone_from(v);
        }
        if let Some(v) = &self.company {
            identity.company.clone_from(v);
        }
        if let Some(v) = &self.location {
            identity.location.clone_from(v);
        }
        if let Some(v) = &self.contact_email {
            identity.contact_email.clone_from(v);
        }
        if let Some(v) = &self.tags {
            identity.tags.clone_from(v);
        }
        if let Some(active) = self.active {
            identity.active = active;
        }
        identity.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_observer_url(url: &str) -> Result<(), ObserverError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ObserverError::InvalidRequest(format!(
            "observer url must be http(s): {url}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn identity() -> PoolIdentity {
        let Ok(pool_id) = PoolId::new("kz-01") else {
            panic!("valid id");
        };
        let now = Utc::now();
        PoolIdentity {
            pool_id,
            pool_name: "KZ Pool".to_string(),
            observer_url: "https://pool.example/observer?token=abc".to_string(),
            client_name: "Acme".to_string(),
            country: "Kazakhstan".to_string(),
            company: "Acme Mining".to_string(),
            location: "Ekibastuz".to_string(),
            contact_email: String::new(),
            tags: vec!["btc".to_string()],
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn new_pool_defaults_to_active() {
        let json = r#"{"pool_id":"kz-01","pool_name":"KZ","observer_url":"https://x.test/o"}"#;
        let Ok(pool) = serde_json::from_str::<NewPool>(json) else {
            panic!("deserialization failed");
        };
        assert!(pool.active);
        assert!(pool.tags.is_empty());
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn new_pool_rejects_non_http_url() {
        let json = r#"{"pool_id":"kz-01","pool_name":"KZ","observer_url":"ftp://x.test/o"}"#;
        let Ok(pool) = serde_json::from_str::<NewPool>(json) else {
            panic!("deserialization failed");
        };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn update_applies_only_given_fields() {
        let mut id = identity();
        let update = PoolUpdate {
            active: Some(false),
            company: Some("Other".to_string()),
            ..PoolUpdate::default()
        };
        assert!(update.apply(&mut id).is_ok());
        assert!(!id.active);
        assert_eq!(id.company, "Other");
        assert_eq!(id.pool_name, "KZ Pool");
        assert!(id.updated_at >= id.created_at);
    }

    #[test]
    fn update_rejects_empty_name() {
        let mut id = identity();
        let update = PoolUpdate {
            pool_name: Some("  ".to_string()),
            ..PoolUpdate::default()
        };
        assert!(update.apply(&mut id).is_err());
        assert_eq!(id.pool_name, "KZ Pool");
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(PoolUpdate::default().is_empty());
        let update = PoolUpdate {
            active: Some(true),
            ..PoolUpdate::default()
        };
        assert!(!update.is_empty());
    }
}
