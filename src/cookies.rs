//! Cookie store with supplier-driven refill
//!
//! The backend authenticates through browser cookies, which go stale on
//! their own schedule. The store is bound to one origin; before each request
//! it scans the origin's cookies and, if any has expired, asks the external
//! supplier (typically an interactive login flow) for a complete replacement
//! set. Cookies held for other origins are never touched.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Default,
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    /// Absent for session cookies, which never count as expired.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

impl Cookie {
    pub fn is_expired(&self) -> bool {
        match self.expires {
            Some(expires) => expires < Utc::now(),
            None => false,
        }
    }
}

/// Source of a complete, currently-valid cookie set for the bound origin.
/// Implemented outside this crate, e.g. by a browser-driven login flow.
#[async_trait]
pub trait CookieSupplier: Send + Sync {
    async fn cookies(
        &self,
    ) -> std::result::Result<Vec<Cookie>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Cookie jar bound to a single origin, refilled from a [`CookieSupplier`]
/// whenever any of the origin's cookies has expired.
pub struct CookieStore {
    origin: Url,
    supplier: Option<Arc<dyn CookieSupplier>>,
    /// Cookies keyed by host. Only the bound origin's entry is ever mutated.
    jar: HashMap<String, Vec<Cookie>>,
}

impl CookieStore {
    /// Create a store bound to `origin`, seeding the jar with one supplier
    /// call (a client without valid cookies cannot do anything useful).
    pub async fn new(origin: Url, supplier: Arc<dyn CookieSupplier>) -> Result<Self> {
        let mut store = Self {
            origin,
            supplier: Some(supplier),
            jar: HashMap::new(),
        };
        let cookies = store.invoke_supplier().await?;
        store.replace_origin_cookies(cookies);
        Ok(store)
    }

    /// Create a store from an already-obtained cookie set, with no supplier.
    /// A later refill will fail with [`Error::MissingCookieSupplier`].
    pub fn with_cookies(origin: Url, cookies: Vec<Cookie>) -> Self {
        let mut store = Self {
            origin,
            supplier: None,
            jar: HashMap::new(),
        };
        store.replace_origin_cookies(cookies);
        store
    }

    fn origin_key(&self) -> String {
        self.origin.host_str().unwrap_or_default().to_string()
    }

    async fn invoke_supplier(&self) -> Result<Vec<Cookie>> {
        let supplier = self
            .supplier
            .as_ref()
            .ok_or(Error::MissingCookieSupplier)?;
        supplier.cookies().await.map_err(Error::CookieSupplier)
    }

    fn replace_origin_cookies(&mut self, cookies: Vec<Cookie>) {
        self.jar.insert(self.origin_key(), cookies);
    }

    /// Cookies currently held for the bound origin.
    pub fn cookies(&self) -> &[Cookie] {
        self.jar
            .get(self.origin.host_str().unwrap_or_default())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Refill the bound origin's cookies if any of them has expired.
    ///
    /// The supplier is invoked at most once per call and its result replaces
    /// the origin's cookie set wholesale. On supplier failure the stale set
    /// is left untouched and the error propagates. The fresh set is accepted
    /// without re-validation.
    pub async fn ensure_fresh(&mut self) -> Result<()> {
        let expired = self.cookies().iter().filter(|c| c.is_expired()).count();
        if expired == 0 {
            return Ok(());
        }
        tracing::debug!(
            expired,
            origin = %self.origin,
            "expired cookies detected, requesting a fresh set"
        );
        let fresh = self.invoke_supplier().await?;
        tracing::debug!(count = fresh.len(), "replacing origin cookie set");
        self.replace_origin_cookies(fresh);
        Ok(())
    }

    /// Render the `Cookie` request header value for the bound origin.
    pub fn header_value(&self) -> String {
        self.cookies()
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

impl std::fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore")
            .field("origin", &self.origin.as_str())
            .field("cookies", &self.cookies().len())
            .field("has_supplier", &self.supplier.is_some())
            .finish()
    }
}
