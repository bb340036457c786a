//! Search filters over the property bag.

use std::collections::BTreeMap;

use worldsync_core::{HostName, InstanceId, Role};

use crate::object::{PROP_HOST, PROP_INSTANCE, PROP_ROLE};

/// Conjunction of optional property matches. An empty filter matches every
/// record under the sync root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub instance: Option<InstanceId>,
    pub host: Option<HostName>,
    pub role: Option<Role>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance(mut self, instance: impl Into<InstanceId>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn host(mut self, host: impl Into<HostName>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Proxies of `instance` owned by `host`.
    pub fn proxies(instance: &InstanceId, host: &HostName) -> Self {
        Self::new()
            .instance(instance.clone())
            .host(host.clone())
            .role(Role::Proxy)
    }

    /// Masters of `instance`.
    pub fn masters(instance: &InstanceId) -> Self {
        Self::new().instance(instance.clone()).role(Role::Master)
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(instance) = &self.instance {
            pairs.push((PROP_INSTANCE, instance.0.clone()));
        }
        if let Some(host) = &self.host {
            pairs.push((PROP_HOST, host.0.clone()));
        }
        if let Some(role) = self.role {
            pairs.push((PROP_ROLE, role.to_string()));
        }
        pairs
    }

    /// Drive v3 `q` expression restricted to children of `parent`.
    pub fn drive_query(&self, parent: &str) -> String {
        let mut query = format!("'{}' in parents and trashed = false", escape_query(parent));
        for (key, value) in self.pairs() {
            query.push_str(&format!(
                " and appProperties has {{ key='{}' and value='{}' }}",
                key,
                escape_query(&value)
            ));
        }
        query
    }

    /// Evaluate the filter against a property bag (stores without a query
    /// language).
    pub fn matches(&self, props: &BTreeMap<String, String>) -> bool {
        self.pairs()
            .iter()
            .all(|(key, value)| props.get(*key) == Some(value))
    }
}

/// Escape a literal for a Drive query string.
pub fn escape_query(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}
