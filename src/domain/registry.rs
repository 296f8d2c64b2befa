//! Connection registry
//!
//! Maps aliases and `user@host` strings to live connections. A host gets at
//! most one connection per run; an alias and its `user@host` share it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::bootstrap::Bootstrapper;
use crate::domain::{AliasDefinition, UserHost};
use crate::error::{OrchError, Result};
use crate::ports::{SshClientTrait, SshConnector};

/// Owns every connection of a run
pub struct ConnectionRegistry<C: SshConnector> {
    connector: C,
    bootstrapper: Bootstrapper,
    connections: HashMap<String, Arc<C::Client>>,
}

impl<C: SshConnector> ConnectionRegistry<C> {
    #[must_use]
    pub fn new(connector: C, bootstrapper: Bootstrapper) -> Self {
        Self {
            connector,
            bootstrapper,
            connections: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Get the connection registered under `identifier`
    #[must_use]
    pub fn lookup(&self, identifier: &str) -> Option<Arc<C::Client>> {
        self.connections.get(identifier).cloned()
    }

    #[must_use]
    pub fn exists(&self, identifier: &str) -> bool {
        self.connections.contains_key(identifier)
    }

    /// Like [`Self::lookup`], but an unknown identifier is an error
    ///
    /// # Errors
    ///
    /// Returns `UnknownLogin` naming `identifier`.
    pub fn require(&self, identifier: &str) -> Result<Arc<C::Client>> {
        self.lookup(identifier)
            .ok_or_else(|| OrchError::UnknownLogin {
                login: identifier.to_string(),
            })
    }

    /// Make `target` reachable under its `user@host` and, unless empty, under
    /// `alias`.
    ///
    /// An existing connection to `target` is reused; otherwise one is opened,
    /// bootstrapping key access if the host refuses our keys.
    ///
    /// # Errors
    ///
    /// Any connection error from the connect-or-bootstrap loop. Nothing is
    /// registered in that case.
    pub async fn register(&mut self, alias: &str, target: &UserHost) -> Result<Arc<C::Client>> {
        let canonical = target.canonical();

        let handle = if let Some(existing) = self.lookup(&canonical) {
            debug!(login = %canonical, "Reusing connection");
            existing
        } else {
            let client = self
                .bootstrapper
                .connect_or_bootstrap(&self.connector, target)
                .await?;
            let handle = Arc::new(client);
            self.connections.insert(canonical.clone(), Arc::clone(&handle));
            info!(login = %canonical, "Connected");
            handle
        };

        if !alias.is_empty() && alias != canonical {
            if let Some(previous) = self.connections.get(alias) {
                if !Arc::ptr_eq(previous, &handle) {
                    warn!(alias = %alias, previous = %previous.host_name(), login = %canonical, "Alias redefined");
                }
            }
            self.connections.insert(alias.to_string(), Arc::clone(&handle));
        }

        Ok(handle)
    }

    /// Register every alias definition, in order
    ///
    /// # Errors
    ///
    /// Stops at the first definition whose host cannot be reached.
    pub async fn register_aliases(&mut self, definitions: &[AliasDefinition]) -> Result<()> {
        for definition in definitions {
            self.register(&definition.alias, &definition.target).await?;
        }
        Ok(())
    }

    /// All registered identifiers, sorted
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        let mut identifiers: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        identifiers.sort_unstable();
        identifiers
    }

    /// Number of distinct physical connections
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .values()
            .map(Arc::as_ptr)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Disconnect everything and empty the registry
    ///
    /// Each connection is closed once, however many identifiers point at it.
    /// A connection still borrowed elsewhere is dropped instead of closed.
    pub async fn close_all(&mut self) {
        let mut handles: Vec<Arc<C::Client>> =
            self.connections.drain().map(|(_, handle)| handle).collect();

        while let Some(handle) = handles.pop() {
            // Fails while another identifier still holds the same connection
            let Ok(client) = Arc::try_unwrap(handle) else {
                continue;
            };
            let host_name = client.host_name().to_string();
            match client.close().await {
                Ok(()) => debug!(login = %host_name, "Connection closed"),
                Err(e) => warn!(login = %host_name, error = %e, "Failed to close connection"),
            }
        }
    }
}
