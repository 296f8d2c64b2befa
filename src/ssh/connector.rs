//! SSH Connector Adapter
//!
//! Concrete implementation of the `SshConnector` and `SshClientTrait` ports
//! using the russh SSH client.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::config::{LimitsConfig, Settings};
use crate::domain::UserHost;
use crate::error::Result;
use crate::ports::{SshClientTrait, SshConnector};
use crate::ssh::{CommandOutput, ConnectOptions, SshClient};

/// Real SSH connector using russh
#[derive(Debug, Default, Clone)]
pub struct RealSshConnector {
    options: ConnectOptions,
}

impl RealSshConnector {
    #[must_use]
    pub const fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    /// Build a connector from the `settings` section of a document
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(ConnectOptions {
            port: settings.port,
            host_key_verification: settings.host_key_verification,
            limits: settings.limits.clone(),
        })
    }

    #[must_use]
    pub const fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

#[async_trait]
impl SshConnector for RealSshConnector {
    type Client = SshClient;

    async fn connect(&self, target: &UserHost) -> Result<Self::Client> {
        SshClient::connect_with_agent(target, &self.options).await
    }

    async fn connect_with_password(
        &self,
        target: &UserHost,
        password: &str,
    ) -> Result<Self::Client> {
        SshClient::connect_with_password(target, &self.options, password).await
    }
}

#[async_trait]
impl SshClientTrait for SshClient {
    async fn exec(&self, command: &str, limits: &LimitsConfig) -> Result<CommandOutput> {
        self.exec(command, limits).await
    }

    fn host_name(&self) -> &str {
        self.host_name()
    }

    fn close(self) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move { self.close().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostKeyVerification;

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.port = 2222;
        settings.host_key_verification = HostKeyVerification::Strict;
        settings.limits.connection_timeout_seconds = 5;

        let connector = RealSshConnector::from_settings(&settings);
        assert_eq!(connector.options().port, 2222);
        assert_eq!(
            connector.options().host_key_verification,
            HostKeyVerification::Strict
        );
        assert_eq!(connector.options().limits.connection_timeout_seconds, 5);
    }

    #[test]
    fn test_default_connector_uses_port_22() {
        assert_eq!(RealSshConnector::default().options().port, 22);
    }
}
