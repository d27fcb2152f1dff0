//! Membership queries against etcd

use crate::config::EtcdConfig;
use crate::error::EtcdError;
use async_trait::async_trait;
use etcd_client::{Certificate, Client, ConnectOptions, Identity, TlsOptions};
use std::path::Path;
use tracing::{debug, info};

/// A cluster member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: u64,
    pub name: String,
}

/// Members of the cluster and the id of the one currently leading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub leader_id: u64,
    pub members: Vec<Member>,
}

impl MembershipSnapshot {
    /// Name of the leading member, if it is listed and named
    pub fn leader_name(&self) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.id == self.leader_id)
            .map(|m| m.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Source of membership snapshots
#[async_trait]
pub trait MembershipClient: Send + 'static {
    async fn membership(&mut self) -> Result<MembershipSnapshot, EtcdError>;
}

/// etcd client authenticated with a client certificate
pub struct EtcdMembershipClient {
    client: Client,
}

impl EtcdMembershipClient {
    /// Connect to the configured endpoint.
    ///
    /// Fails with [`EtcdError::Connection`] if no connection is up within
    /// the dial timeout.
    pub async fn connect(config: &EtcdConfig) -> Result<Self, EtcdError> {
        let cert = read_pem(&config.cert_path).await?;
        let key = read_pem(&config.key_path).await?;
        let ca = read_pem(&config.ca_path).await?;

        let tls = TlsOptions::new()
            .ca_certificate(Certificate::from_pem(ca))
            .identity(Identity::from_pem(cert, key));
        let options = ConnectOptions::new()
            .with_tls(tls)
            .with_connect_timeout(config.dial_timeout());

        let connect = Client::connect([config.endpoint.as_str()], Some(options));
        let client = tokio::time::timeout(config.dial_timeout(), connect)
            .await
            .map_err(|_| {
                EtcdError::Connection(format!(
                    "timed out after {:?} connecting to {}",
                    config.dial_timeout(),
                    config.endpoint
                ))
            })?
            .map_err(|e| EtcdError::Connection(format!("{}: {}", config.endpoint, e)))?;

        info!(endpoint = %config.endpoint, "Connected to etcd");
        Ok(Self { client })
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, EtcdError> {
    tokio::fs::read(path).await.map_err(|source| EtcdError::Tls {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl MembershipClient for EtcdMembershipClient {
    async fn membership(&mut self) -> Result<MembershipSnapshot, EtcdError> {
        let status = self
            .client
            .status()
            .await
            .map_err(|e| EtcdError::Query(format!("status: {}", e)))?;
        let list = self
            .client
            .member_list()
            .await
            .map_err(|e| EtcdError::Query(format!("member list: {}", e)))?;

        let members = list
            .members()
            .iter()
            .map(|m| Member {
                id: m.id(),
                name: m.name().to_string(),
            })
            .collect::<Vec<_>>();
        debug!(leader_id = status.leader(), members = members.len(), "Fetched etcd membership");

        Ok(MembershipSnapshot {
            leader_id: status.leader(),
            members,
        })
    }
}
