//! Floating IP binding on the VPC service
//!
//! Services without their own public IP API (RDS) attach an elastic IP by
//! binding it to the port that carries the instance's private address.

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{CloudError, Result};
use serde::Deserialize;

#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Neutron subnet id of a VPC subnet
    async fn neutron_subnet_id(&self, subnet_id: &str) -> Result<String>;

    /// Port whose first fixed IP is `private_ip` in `neutron_subnet_id`
    async fn find_port(&self, private_ip: &str, neutron_subnet_id: &str) -> Result<Option<String>>;

    async fn find_floating_ip(&self, address: &str) -> Result<Option<String>>;

    /// Bind a floating IP to a port, or release it with `None`
    async fn bind_floating_ip(&self, floating_ip_id: &str, port_id: Option<&str>) -> Result<()>;
}

#[derive(Deserialize)]
struct SubnetEnvelope {
    subnet: Subnet,
}

#[derive(Deserialize)]
struct Subnet {
    neutron_subnet_id: String,
}

#[derive(Deserialize)]
struct PortList {
    #[serde(default)]
    ports: Vec<Port>,
}

#[derive(Deserialize)]
struct Port {
    id: String,
    #[serde(default)]
    fixed_ips: Vec<FixedIp>,
}

#[derive(Deserialize)]
struct FixedIp {
    ip_address: String,
    subnet_id: String,
}

#[derive(Deserialize)]
struct FloatingIpList {
    #[serde(default)]
    floatingips: Vec<FloatingIp>,
}

#[derive(Deserialize)]
struct FloatingIp {
    id: String,
    floating_ip_address: String,
}

#[async_trait]
impl NetworkApi for ServiceClient {
    async fn neutron_subnet_id(&self, subnet_id: &str) -> Result<String> {
        let url = self.url(&format!("v1/{}/subnets/{}", self.project_id(), subnet_id));
        let envelope: SubnetEnvelope = self.rest().get(&url).await?;
        Ok(envelope.subnet.neutron_subnet_id)
    }

    async fn find_port(&self, private_ip: &str, neutron_subnet_id: &str) -> Result<Option<String>> {
        let url = self.url(&format!("v2.0/ports?fixed_ips=ip_address={}", private_ip));
        let list: PortList = self.rest().get(&url).await?;
        Ok(list
            .ports
            .into_iter()
            .find(|port| {
                port.fixed_ips.first().is_some_and(|ip| {
                    ip.ip_address == private_ip && ip.subnet_id == neutron_subnet_id
                })
            })
            .map(|port| port.id))
    }

    async fn find_floating_ip(&self, address: &str) -> Result<Option<String>> {
        let url = self.url(&format!("v2.0/floatingips?floating_ip_address={}", address));
        let list: FloatingIpList = self.rest().get(&url).await?;
        Ok(list
            .floatingips
            .into_iter()
            .find(|ip| ip.floating_ip_address == address)
            .map(|ip| ip.id))
    }

    async fn bind_floating_ip(&self, floating_ip_id: &str, port_id: Option<&str>) -> Result<()> {
        let url = self.url(&format!("v2.0/floatingips/{}", floating_ip_id));
        let body = serde_json::json!({ "floatingip": { "port_id": port_id } });
        self.rest().put_action(&url, &body).await
    }
}

async fn floating_ip_id(network: &dyn NetworkApi, address: &str) -> Result<String> {
    network
        .find_floating_ip(address)
        .await?
        .ok_or_else(|| CloudError::NotFound(format!("floating IP {}", address)))
}

/// Bind `public_ip` to the port holding `private_ip` in the VPC subnet
pub async fn assign_public_ip(
    network: &dyn NetworkApi,
    public_ip: &str,
    private_ip: &str,
    subnet_id: &str,
) -> Result<()> {
    let neutron_subnet_id = network.neutron_subnet_id(subnet_id).await?;
    let port_id = network
        .find_port(private_ip, &neutron_subnet_id)
        .await?
        .ok_or_else(|| CloudError::NotFound(format!("port of {} in {}", private_ip, subnet_id)))?;
    let ip_id = floating_ip_id(network, public_ip).await?;

    tracing::debug!("Binding floating IP {} to port {}", public_ip, port_id);
    network.bind_floating_ip(&ip_id, Some(&port_id)).await
}

pub async fn release_public_ip(network: &dyn NetworkApi, public_ip: &str) -> Result<()> {
    let ip_id = floating_ip_id(network, public_ip).await?;
    tracing::debug!("Releasing floating IP {}", public_ip);
    network.bind_floating_ip(&ip_id, None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeNetwork {
        binds: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl NetworkApi for FakeNetwork {
        async fn neutron_subnet_id(&self, subnet_id: &str) -> Result<String> {
            Ok(format!("neutron-{}", subnet_id))
        }

        async fn find_port(&self, private_ip: &str, neutron_subnet_id: &str) -> Result<Option<String>> {
            Ok((private_ip == "192.168.0.30" && neutron_subnet_id == "neutron-subnet-1")
                .then(|| "port-1".to_string()))
        }

        async fn find_floating_ip(&self, address: &str) -> Result<Option<String>> {
            Ok((address == "80.158.0.1").then(|| "fip-1".to_string()))
        }

        async fn bind_floating_ip(&self, floating_ip_id: &str, port_id: Option<&str>) -> Result<()> {
            self.binds
                .lock()
                .unwrap()
                .push((floating_ip_id.to_string(), port_id.map(str::to_string)));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_assign_binds_port_of_private_ip() {
        let network = FakeNetwork::default();
        assign_public_ip(&network, "80.158.0.1", "192.168.0.30", "subnet-1")
            .await
            .unwrap();
        release_public_ip(&network, "80.158.0.1").await.unwrap();

        assert_eq!(
            *network.binds.lock().unwrap(),
            vec![
                ("fip-1".to_string(), Some("port-1".to_string())),
                ("fip-1".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_addresses_are_not_found() {
        let network = FakeNetwork::default();

        let err = assign_public_ip(&network, "80.158.0.1", "10.0.0.1", "subnet-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = release_public_ip(&network, "80.158.9.9").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(network.binds.lock().unwrap().is_empty());
    }
}
