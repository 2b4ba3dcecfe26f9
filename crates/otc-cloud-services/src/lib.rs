//! Open Telekom Cloud service resources
//!
//! REST bindings and [`otc_cloud::Resource`] implementations for the managed
//! services. Each resource talks to the cloud through its own API trait, so
//! tests can substitute an in-memory fake for the [`ServiceClient`].
//!
//! # Example
//!
//! ```no_run
//! use otc_cloud::{Lifecycle, ResourceData, TokioClock};
//! use otc_cloud_services::sfs_turbo::{SfsTurboConfig, SfsTurboShare};
//! use otc_cloud_services::ProviderConfig;
//! use std::sync::Arc;
//!
//! # async fn run() -> otc_cloud::Result<()> {
//! let config = ProviderConfig::from_env()?;
//! let client = config.service_client("sfs-turbo")?;
//! let share = SfsTurboShare::new(Arc::new(TokioClock));
//!
//! let lifecycle: Lifecycle<'_, SfsTurboShare> = Lifecycle::new(&share, &client);
//! let mut data = ResourceData::new(SfsTurboConfig::new(
//!     "data", 500, "eu-de-01", "vpc-id", "subnet-id", "sg-id",
//! ));
//! lifecycle.apply(&mut data).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dcs;
pub mod dms_group;
pub mod elb_backend;
pub mod error;
pub mod identity_project;
pub mod loadbalancer;
pub mod network;
pub mod rds;
pub mod sfs_turbo;

pub use client::{RestClient, ServiceClient};
pub use config::ProviderConfig;
pub use error::ServiceError;
