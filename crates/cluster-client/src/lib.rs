//! Cluster Client
//!
//! Key-addressed access to the Kubernetes objects the WebService controller
//! reads and writes. Every operation names a resource by kind, namespace and
//! name, and reports "not found" separately from every other failure so the
//! reconciler can branch on absence.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterClientTrait, ObjectKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClusterClient::new(kube::Client::try_default().await?);
//! let key = ObjectKey::new("default", "svc-a");
//!
//! match client.get_deployment(&key).await {
//!     Ok(deployment) => println!("found {:?}", deployment.metadata.name),
//!     Err(e) if e.is_not_found() => println!("{} has no deployment yet", key),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod key;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
pub use key::{ObjectKey, ResourceKind};
#[cfg(feature = "test-util")]
pub use mock::{Call, MockClusterClient, Operation};
