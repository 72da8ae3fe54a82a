//! Status reconciliation for failover instances
//!
//! Observes instance custom resources and their generated workloads,
//! resolves a canonical status for each instance and records every status
//! transition in the service log exactly once per observed change.
//!
//! - [`resolver`]: pure status resolution from workloads and resource bodies
//! - [`client`]: document-level access to cluster objects
//! - [`transition`]: cache comparison and event emission
//! - [`engine`]: the watch and periodic sync loops
//! - [`provision`]: instance CRUD used by the REST layer

#![deny(missing_docs)]

pub mod backoff;
pub mod client;
pub mod engine;
pub mod instance;
pub mod provision;
pub mod resolver;
pub mod transition;

pub use client::{KubeResourceClient, ListScope, ResourceClient, WatchEvent, WatchStream};
pub use engine::{Engine, EngineConfig, EngineHandle, PassSummary, SessionEnd};
pub use instance::{ConnectionInfo, LiveStatus, ManagedInstance};
pub use provision::{
    instance_manifest, CreateInstanceRequest, GatewayConfig, InstanceChange, InstanceService,
    UpdateInstanceRequest,
};
pub use transition::{detect_transition, InstanceRef};
