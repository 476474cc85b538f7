pub mod edge_services;
pub mod registry_services;
pub mod upstream_services;

pub use edge_services::EdgeServices;
pub use registry_services::{ChannelRegistry, RegistryStatus};
pub use upstream_services::{UpstreamError, UpstreamFailure, UpstreamFetch, UpstreamService};
