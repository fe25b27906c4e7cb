//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering the identity
//! authority, the drive API root, the scopes requested per grant, and client authentication
//! preferences. `grant` names the grants the fetcher performs. `strategy` defines
//! [`ProviderStrategy`], an HTTP-client-agnostic hook used by flows to map token endpoint
//! failures into the fetcher error taxonomy.

pub mod descriptor;
pub mod grant;
pub mod strategy;

pub use descriptor::*;
pub use grant::*;
pub use strategy::*;
