pub mod identity;
pub mod policy;
pub mod relay_config;
pub mod role;
pub mod token;
pub mod upstream;

pub use identity::Identity;
pub use policy::{Policy, Subject, WILDCARD};
pub use relay_config::{RelayConfig, RelayConfigPatch};
pub use role::{Role, RoleAssignment};
pub use token::{Token, TokenPatch, DEFAULT_SCOPE};
pub use upstream::{AuthMode, UpstreamPatch, UpstreamTarget};
