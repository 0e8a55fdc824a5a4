//! Custom Resource Definitions
//!
//! The operator's own `Authentication` CRD plus the foreign resources it reads
//! (cluster config singletons, routes, OAuth clients).

mod authentication;
pub mod config;
mod route;
mod types;

pub use authentication::{
    AuthenticationOperator, AuthenticationOperatorSpec, AuthenticationOperatorStatus,
};
pub use config::{
    ApiServerConfig, AuthenticationConfig, ConsoleConfig, IdentityProvider, InfrastructureConfig,
    IngressConfig, OAuthConfig, ProxyConfig,
};
pub use route::{
    OAuthClient, Route, RouteIngress, RouteIngressCondition, RoutePort, RouteSpec, RouteStatus,
    RouteTargetReference, TlsConfig,
};
pub use types::{
    ConditionStatus, GenerationStatus, LogLevel, ManagementState, OperandVersion,
    OperatorCondition,
};
