//! Bearer token authentication and role-based route authorization.

pub mod middleware;
pub mod policy;

pub use middleware::{auth_middleware, AuthState, Caller, Claims};
pub use policy::AccessPolicy;
