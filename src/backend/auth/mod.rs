//! Authentication: bearer-token sessions, user rows, and the Google
//! OAuth code-exchange endpoint.

/// JWT creation and verification
pub mod sessions;

/// User and login-record database operations
pub mod users;

/// POST /auth/google handler
pub mod google;

pub use sessions::{create_token, verify_token, Claims};
pub use users::User;
