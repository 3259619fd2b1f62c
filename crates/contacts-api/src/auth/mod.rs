//! Authentication and authorization module
//!
//! - Token generation and validation (access, refresh, email confirmation)
//! - Password hashing with Argon2
//! - Authentication and role-authorization middleware
//! - Authentication service (signup, login, refresh rotation, confirmation)
//! - Request and response models

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

pub use jwt::{Claims, JwtError, TokenScope, TokenService};
pub use middleware::{auth_middleware, authorize, bearer_token, require_any_role};
pub use models::{
    AvatarRequest, CurrentUser, LoginForm, MessageResponse, RequestEmail, SignupRequest,
    TokenResponse, UserResponse,
};
pub use password::{hash_password, verify_password};
pub use service::{gravatar_url, AuthService};
