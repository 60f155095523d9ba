//! # Authentication Building Blocks
//!
//! The pieces shared across the identity core that don't need a
//! database connection: token signing and verification, password
//! hashing, and the stateless request gate.
//!
//! ```text
//! auth/
//! ├── jwt.rs        - Token issuer (C7): keyset-based signing/verification
//! ├── password.rs   - Argon2id password hashing
//! └── middleware.rs - Gate (C13): bearer-token + scope extraction
//! ```

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtService, TokenError};
pub use middleware::{Gate, Principal};
pub use password::{PasswordHasher, PasswordValidator};
