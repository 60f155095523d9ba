//! # One-Time Password Subsystem
//!
//! Everything the identity core needs to enroll, validate, and rotate
//! second-factor credentials.
//!
//! ## Module Structure
//!
//! ```text
//! otp/
//! ├── totp.rs      - TOTP secret generation, URI building, code validation
//! ├── cipher.rs     - AES-GCM cipher ring for encrypting secrets at rest
//! └── refresher.rs  - background task that rotates the cipher ring (C8)
//! ```
//!
//! OTP secrets and backup codes are never stored in plaintext: they are
//! encrypted with the current [`cipher::CipherRing`] key before being
//! written to the credential store, and decrypted on demand using whichever
//! ring member still validates. The ring is owned by a single background
//! task ([`refresher::SecretRefresher`]) so rotation never races a reader
//! mid-decrypt.

pub mod cipher;
pub mod refresher;
pub mod totp;

pub use cipher::{CipherRing, OtpCipherError};
pub use refresher::{SecretRefresher, SecretRefresherHandle};
pub use totp::{TotpManager, TotpSecret};
