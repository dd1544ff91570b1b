pub mod password;

pub use password::{
    hash_password, verify_password, AccountPasswordHasher, Argon2Config, PasswordConfig,
    PasswordIssue, PasswordStrength, PasswordValidationResult,
};
