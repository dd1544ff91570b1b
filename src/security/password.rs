use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub max_consecutive_chars: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            max_consecutive_chars: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_length: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
            output_length: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordStrength {
    VeryWeak,
    Weak,
    Fair,
    Strong,
    VeryStrong,
}

impl PasswordStrength {
    pub fn score(&self) -> u8 {
        match self {
            Self::VeryWeak => 0,
            Self::Weak => 1,
            Self::Fair => 2,
            Self::Strong => 3,
            Self::VeryStrong => 4,
        }
    }

    pub fn is_acceptable(&self) -> bool {
        matches!(self, Self::Fair | Self::Strong | Self::VeryStrong)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordValidationResult {
    pub is_valid: bool,
    pub strength: PasswordStrength,
    pub score: u8,
    pub issues: Vec<PasswordIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordIssue {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    TooManyConsecutiveChars { max: usize },
    CommonPassword,
    ContainsUsername,
    ContainsEmail,
}

impl PasswordIssue {
    pub fn message(&self) -> String {
        match self {
            Self::TooShort { min, actual } => {
                format!("Password must be at least {min} characters (currently {actual})")
            }
            Self::TooLong { max, actual } => {
                format!("Password must be at most {max} characters (currently {actual})")
            }
            Self::MissingUppercase => "Password must contain at least one uppercase letter".into(),
            Self::MissingLowercase => "Password must contain at least one lowercase letter".into(),
            Self::MissingDigit => "Password must contain at least one digit".into(),
            Self::TooManyConsecutiveChars { max } => {
                format!("Password must not have more than {max} consecutive identical characters")
            }
            Self::CommonPassword => "This password is too common and easily guessed".into(),
            Self::ContainsUsername => "Password must not contain your username".into(),
            Self::ContainsEmail => "Password must not contain your email address".into(),
        }
    }
}

pub struct AccountPasswordHasher {
    argon2: Argon2<'static>,
    config: PasswordConfig,
}

impl AccountPasswordHasher {
    pub fn new(argon2_config: Argon2Config, password_config: PasswordConfig) -> Result<Self> {
        let params = Params::new(
            argon2_config.memory_cost_kib,
            argon2_config.time_cost,
            argon2_config.parallelism,
            Some(argon2_config.output_length),
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        Ok(Self {
            argon2,
            config: password_config,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Argon2Config::default(), PasswordConfig::default())
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("Password verification failed: {e}")),
        }
    }

    pub fn validate(
        &self,
        password: &str,
        username: Option<&str>,
        email: Option<&str>,
    ) -> PasswordValidationResult {
        let mut issues = Vec::new();

        let length = password.len();
        if length < self.config.min_length {
            issues.push(PasswordIssue::TooShort {
                min: self.config.min_length,
                actual: length,
            });
        }
        if length > self.config.max_length {
            issues.push(PasswordIssue::TooLong {
                max: self.config.max_length,
                actual: length,
            });
        }

        let has_uppercase = password.chars().any(|c| c.is_uppercase());
        let has_lowercase = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if self.config.require_uppercase && !has_uppercase {
            issues.push(PasswordIssue::MissingUppercase);
        }
        if self.config.require_lowercase && !has_lowercase {
            issues.push(PasswordIssue::MissingLowercase);
        }
        if self.config.require_digit && !has_digit {
            issues.push(PasswordIssue::MissingDigit);
        }

        if has_consecutive_chars(password, self.config.max_consecutive_chars) {
            issues.push(PasswordIssue::TooManyConsecutiveChars {
                max: self.config.max_consecutive_chars,
            });
        }

        if is_common_password(password) {
            issues.push(PasswordIssue::CommonPassword);
        }

        let password_lower = password.to_lowercase();
        if let Some(uname) = username {
            if !uname.is_empty() && password_lower.contains(&uname.to_lowercase()) {
                issues.push(PasswordIssue::ContainsUsername);
            }
        }

        if let Some(mail) = email {
            if let Some(local_part) = mail.split('@').next() {
                if !local_part.is_empty() && password_lower.contains(&local_part.to_lowercase()) {
                    issues.push(PasswordIssue::ContainsEmail);
                }
            }
        }

        let strength = calculate_strength(password, &issues);
        let score = strength.score();
        let is_valid = issues.is_empty() && strength.is_acceptable();

        PasswordValidationResult {
            is_valid,
            strength,
            score,
            issues,
        }
    }

    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }
}

fn has_consecutive_chars(password: &str, max: usize) -> bool {
    let chars: Vec<char> = password.chars().collect();
    let mut count = 1;

    for i in 1..chars.len() {
        if chars[i] == chars[i - 1] {
            count += 1;
            if count > max {
                return true;
            }
        } else {
            count = 1;
        }
    }
    false
}

fn is_common_password(password: &str) -> bool {
    const COMMON_PASSWORDS: &[&str] = &[
        "password",
        "123456",
        "12345678",
        "qwerty",
        "abc123",
        "letmein",
        "iloveyou",
        "sunshine",
        "123123",
        "654321",
        "password1",
        "password123",
        "welcome",
        "welcome1",
        "admin",
        "admin123",
        "changeme",
        "default",
        "secret",
        "login",
        "passw0rd",
        "p@ssword",
        "p@ssw0rd",
        "qwerty123",
        "000000",
        "111111",
        "1234567890",
    ];

    let lower = password.to_lowercase();
    COMMON_PASSWORDS
        .iter()
        .any(|&common| lower == common || lower.contains(common))
}

fn calculate_strength(password: &str, issues: &[PasswordIssue]) -> PasswordStrength {
    if !issues.is_empty() {
        let critical_issues = issues.iter().any(|i| {
            matches!(
                i,
                PasswordIssue::TooShort { .. } | PasswordIssue::CommonPassword
            )
        });
        if critical_issues {
            return PasswordStrength::VeryWeak;
        }
        return PasswordStrength::Weak;
    }

    let length = password.len();
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());
    let unique_chars: HashSet<char> = password.chars().collect();

    let mut score = 0;

    if length >= 8 {
        score += 1;
    }
    if length >= 12 {
        score += 1;
    }
    if length >= 16 {
        score += 1;
    }

    if has_uppercase {
        score += 1;
    }
    if has_lowercase {
        score += 1;
    }
    if has_digit {
        score += 1;
    }
    if has_special {
        score += 2;
    }

    if unique_chars.len() >= 10 {
        score += 1;
    }

    match score {
        0..=3 => PasswordStrength::VeryWeak,
        4 => PasswordStrength::Weak,
        5..=6 => PasswordStrength::Fair,
        7..=8 => PasswordStrength::Strong,
        _ => PasswordStrength::VeryStrong,
    }
}

/// One-shot helper for callers without a configured hasher (seeding, tools).
pub fn hash_password(password: &str) -> Result<String> {
    let hasher = AccountPasswordHasher::with_defaults()?;
    hasher.hash(password)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let hasher = AccountPasswordHasher::with_defaults()?;
    hasher.verify(password, hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_ok;
    use crate::tests::test_util;

    #[test]
    fn test_hash_and_verify() {
        test_util::setup();
        let hasher = assert_ok!(AccountPasswordHasher::with_defaults());
        let password = "Riverbank42!";
        let hash = assert_ok!(hasher.hash(password));

        assert!(assert_ok!(hasher.verify(password, &hash)));
        assert!(!assert_ok!(hasher.verify("WrongPassword", &hash)));
    }

    #[test]
    fn test_password_validation_success() {
        let hasher = AccountPasswordHasher::with_defaults().expect("Failed to create hasher");
        let result = hasher.validate("Blue7Harbor!", None, None);

        assert!(result.is_valid);
        assert!(result.issues.is_empty());
        assert!(result.strength.is_acceptable());
    }

    #[test]
    fn test_password_too_short() {
        let hasher = AccountPasswordHasher::with_defaults().expect("Failed to create hasher");
        let result = hasher.validate("Ab1!", None, None);

        assert!(!result.is_valid);
        assert!(result
            .issues
            .iter()
            .any(|i| matches!(i, PasswordIssue::TooShort { .. })));
    }

    #[test]
    fn test_common_password_detection() {
        let hasher = AccountPasswordHasher::with_defaults().expect("Failed to create hasher");
        let result = hasher.validate("password123", None, None);

        assert!(!result.is_valid);
        assert!(result
            .issues
            .iter()
            .any(|i| matches!(i, PasswordIssue::CommonPassword)));
    }

    #[test]
    fn test_username_in_password() {
        let hasher = AccountPasswordHasher::with_defaults().expect("Failed to create hasher");
        let result = hasher.validate("SarahChen2026!", Some("sarahchen"), None);

        assert!(result
            .issues
            .iter()
            .any(|i| matches!(i, PasswordIssue::ContainsUsername)));
    }

    #[test]
    fn test_email_local_part_in_password() {
        let hasher = AccountPasswordHasher::with_defaults().expect("Failed to create hasher");
        let result = hasher.validate("Mwilson99X!", None, Some("mwilson99@example.com"));

        assert!(result
            .issues
            .iter()
            .any(|i| matches!(i, PasswordIssue::ContainsEmail)));
    }

    #[test]
    fn test_password_strength_levels() {
        assert_eq!(PasswordStrength::VeryWeak.score(), 0);
        assert_eq!(PasswordStrength::Weak.score(), 1);
        assert_eq!(PasswordStrength::Fair.score(), 2);
        assert_eq!(PasswordStrength::Strong.score(), 3);
        assert_eq!(PasswordStrength::VeryStrong.score(), 4);
    }

    #[test]
    fn test_consecutive_chars_detection() {
        assert!(has_consecutive_chars("aaaa", 3));
        assert!(!has_consecutive_chars("aaa", 3));
        assert!(!has_consecutive_chars("abcd", 3));
    }

    #[test]
    fn test_helper_functions() {
        test_util::setup();
        let hash = assert_ok!(hash_password("Quiet9Meadow!"));
        assert!(assert_ok!(verify_password("Quiet9Meadow!", &hash)));
    }
}
