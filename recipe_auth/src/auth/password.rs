//! Password hashing and input validation.

use super::{
    config::AuthConfig,
    errors::{AuthError, AuthResult},
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// Maximum accepted password length
pub const MAX_PASSWORD_LEN: usize = 128;

/// Argon2id hasher with a server-side pepper
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    pepper: String,
    /// Hash at the configured cost, verified against for unknown accounts
    decoy_hash: String,
}

impl CredentialHasher {
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        let params = Params::new(config.hash_memory_kib, config.hash_iterations, 1, None)
            .map_err(|e| AuthError::InvalidConfig(format!("password hashing cost: {e}")))?;

        let mut hasher = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            pepper: config.password_pepper.clone(),
            decoy_hash: String::new(),
        };
        hasher.decoy_hash = hasher.hash("decoy-credential")?;
        Ok(hasher)
    }

    /// Hash password with Argon2id + pepper
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify password against a stored hash
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let peppered = format!("{}{}", password, self.pepper);
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(peppered.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Spend one verification on the decoy hash and report failure
    ///
    /// Keeps a login for an unknown email as slow as a wrong password.
    pub fn verify_decoy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.decoy_hash);
        false
    }
}

/// Validate password length
pub fn validate_password(password: &str) -> AuthResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if len > MAX_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }

    Ok(())
}

/// Validate an already normalized email address
pub fn validate_email(email: &str) -> AuthResult<()> {
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidInput("Invalid email address".to_string()))
    }
}

/// Validate a display name
pub fn validate_name(name: &str) -> AuthResult<()> {
    if name.trim().is_empty() {
        return Err(AuthError::InvalidInput("Name is required".to_string()));
    }
    Ok(())
}
