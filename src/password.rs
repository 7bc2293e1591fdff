//! Password hashing via bcrypt.

use std::sync::Arc;

use crate::error::AppError;

/// CredentialVerifier
///
/// Hashes and checks account passwords. Kept behind a trait so tests can use a cheap
/// cost factor.
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AppError>;
    /// A digest that fails to parse verifies as `false`.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

pub type CredentialState = Arc<dyn CredentialVerifier>;

/// bcrypt with a configurable cost factor.
#[derive(Debug, Clone, Copy)]
pub struct BcryptVerifier {
    cost: u32,
}

impl BcryptVerifier {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptVerifier {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialVerifier for BcryptVerifier {
    fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| AppError::Internal(format!("bcrypt hash: {e}")))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        bcrypt::verify(plaintext, digest).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored password digest could not be checked");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_original_password() {
        let verifier = BcryptVerifier::new(4);
        let digest = verifier.hash("hunter22").unwrap();
        assert!(verifier.verify("hunter22", &digest));
        assert!(!verifier.verify("hunter23", &digest));
        assert!(!verifier.verify("hunter22", "not-a-bcrypt-digest"));
    }
}
