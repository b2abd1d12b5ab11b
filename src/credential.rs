use std::fmt;

use crate::error::AuthError;

/// bcrypt only reads this many bytes of its input; anything longer is refused
/// rather than silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Password
///
/// The credential model. The plaintext lives only in memory for the duration
/// of the registration flow; only `hash` is ever written to storage.
#[derive(Clone, Default)]
pub struct Password {
    raw: Option<String>,
    hash: Vec<u8>,
}

impl Password {
    /// Wraps a hash loaded from storage. No plaintext is available.
    pub fn from_hash(hash: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: None,
            hash: hash.into(),
        }
    }

    /// Hashes `plaintext` into a fresh credential.
    pub fn hashed(plaintext: &str, cost: u32) -> Result<Self, AuthError> {
        let mut password = Self::default();
        password.set(plaintext, cost)?;
        Ok(password)
    }

    /// set
    ///
    /// Computes a salted bcrypt hash of `plaintext` at the given cost and keeps
    /// the plaintext transiently. Plaintext over `MAX_PASSWORD_BYTES` is
    /// rejected, since bcrypt would ignore its tail.
    pub fn set(&mut self, plaintext: &str, cost: u32) -> Result<(), AuthError> {
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::PasswordTooLong);
        }
        let hash = bcrypt::hash(plaintext, cost).map_err(AuthError::HashingFailure)?;

        self.raw = Some(plaintext.to_string());
        self.hash = hash.into_bytes();
        Ok(())
    }

    /// compare
    ///
    /// Succeeds iff `candidate` matches the stored hash. The comparison itself
    /// is delegated to bcrypt, which does not short-circuit on the first
    /// differing byte.
    pub fn compare(&self, candidate: &str) -> Result<(), AuthError> {
        // A longer candidate can never have been stored, but would match on its prefix.
        if candidate.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::CredentialMismatch);
        }

        let Ok(hash) = std::str::from_utf8(&self.hash) else {
            tracing::warn!("stored password hash is not valid utf-8");
            return Err(AuthError::CredentialMismatch);
        };

        match bcrypt::verify(candidate, hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::CredentialMismatch),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash could not be parsed");
                Err(AuthError::CredentialMismatch)
            }
        }
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Drops the transient plaintext once registration no longer needs it.
    pub fn forget_raw(&mut self) {
        self.raw = None;
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("raw", &self.raw.as_ref().map(|_| "<redacted>"))
            .field("hash", &"<redacted>")
            .finish()
    }
}
