//! Password hashing via bcrypt.

/// bcrypt cost used when none is configured.
pub const DEFAULT_COST: u32 = 10;

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

/// Verify a password against a stored hash.
///
/// A hash that cannot be parsed never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
