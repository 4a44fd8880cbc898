use bcrypt::BcryptError;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// Hashes `password` with bcrypt. The salt and cost are embedded in the result.
pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    bcrypt::hash(password, HASH_COST)
}

/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match bcrypt::verify(password, stored) {
        Ok(valid) => valid,
        Err(e) => {
            log::warn!("Stored password hash could not be checked: {}", e);
            false
        }
    }
}
