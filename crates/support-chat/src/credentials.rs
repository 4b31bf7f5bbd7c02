//! Salted password hashing with blake3, stored as `blake3$<salt>$<hex digest>`
use uuid::Uuid;

const SCHEME: &str = "blake3";

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}${}", SCHEME, salt, digest(&salt, password))
}

/// Constant-time comparison against a stored hash; malformed hashes never verify
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    match blake3::Hash::from_hex(expected) {
        Ok(expected) => blake3::Hash::from_hex(digest(salt, password)).map(|h| h == expected).unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash_password("s3cret!");
        assert!(stored.starts_with("blake3$"));
        assert!(verify_password("s3cret!", &stored));
        assert!(!verify_password("s3cret", &stored));
    }

    #[test]
    fn test_salts_differ_per_hash() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "bcrypt$abc$def"));
        assert!(!verify_password("x", "blake3$salt$nothex"));
    }
}
