//! Password hashing and generation
//!
//! Hashes are Argon2id PHC strings:
//! - Memory: 64 MiB
//! - Iterations: 3
//! - Parallelism: 4 lanes
//! - Salt: 16 bytes, output: 32 bytes
//!
//! Hashing is CPU bound; async callers go through `spawn_blocking`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};
use trellis_core::{Result, Settings, TrellisError};

const MEMORY_COST_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;
const OUTPUT_LEN: usize = 32;

/// Shortest password `generate_password` produces
pub const GENERATED_LENGTH_MIN: usize = 12;

/// Upper bound on accepted and generated password length
pub const MAX_PASSWORD_LENGTH: usize = 1024;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBERS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";

fn create_argon2() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| TrellisError::internal_error(format!("invalid argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password. Blocks; prefer `hash_password_async` on the runtime.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = create_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| TrellisError::internal_error(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

pub async fn hash_password_async(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| TrellisError::internal_error(format!("hashing task failed: {}", e)))?
}

/// Check a password against a stored PHC hash. The parameters embedded in
/// the hash are used, so older hashes keep verifying.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(e) => {
            warn!("Failed to parse password hash: {}", e);
            return false;
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => true,
        Err(_) => {
            debug!("Password verification failed");
            false
        }
    }
}

pub async fn verify_password_async(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// True when the hash was produced with weaker parameters than the current ones
pub fn needs_rehash(hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return true,
    };

    if parsed_hash.algorithm.as_str() != "argon2id" {
        return true;
    }

    let below = |name: &str, current: u32| {
        parsed_hash
            .params
            .get_str(name)
            .and_then(|v| v.parse::<u32>().ok())
            .is_some_and(|v| v < current)
    };
    below("m", MEMORY_COST_KIB) || below("t", TIME_COST)
}

/// Random password satisfying every minimum in `settings`. The length is the
/// larger of the configured minimum, `GENERATED_LENGTH_MIN` and the sum of
/// the class minimums, capped at `MAX_PASSWORD_LENGTH`.
pub fn generate_password(settings: &Settings) -> String {
    let classes = [
        (settings.lowercase_min, LOWERCASE),
        (settings.uppercase_min, UPPERCASE),
        (settings.number_min, NUMBERS),
        (settings.symbol_min, SYMBOLS),
    ];
    let required: usize = classes.iter().map(|(min, _)| *min as usize).sum();
    let length = (settings.length_min as usize)
        .max(GENERATED_LENGTH_MIN)
        .max(required)
        .min(MAX_PASSWORD_LENGTH);

    let mut rng = rand::thread_rng();
    let mut chars: Vec<u8> = Vec::with_capacity(length);
    for (min, charset) in classes {
        for _ in 0..(min as usize).min(length - chars.len()) {
            chars.push(charset[rng.gen_range(0..charset.len())]);
        }
    }

    let alphabet: Vec<u8> = [LOWERCASE, UPPERCASE, NUMBERS, SYMBOLS].concat();
    while chars.len() < length {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PasswordPolicy;

    #[test]
    fn test_hash_and_verify() {
        let password = "my_secure_password_123!";
        let hash = hash_password(password).expect("hashing should work");

        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong_password", &hash));
    }

    #[test]
    fn test_hash_format_argon2id() {
        let hash = hash_password("test").expect("hashing should work");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
        assert!(!needs_rehash(&hash));
    }

    #[test]
    fn test_needs_rehash_weak_params() {
        assert!(needs_rehash("$argon2id$v=19$m=4096,t=3,p=1$salt$hash"));
        assert!(needs_rehash("$argon2i$v=19$m=65536,t=3,p=4$salt$hash"));
        assert!(needs_rehash("not a hash"));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not a hash"));
    }

    #[test]
    fn test_generated_password_default_length() {
        let password = generate_password(&Settings::default());
        assert_eq!(password.chars().count(), GENERATED_LENGTH_MIN);
        assert_ne!(password, generate_password(&Settings::default()));
    }

    #[test]
    fn test_generated_password_meets_policy() {
        let settings = Settings {
            length_min: 16,
            lowercase_min: 3,
            uppercase_min: 3,
            number_min: 3,
            symbol_min: 3,
            updated_at: None,
        };
        let policy = PasswordPolicy::from_settings(&settings);
        for _ in 0..20 {
            let password = generate_password(&settings);
            assert_eq!(password.chars().count(), 16);
            assert!(policy.check(&password).is_ok(), "{password}");
        }
    }

    #[test]
    fn test_generated_password_grows_to_fit_minimums() {
        let settings = Settings {
            symbol_min: 20,
            ..Default::default()
        };
        assert_eq!(generate_password(&settings).len(), 20);
    }

    #[test]
    fn test_generated_password_length_is_capped() {
        let settings = Settings {
            length_min: u32::MAX,
            symbol_min: u32::MAX,
            ..Default::default()
        };
        assert_eq!(generate_password(&settings).len(), MAX_PASSWORD_LENGTH);
    }

    #[tokio::test]
    async fn test_async_hash_and_verify() {
        let password = "async_test_password!";
        let hash = hash_password_async(password.to_string())
            .await
            .expect("hashing should work");

        assert!(verify_password_async(password.to_string(), hash).await);
    }
}
