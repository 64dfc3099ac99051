/// Project API key generation
///
/// Keys look like `kg_` followed by 40 base62 characters. The project owner can
/// read the key back from the dashboard, so it is stored as-is and resolved by
/// exact match (see [`crate::models::project::Project::find_by_api_key`]).
///
/// # Example
///
/// ```
/// use kogase_shared::auth::api_key::{generate_api_key, validate_api_key_format};
///
/// let key = generate_api_key();
/// assert!(key.starts_with("kg_"));
/// assert!(validate_api_key_format(&key));
/// ```

use rand::Rng;

const KEY_PREFIX: &str = "kg_";

const KEY_RANDOM_LENGTH: usize = 40;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Total length of a generated key
pub const API_KEY_LENGTH: usize = KEY_PREFIX.len() + KEY_RANDOM_LENGTH;

/// Generates a new random project key
pub fn generate_api_key() -> String {
    let mut rng = rand::thread_rng();

    let random_part: String = (0..KEY_RANDOM_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    format!("{}{}", KEY_PREFIX, random_part)
}

/// Cheap shape check done before touching the database
pub fn validate_api_key_format(key: &str) -> bool {
    match key.strip_prefix(KEY_PREFIX) {
        Some(rest) => {
            rest.len() == KEY_RANDOM_LENGTH && rest.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
