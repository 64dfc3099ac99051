/// Authentication and authorization
///
/// - [`password`]: Argon2id hashing and the minimum-length rule
/// - [`jwt`]: session token issuance and validation
/// - [`api_key`]: project key generation
/// - [`middleware`]: credential extraction and [`middleware::Principal`] resolution
/// - [`authorization`]: the project access-control resolver

pub mod api_key;
pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
