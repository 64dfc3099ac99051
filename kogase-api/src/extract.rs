/// Request extractors
///
/// - [`ApiJson`] and [`ApiQuery`]: `Json`/`Query` whose rejections become
///   [`ApiError`] bodies
/// - [`ClientIp`]: the caller's address as seen through proxies
/// - [`CurrentPrincipal`] and [`CurrentUser`]: the identity inserted by the
///   authentication layers in [`crate::app`]

use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, HeaderMap},
    Json,
};
use kogase_shared::auth::middleware::{Principal, UserPrincipal};
use serde::de::DeserializeOwned;
use std::net::{IpAddr, SocketAddr};

/// JSON body extractor that rejects with a 400 [`ApiError`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// Query string extractor that rejects with a 400 [`ApiError`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

/// Caller IP: first `X-Forwarded-For` hop, else `X-Real-IP`, else the peer
/// address; empty when none is known
///
/// Header values that do not parse as an IP address are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let header_ip = |name: &str, first_hop: bool| {
            let value = headers.get(name)?.to_str().ok()?;
            let value = if first_hop { value.split(',').next()? } else { value };
            value.trim().parse::<IpAddr>().ok()
        };

        let ip = header_ip("x-forwarded-for", true)
            .or_else(|| header_ip("x-real-ip", false))
            .or_else(|| peer.map(|addr| addr.ip()))
            .map(|ip| ip.to_string())
            .unwrap_or_default();

        ClientIp(ip)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientIp::resolve(&parts.headers, peer))
    }
}

/// Whoever authenticated the request
#[derive(Debug, Clone, Copy)]
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(CurrentPrincipal)
            .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))
    }
}

/// A dashboard user; project API keys are refused
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserPrincipal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentPrincipal(principal) = CurrentPrincipal::from_request_parts(parts, state).await?;

        principal
            .as_user()
            .copied()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("A user session is required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.7:5555".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_hop_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(ClientIp::resolve(&headers, peer()).0, "203.0.113.9");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(ClientIp::resolve(&headers, peer()).0, "198.51.100.2");
    }

    #[test]
    fn test_unparseable_forwarded_values_are_skipped() {
        let mut headers = HeaderMap::new();
        let junk = "x".repeat(80);
        headers.insert("x-forwarded-for", HeaderValue::from_str(&junk).unwrap());
        assert_eq!(ClientIp::resolve(&headers, peer()).0, "192.0.2.7");

        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(ClientIp::resolve(&headers, peer()).0, "2001:db8::1");

        headers.insert("x-real-ip", HeaderValue::from_static("unknown"));
        assert_eq!(ClientIp::resolve(&headers, None).0, "");
    }

    #[test]
    fn test_peer_address_fallback() {
        assert_eq!(ClientIp::resolve(&HeaderMap::new(), peer()).0, "192.0.2.7");
        assert_eq!(ClientIp::resolve(&HeaderMap::new(), None).0, "");
    }
}
