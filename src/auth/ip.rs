//! Client metadata extraction.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use crate::db::ClientMetadata;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Client IP: first hop of `X-Forwarded-For` when present, otherwise the
/// socket peer from `ConnectInfo`.
pub fn extract_client_ip(parts: &Parts) -> Option<String> {
    forwarded_for(&parts.headers).or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
    })
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Origin address and user agent of the caller, recorded on new sessions.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub ClientMetadata);

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientMeta(ClientMetadata {
            ip_address: extract_client_ip(parts),
            user_agent: user_agent(&parts.headers),
        }))
    }
}
