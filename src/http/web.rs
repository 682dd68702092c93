use super::AppState;
use crate::error::AppError;
use axum::extract::{Query, State};
use axum::http::header;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;
use url::{Host, Url};

pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

#[derive(Deserialize)]
pub struct PageQuery {
    url: Option<String>,
}

/// Fetches a page over plain HTTP and returns its markup.
///
/// Redirects are followed by hand so that every hop is checked: unless
/// `WEB_FETCH_ALLOW_PRIVATE` is set, each host must resolve to public addresses only.
pub async fn fetch_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let raw = query
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("URL not provided.".into()))?;
    let mut url = http_url(raw.trim()).ok_or_else(|| AppError::BadRequest("Invalid URL.".into()))?;

    let mut hops = 0;
    let resp = loop {
        if !state.config.web_allow_private {
            ensure_public(&url).await?;
        }
        let resp = state
            .fetcher
            .get(url.clone())
            .send()
            .await
            .map_err(AppError::Fetch)?;
        let Some(next) = redirect_target(&url, &resp) else {
            break resp;
        };
        hops += 1;
        if hops > MAX_REDIRECTS {
            return Err(AppError::BadRequest("Too many redirects.".into()));
        }
        url = next;
    };

    let html = read_capped(resp, MAX_PAGE_BYTES).await?;
    Ok(Json(json!({ "html": html })))
}

fn http_url(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn redirect_target(from: &Url, resp: &reqwest::Response) -> Option<Url> {
    if !resp.status().is_redirection() {
        return None;
    }
    let location = resp.headers().get(header::LOCATION)?.to_str().ok()?;
    from.join(location)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

async fn ensure_public(url: &Url) -> Result<(), AppError> {
    let blocked = || AppError::BadRequest("URL not allowed.".into());
    let addrs: Vec<IpAddr> = match url.host().ok_or_else(blocked)? {
        Host::Ipv4(ip) => vec![IpAddr::V4(ip)],
        Host::Ipv6(ip) => vec![IpAddr::V6(ip)],
        Host::Domain(domain) => {
            let port = url.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((domain, port))
                .await
                .map_err(|_| AppError::BadRequest("Unknown host.".into()))?
                .map(|a| a.ip())
                .collect()
        }
    };
    if addrs.is_empty() || !addrs.iter().copied().all(is_public) {
        warn!(%url, "refusing to fetch a non-public address");
        return Err(blocked());
    }
    Ok(())
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            // 100.64.0.0/10 is carrier-grade NAT
            let shared = a == 100 && (b & 0xc0) == 64;
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || shared)
        }
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public(IpAddr::V4(v4)),
            None => {
                let first = v6.segments()[0];
                // fc00::/7 unique local, fe80::/10 link local
                !(v6.is_loopback()
                    || v6.is_unspecified()
                    || (first & 0xfe00) == 0xfc00
                    || (first & 0xffc0) == 0xfe80)
            }
        },
    }
}

async fn read_capped(mut resp: reqwest::Response, limit: usize) -> Result<String, AppError> {
    if resp.content_length().is_some_and(|n| n > limit as u64) {
        return Err(AppError::PageTooLarge(limit));
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(AppError::Fetch)? {
        if body.len() + chunk.len() > limit {
            return Err(AppError::PageTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}
