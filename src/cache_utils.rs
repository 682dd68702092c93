use crate::types::HistoryMessage;
use axum::http::HeaderMap;

pub fn chat_key(chat_id: &str) -> String {
    format!("chat:{chat_id}")
}

pub fn rate_limit_key(ip: &str) -> String {
    format!("rate-limit:{ip}")
}

/// First hop of `X-Forwarded-For`, or `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// The trailing `window` messages of a history.
pub fn recent(history: &[HistoryMessage], window: usize) -> Vec<HistoryMessage> {
    let start = history.len().saturating_sub(window);
    history[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 10.0.0.1 , 172.16.0.1"),
        );
        assert_eq!(client_ip(&headers), "10.0.0.1");
    }

    #[test]
    fn recent_keeps_the_tail() {
        let history: Vec<_> = (0..7).map(|i| HistoryMessage::user(i.to_string())).collect();
        let tail = recent(&history, 5);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0].text(), "2");
        assert_eq!(recent(&history[..2], 5).len(), 2);
    }
}
