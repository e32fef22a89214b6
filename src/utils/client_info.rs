use crate::config::Config;
use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header::HeaderMap, web::Data};
use futures::future::{Ready, ready};
use std::net::{IpAddr, SocketAddr};

/// Where a request came from; stamped onto audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// The peer address. Behind a trusted proxy the first `X-Forwarded-For`
/// hop wins, then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<String> {
    let peer_ip = peer.map(|p| p.ip().to_string());
    if !trust_proxy {
        return peer_ip;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    forwarded.or_else(real_ip).map(str::to_string).or(peer_ip)
}

pub fn client_ip_addr(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy: bool,
) -> Option<IpAddr> {
    client_ip(headers, peer, trust_proxy).and_then(|ip| ip.parse().ok())
}

impl FromRequest for RequestOrigin {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let trust_proxy = req
            .app_data::<Data<Config>>()
            .is_some_and(|config| config.trust_proxy);

        let user_agent = req
            .headers()
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        ready(Ok(RequestOrigin {
            ip: client_ip(req.headers(), req.peer_addr(), trust_proxy),
            user_agent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn forwarded_header_wins_behind_a_proxy() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", "203.0.113.7, 10.0.0.1"))
            .insert_header(("x-real-ip", "198.51.100.2"))
            .peer_addr("127.0.0.1:4000".parse().unwrap())
            .to_http_request();
        assert_eq!(
            client_ip(req.headers(), req.peer_addr(), true).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn forwarded_headers_ignored_without_a_proxy() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", "10.0.0.9"))
            .insert_header(("x-real-ip", "10.0.0.9"))
            .peer_addr("192.168.1.20:4000".parse().unwrap())
            .to_http_request();
        assert_eq!(
            client_ip(req.headers(), req.peer_addr(), false).as_deref(),
            Some("192.168.1.20")
        );
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let req = TestRequest::default()
            .insert_header(("x-real-ip", "198.51.100.2"))
            .to_http_request();
        assert_eq!(client_ip(req.headers(), None, true).as_deref(), Some("198.51.100.2"));

        let req = TestRequest::default()
            .peer_addr("127.0.0.1:4000".parse().unwrap())
            .to_http_request();
        assert_eq!(
            client_ip(req.headers(), req.peer_addr(), true).as_deref(),
            Some("127.0.0.1")
        );
    }
}
