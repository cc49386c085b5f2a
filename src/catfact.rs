//! Client for a cat-fact API.
//!
//! One HTTP/1.1 GET per call over a fresh connection, bounded by a timeout.
//! `https://` urls are fetched over rustls with the Mozilla root store;
//! `http://` goes out in the clear, for an egress proxy or a local stub.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::Error;

/// The one field we read from the API's JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatFact {
    pub fact: String,
}

#[derive(Debug, Clone)]
pub struct FactClient {
    /// `host:port` to connect to.
    addr: String,
    /// `host` header value, as written in the url.
    authority: String,
    path: String,
    /// Set for `https://` urls.
    tls: Option<Tls>,
    timeout: Duration,
}

#[derive(Clone)]
struct Tls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl fmt::Debug for Tls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls").field("server_name", &self.server_name).finish_non_exhaustive()
    }
}

impl Tls {
    fn new(host: &str) -> Result<Self, Error> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|_| Error::UnsupportedUrl(host.to_owned()))?;

        Ok(Self { connector: TlsConnector::from(Arc::new(config)), server_name })
    }
}

impl FactClient {
    /// Validates `url` up front so a bad configuration fails at startup, not
    /// on the first request.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let uri: Uri = url.parse()?;
        let (Some(host), Some(authority)) = (uri.host(), uri.authority()) else {
            return Err(Error::UnsupportedUrl(url.to_owned()));
        };
        let (tls, default_port) = match uri.scheme_str() {
            Some("http") => (None, 80),
            Some("https") => (Some(Tls::new(host)?), 443),
            _ => return Err(Error::UnsupportedUrl(url.to_owned())),
        };

        Ok(Self {
            addr: format!("{host}:{}", uri.port_u16().unwrap_or(default_port)),
            authority: authority.as_str().to_owned(),
            path: uri.path_and_query().map_or("/", |p| p.as_str()).to_owned(),
            tls,
            timeout,
        })
    }

    /// Fetches one fact.
    pub async fn fetch(&self) -> Result<CatFact, Error> {
        tokio::time::timeout(self.timeout, self.request())
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn request(&self) -> Result<CatFact, Error> {
        let stream = TcpStream::connect(&self.addr).await.map_err(Error::Connect)?;
        match &self.tls {
            None => self.exchange(TokioIo::new(stream)).await,
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(Error::Tls)?;
                self.exchange(TokioIo::new(stream)).await
            }
        }
    }

    async fn exchange<T>(&self, io: T) -> Result<CatFact, Error>
    where
        T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "fact connection closed with error");
            }
        });

        let req = http::Request::get(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("spout/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())?;

        let res = sender.send_request(req).await?;
        if !res.status().is_success() {
            return Err(Error::UpstreamStatus(res.status()));
        }

        let body = res.into_body().collect().await?.to_bytes();
        let fact = serde_json::from_slice(&body).map_err(Error::UpstreamBody)?;
        debug!(addr = %self.addr, tls = self.tls.is_some(), "fetched cat fact");
        Ok(fact)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use http::StatusCode;

    use super::*;
    use crate::testing::spawn;
    use crate::{Request, Response, Router};

    fn client(addr: SocketAddr, path: &str, timeout_ms: u64) -> FactClient {
        FactClient::new(&format!("http://{addr}{path}"), Duration::from_millis(timeout_ms)).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_decodes_a_fact() {
        let seen_host = Arc::new(std::sync::Mutex::new(None));
        let record = Arc::clone(&seen_host);
        let router = Router::new().get("/fact", move |req: Request| {
            *record.lock().unwrap() = req.header("host").map(str::to_owned);
            async { Response::json(r#"{"fact":"Cats sleep a lot.","length":17}"#) }
        });
        let server = spawn(router).await;

        let fact = client(server.addr, "/fact", 1_000).fetch().await.unwrap();

        assert_eq!(fact.fact, "Cats sleep a lot.");
        assert_eq!(seen_host.lock().unwrap().clone(), Some(server.addr.to_string()));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let router = Router::new().get("/fact", |_req: Request| async {
            StatusCode::SERVICE_UNAVAILABLE
        });
        let server = spawn(router).await;

        let err = client(server.addr, "/fact", 1_000).fetch().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamStatus(StatusCode::SERVICE_UNAVAILABLE)));
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let router = Router::new().get("/fact", |_req: Request| async { Response::json("[]") });
        let server = spawn(router).await;

        let err = client(server.addr, "/fact", 1_000).fetch().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamBody(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let router = Router::new().get("/fact", |_req: Request| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Response::json(r#"{"fact":"too late"}"#)
        });
        let server = spawn(router).await;

        let err = client(server.addr, "/fact", 50).fetch().await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(addr, "/fact", 1_000).fetch().await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }

    #[tokio::test]
    async fn https_to_a_plaintext_server_fails_the_handshake() {
        let router = Router::new().get("/fact", |_req: Request| async {
            Response::json(r#"{"fact":"in the clear"}"#)
        });
        let server = spawn(router).await;

        let client = FactClient::new(&format!("https://{}/fact", server.addr), Duration::from_secs(1)).unwrap();
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Tls(_)), "got {err:?}");
    }

    #[test]
    fn rejects_unsupported_urls() {
        for url in ["ftp://catfact.ninja/fact", "/fact", "catfact.ninja"] {
            let res = FactClient::new(url, Duration::from_secs(1));
            assert!(res.is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn defaults_to_port_80() {
        let client = FactClient::new("http://catfact.ninja/fact", Duration::from_secs(1)).unwrap();
        assert_eq!(client.addr, "catfact.ninja:80");
        assert_eq!(client.authority, "catfact.ninja");
        assert_eq!(client.path, "/fact");
        assert!(client.tls.is_none());
    }

    #[test]
    fn https_defaults_to_port_443() {
        let client = FactClient::new("https://catfact.ninja/fact", Duration::from_secs(1)).unwrap();
        assert_eq!(client.addr, "catfact.ninja:443");
        assert_eq!(client.authority, "catfact.ninja");
        assert!(client.tls.is_some());
    }
}
