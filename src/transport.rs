//! Authenticated HTTP transports.
//!
//! Each transport executes a single verb against a path below the McM base
//! URL and hands back the raw response body. Status codes are not inspected;
//! the resource layer decides success by decoding the body as JSON.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Identity, Method};
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::client::{create_client_builder, AuthMode, Config, CA_DIRECTORY, PROXY_ENV_VAR};
use crate::cookie::{load_jar, resolve_cookie_file};
use crate::error::{McmError, Result};

/// HTTP verbs used by the McM API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Verb> for Method {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => Method::GET,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }
}

/// Executes one HTTP request under a fixed authentication mode
pub trait Transport: Send + Sync {
    /// Absolute URL for a request path
    fn url(&self, path: &str) -> Result<Url>;

    /// Execute `verb` against `path`, sending `body` as JSON when present.
    ///
    /// Returns the response body whatever the status code.
    fn execute(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Vec<u8>>;
}

/// Build the transport selected by `config.auth`.
///
/// Credential problems are returned as fatal errors before any request is made.
pub fn connect(config: &Config) -> Result<Box<dyn Transport>> {
    let base = Url::parse(&config.base_url())?;
    let transport: Box<dyn Transport> = match config.auth {
        AuthMode::Certificate => {
            let proxy = proxy_path_from_env()?;
            Box::new(CertificateTransport::new(base, &proxy, config.debug)?)
        }
        AuthMode::Cookie => {
            let cookie_path = resolve_cookie_file(config)?;
            info!(path = %cookie_path.display(), "using SSO cookie file");
            Box::new(CookieTransport::new(
                base,
                &cookie_path,
                Some(Path::new(CA_DIRECTORY)),
                config.debug,
            )?)
        }
        AuthMode::Anonymous => Box::new(AnonymousTransport::new(base, config.debug)?),
    };
    Ok(transport)
}

/// Path of the X.509 proxy named by `X509_USER_PROXY`
pub fn proxy_path_from_env() -> Result<PathBuf> {
    proxy_path_from(|name| std::env::var_os(name))
}

/// Path of the X.509 proxy, reading `X509_USER_PROXY` through `lookup`
pub fn proxy_path_from<F>(lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    lookup(PROXY_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or(McmError::MissingEnvironment(PROXY_ENV_VAR))
}

/// reqwest client bound to a base URL; the part every transport shares
#[derive(Debug, Clone)]
struct Channel {
    client: Client,
    base: Url,
    debug: bool,
}

impl Channel {
    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn send(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Vec<u8>> {
        let url = self.url(path)?;
        let payload = body.map(serde_json::to_vec).transpose()?;

        if self.debug {
            match &payload {
                Some(data) => info!(%verb, %url, data = %String::from_utf8_lossy(data), "request"),
                None => info!(%verb, %url, "request"),
            }
        } else {
            trace!(%verb, %url, "request");
        }

        let mut request = self.client.request(verb.into(), url);
        if let Some(data) = payload {
            request = request.header(CONTENT_TYPE, "application/json").body(data);
        }

        let response = request.send()?;
        let status = response.status();
        let bytes = response.bytes()?;
        trace!(%verb, status = status.as_u16(), length = bytes.len(), "response");

        Ok(bytes.to_vec())
    }
}

/// TLS transport presenting an X.509 proxy as client certificate and key
#[derive(Debug, Clone)]
pub struct CertificateTransport {
    channel: Channel,
    proxy: PathBuf,
}

impl CertificateTransport {
    /// Create a transport from a PEM file holding both certificate chain and private key
    pub fn new(base: Url, proxy: &Path, debug: bool) -> Result<Self> {
        Self::with_builder(create_client_builder(), base, proxy, debug)
    }

    fn with_builder(builder: ClientBuilder, base: Url, proxy: &Path, debug: bool) -> Result<Self> {
        if !proxy.is_file() {
            return Err(McmError::CredentialUnavailable {
                path: proxy.to_path_buf(),
            });
        }
        let pem = fs::read(proxy)?;
        let identity = Identity::from_pem(&pem)?;
        let client = builder.use_rustls_tls().identity(identity).build()?;
        debug!(proxy = %proxy.display(), "certificate transport ready");

        Ok(CertificateTransport {
            channel: Channel {
                client,
                base,
                debug,
            },
            proxy: proxy.to_path_buf(),
        })
    }

    pub fn proxy(&self) -> &Path {
        &self.proxy
    }
}

impl Transport for CertificateTransport {
    fn url(&self, path: &str) -> Result<Url> {
        self.channel.url(path)
    }

    fn execute(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Vec<u8>> {
        self.channel.send(verb, path, body)
    }
}

/// TLS transport presenting an SSO cookie jar on every request.
///
/// Every call reads its own response body, so no output buffer is shared
/// between calls.
#[derive(Debug, Clone)]
pub struct CookieTransport {
    channel: Channel,
    cookie_file: PathBuf,
}

impl CookieTransport {
    /// Create a transport from an existing jar file.
    ///
    /// Peer certificate and host name are verified; PEM files in `ca_directory`
    /// are trusted in addition to the built-in roots.
    pub fn new(base: Url, cookie_file: &Path, ca_directory: Option<&Path>, debug: bool) -> Result<Self> {
        Self::with_builder(create_client_builder(), base, cookie_file, ca_directory, debug)
    }

    fn with_builder(
        builder: ClientBuilder,
        base: Url,
        cookie_file: &Path,
        ca_directory: Option<&Path>,
        debug: bool,
    ) -> Result<Self> {
        let jar = load_jar(cookie_file)?;
        // peer and host name verification stay at reqwest's defaults (on)
        let mut builder = builder.cookie_provider(jar);
        if let Some(directory) = ca_directory {
            let certificates = read_ca_directory(directory);
            debug!(directory = %directory.display(), trusted = certificates.len(), "loaded CA directory");
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        Ok(CookieTransport {
            channel: Channel {
                client: builder.build()?,
                base,
                debug,
            },
            cookie_file: cookie_file.to_path_buf(),
        })
    }

    pub fn cookie_file(&self) -> &Path {
        &self.cookie_file
    }
}

impl Transport for CookieTransport {
    fn url(&self, path: &str) -> Result<Url> {
        self.channel.url(path)
    }

    fn execute(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Vec<u8>> {
        self.channel.send(verb, path, body)
    }
}

/// Every certificate in the PEM files of `directory`.
///
/// Bundle files contribute all of their certificates; files that hold none are skipped.
fn read_ca_directory(directory: &Path) -> Vec<Certificate> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(directory = %directory.display(), error = %e, "CA directory is not readable");
            return Vec::new();
        }
    };

    let mut certificates = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match fs::read(&path).map(|pem| Certificate::from_pem_bundle(&pem)) {
            Ok(Ok(bundle)) if !bundle.is_empty() => certificates.extend(bundle),
            Ok(Ok(_)) => debug!(path = %path.display(), "skipping file without certificates"),
            Ok(Err(e)) => debug!(path = %path.display(), error = %e, "skipping non-certificate file"),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    certificates
}

/// Plain HTTP transport without credentials
#[derive(Debug, Clone)]
pub struct AnonymousTransport {
    channel: Channel,
}

impl AnonymousTransport {
    pub fn new(base: Url, debug: bool) -> Result<Self> {
        Self::with_builder(create_client_builder(), base, debug)
    }

    fn with_builder(builder: ClientBuilder, base: Url, debug: bool) -> Result<Self> {
        Ok(AnonymousTransport {
            channel: Channel {
                client: builder.build()?,
                base,
                debug,
            },
        })
    }
}

impl Transport for AnonymousTransport {
    fn url(&self, path: &str) -> Result<Url> {
        self.channel.url(path)
    }

    fn execute(&self, verb: Verb, path: &str, body: Option<&Value>) -> Result<Vec<u8>> {
        self.channel.send(verb, path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};
    use tokio::runtime::Runtime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const PROXY_PEM: &str = include_str!("../tests/fixtures/proxy.pem");
    const CA_BUNDLE_PEM: &str = include_str!("../tests/fixtures/ca-bundle.pem");

    /// Start a server answering `verb route` with `body`; transport calls run outside `rt`
    fn mock_server(rt: &Runtime, verb: &str, route: &str, body: &str) -> MockServer {
        rt.block_on(async {
            let server = MockServer::start().await;
            Mock::given(method(verb))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
            server
        })
    }

    fn base_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/mcm/", server.uri())).unwrap()
    }

    fn single_request(rt: &Runtime, server: &MockServer) -> Request {
        let mut requests = rt.block_on(server.received_requests()).unwrap();
        assert_eq!(requests.len(), 1);
        requests.remove(0)
    }

    fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
        request.headers.get(name).and_then(|value| value.to_str().ok())
    }

    fn anonymous(base: Url) -> AnonymousTransport {
        AnonymousTransport::with_builder(create_client_builder().no_proxy(), base, true).unwrap()
    }

    #[test]
    fn test_verb_names() {
        assert_eq!(Verb::Get.to_string(), "GET");
        assert_eq!(Verb::Put.as_str(), "PUT");
        assert_eq!(Method::from(Verb::Delete), Method::DELETE);
    }

    #[test]
    fn test_url_joins_below_application_path() {
        let transport = AnonymousTransport::new(
            Url::parse("http://cms-pdmv-dev.cern.ch/mcm/").unwrap(),
            false,
        )
        .unwrap();
        let url = transport.url("restapi/requests/get/ABC-001").unwrap();
        assert_eq!(url.as_str(), "http://cms-pdmv-dev.cern.ch/mcm/restapi/requests/get/ABC-001");

        let url = transport.url("search/?db_name=requests&page=-1&").unwrap();
        assert_eq!(url.path(), "/mcm/search/");
        assert_eq!(url.query(), Some("db_name=requests&page=-1&"));
    }

    #[test]
    fn test_anonymous_get_returns_body() {
        let rt = Runtime::new().unwrap();
        let body = r#"{"results": {"prepid": "ABC-001"}}"#;
        let server = mock_server(&rt, "GET", "/mcm/restapi/requests/get/ABC-001", body);
        let transport = anonymous(base_url(&server));

        let received = transport
            .execute(Verb::Get, "restapi/requests/get/ABC-001", None)
            .unwrap();
        assert_eq!(received, body.as_bytes().to_vec());

        let request = single_request(&rt, &server);
        assert_eq!(request.method.as_str(), "GET");
        assert!(request.body.is_empty());
        assert!(header(&request, "content-type").is_none());
    }

    #[test]
    fn test_anonymous_put_sends_json() {
        let rt = Runtime::new().unwrap();
        let server = mock_server(&rt, "PUT", "/mcm/restapi/requests/save", r#"{"results": true}"#);
        let transport = anonymous(base_url(&server));

        let data = json!({"prepid": "ABC-001", "priority": 110000});
        transport
            .execute(Verb::Put, "restapi/requests/save", Some(&data))
            .unwrap();

        let request = single_request(&rt, &server);
        assert_eq!(request.method.as_str(), "PUT");
        assert_eq!(request.url.path(), "/mcm/restapi/requests/save");
        assert_eq!(header(&request, "content-type"), Some("application/json"));
        let sent: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent, data);
    }

    #[test]
    fn test_empty_body_is_returned_as_is() {
        let rt = Runtime::new().unwrap();
        let server = mock_server(&rt, "DELETE", "/mcm/restapi/requests/delete/ABC-001", "");
        let transport = anonymous(base_url(&server));

        let body = transport
            .execute(Verb::Delete, "restapi/requests/delete/ABC-001", None)
            .unwrap();
        assert!(body.is_empty());
        assert_eq!(single_request(&rt, &server).method.as_str(), "DELETE");
    }

    #[test]
    fn test_cookie_transport_presents_jar() {
        let rt = Runtime::new().unwrap();
        let server = mock_server(&rt, "GET", "/mcm/search/", r#"{"results": []}"#);
        let mut jar = NamedTempFile::new().unwrap();
        writeln!(jar, "# Netscape HTTP Cookie File").unwrap();
        writeln!(jar, "127.0.0.1\tFALSE\t/\tFALSE\t0\t_shibsession\ts3cr3t").unwrap();

        let transport = CookieTransport::with_builder(
            create_client_builder().no_proxy(),
            base_url(&server),
            jar.path(),
            None,
            false,
        )
        .unwrap();
        assert_eq!(transport.cookie_file(), jar.path());

        transport
            .execute(Verb::Get, "search/?db_name=requests&page=0&", None)
            .unwrap();

        let request = single_request(&rt, &server);
        assert_eq!(request.url.query(), Some("db_name=requests&page=0&"));
        let cookie = header(&request, "cookie").expect("cookie header");
        assert!(cookie.contains("_shibsession=s3cr3t"));
    }

    #[test]
    fn test_ca_directory_reads_whole_bundles() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ca-bundle.crt"), CA_BUNDLE_PEM).unwrap();
        fs::write(dir.path().join("README"), "not a certificate").unwrap();
        fs::create_dir(dir.path().join("legacy")).unwrap();

        assert_eq!(read_ca_directory(dir.path()).len(), 2);
    }

    #[test]
    fn test_missing_ca_directory_trusts_nothing_extra() {
        let dir = tempdir().unwrap();
        assert!(read_ca_directory(&dir.path().join("missing")).is_empty());

        let jar = NamedTempFile::new().unwrap();
        let transport = CookieTransport::new(
            Url::parse("https://cms-pdmv-dev.cern.ch/mcm/").unwrap(),
            jar.path(),
            Some(&dir.path().join("missing")),
            false,
        );
        assert!(transport.is_ok());
    }

    #[test]
    fn test_cookie_transport_with_ca_bundle() {
        let jar = NamedTempFile::new().unwrap();
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ca-bundle.crt"), CA_BUNDLE_PEM).unwrap();
        let transport = CookieTransport::new(
            Url::parse("https://cms-pdmv-dev.cern.ch/mcm/").unwrap(),
            jar.path(),
            Some(dir.path()),
            false,
        );
        assert!(transport.is_ok());
    }

    #[test]
    fn test_certificate_transport_with_valid_proxy() {
        let rt = Runtime::new().unwrap();
        let server = mock_server(&rt, "GET", "/mcm/restapi/campaigns/get/Run3Summer22", r#"{"results": {}}"#);
        let mut proxy = NamedTempFile::new().unwrap();
        proxy.write_all(PROXY_PEM.as_bytes()).unwrap();

        let transport = CertificateTransport::with_builder(
            create_client_builder().no_proxy(),
            base_url(&server),
            proxy.path(),
            false,
        )
        .unwrap();
        assert_eq!(transport.proxy(), proxy.path());

        let body = transport
            .execute(Verb::Get, "restapi/campaigns/get/Run3Summer22", None)
            .unwrap();
        assert_eq!(body, br#"{"results": {}}"#.to_vec());
        assert_eq!(single_request(&rt, &server).method.as_str(), "GET");
    }

    #[test]
    fn test_certificate_transport_requires_proxy_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("x509up_u1000");
        let err = CertificateTransport::new(
            Url::parse("https://cms-pdmv-dev.cern.ch/mcm/").unwrap(),
            &missing,
            false,
        )
        .unwrap_err();
        match err {
            McmError::CredentialUnavailable { path } => assert_eq!(path, missing),
            other => panic!("expected CredentialUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_certificate_transport_rejects_invalid_pem() {
        let mut proxy = NamedTempFile::new().unwrap();
        writeln!(proxy, "this is not a proxy").unwrap();
        let err = CertificateTransport::new(
            Url::parse("https://cms-pdmv-dev.cern.ch/mcm/").unwrap(),
            proxy.path(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, McmError::Transport(_)));
    }

    #[test]
    fn test_proxy_path_lookup() {
        let path = proxy_path_from(|name| {
            assert_eq!(name, "X509_USER_PROXY");
            Some(OsString::from("/tmp/x509up_u1000"))
        })
        .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x509up_u1000"));

        let err = proxy_path_from(|_| None).unwrap_err();
        assert!(matches!(err, McmError::MissingEnvironment("X509_USER_PROXY")));
        assert!(err.is_fatal());

        let err = proxy_path_from(|_| Some(OsString::new())).unwrap_err();
        assert!(matches!(err, McmError::MissingEnvironment(_)));
    }

    #[test]
    fn test_connect_anonymous() {
        let config = Config::new(crate::client::Environment::Integration, AuthMode::Anonymous);
        let transport = connect(&config).unwrap();
        let url = transport.url("restapi/campaigns/get/Run3").unwrap();
        assert_eq!(url.as_str(), "http://cms-pdmv-int.cern.ch/mcm/restapi/campaigns/get/Run3");
    }

    #[test]
    fn test_connect_cookie_with_missing_jar_is_fatal() {
        let dir = tempdir().unwrap();
        let config = Config::default()
            .with_cookie_path(dir.path().join("no-such-cookie.txt"))
            .with_cookie_helper("true");
        let err = connect(&config).err().expect("connect should fail");
        assert!(matches!(err, McmError::CredentialUnavailable { .. }));
        assert!(err.is_fatal());
    }
}
