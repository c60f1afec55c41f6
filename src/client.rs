use reqwest::blocking::ClientBuilder;
use std::fmt;
use std::path::PathBuf;

/// Path prefix of the McM application on every host
pub const APPLICATION_PATH: &str = "/mcm/";

/// Environment variable naming the X.509 proxy used in certificate mode
pub const PROXY_ENV_VAR: &str = "X509_USER_PROXY";

/// System certificate-authority directory trusted in cookie mode
pub const CA_DIRECTORY: &str = "/etc/pki/tls/certs";

/// External command that writes an SSO cookie jar
pub const COOKIE_HELPER: &str = "cern-get-sso-cookie";

/// Create the base HTTP client builder shared by every transport.
///
/// No timeouts or pool limits are set; calls rely on reqwest's defaults.
pub fn create_client_builder() -> ClientBuilder {
    ClientBuilder::new().user_agent(concat!("mcm-rest/", env!("CARGO_PKG_VERSION")))
}

/// Target deployment of the McM service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Integration,
    Production,
}

impl Environment {
    /// Host serving this environment
    pub fn host(&self) -> &'static str {
        match self {
            Environment::Development => "cms-pdmv-dev.cern.ch",
            Environment::Integration => "cms-pdmv-int.cern.ch",
            Environment::Production => "cms-pdmv.cern.ch",
        }
    }

    /// File name of the SSO cookie jar kept under `~/private`.
    ///
    /// Integration shares the production jar.
    pub fn cookie_file_name(&self) -> &'static str {
        match self {
            Environment::Development => "dev-cookie.txt",
            Environment::Integration | Environment::Production => "prod-cookie.txt",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Integration => "integration",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

/// How requests are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// X.509 proxy used as client certificate and key
    Certificate,
    /// SSO session cookie read from a Netscape cookie jar
    #[default]
    Cookie,
    /// Plain HTTP, no credentials
    Anonymous,
}

/// Configuration for the McM client
#[derive(Debug, Clone)]
pub struct Config {
    /// Target environment, selects the host
    pub environment: Environment,
    /// Authentication transport
    pub auth: AuthMode,
    /// Cookie jar location, overrides the `~/private` convention
    pub cookie_path: Option<PathBuf>,
    /// Program run to create a missing cookie jar
    pub cookie_helper: String,
    /// Log every request at INFO instead of TRACE
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config::new(Environment::default(), AuthMode::default())
    }
}

impl Config {
    /// Create a new configuration for the given environment and authentication mode
    pub fn new(environment: Environment, auth: AuthMode) -> Self {
        Config {
            environment,
            auth,
            cookie_path: None,
            cookie_helper: COOKIE_HELPER.to_string(),
            debug: false,
        }
    }

    /// Use an explicit cookie jar file
    pub fn with_cookie_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    /// Use another program than `cern-get-sso-cookie` to create the jar
    pub fn with_cookie_helper(mut self, program: impl Into<String>) -> Self {
        self.cookie_helper = program.into();
        self
    }

    /// Set debug mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// URL scheme for the configured authentication mode
    pub fn scheme(&self) -> &'static str {
        match self.auth {
            AuthMode::Anonymous => "http",
            AuthMode::Certificate | AuthMode::Cookie => "https",
        }
    }

    /// Get the base URL every request path is joined onto
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}{}",
            self.scheme(),
            self.environment.host(),
            APPLICATION_PATH
        )
    }
}
