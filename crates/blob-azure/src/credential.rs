//! Bearer tokens for the storage scope.
//!
//! [`DefaultTokenCredential`] walks the usual sources of a machine identity
//! in order: a service principal from the environment, the managed identity
//! endpoint, then the Azure CLI's login. Whichever answers first wins, and
//! its token is cached until shortly before it expires.

use std::fmt;
use std::process::Command;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration as StdDuration;

use blob_core::{StoreError, StoreResult};
use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

/// OAuth resource for Azure Storage.
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

/// Implicit variable holding a pre-issued bearer token, read by
/// [`StaticTokenCredential::from_implicit`].
pub const ACCESS_TOKEN_VAR: &str = blob_implicit::prefixed!("AZURE_ACCESS_TOKEN");

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 300;

/// A bearer token and the instant it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Whether the token is still usable at `now`, with the refresh margin
    /// taken off its lifetime.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Supplies OAuth bearer tokens for the storage scope.
pub trait TokenCredential: Send + Sync {
    fn get_token(&self) -> StoreResult<AccessToken>;
}

/// A fixed token that never expires as far as the client can tell.
///
/// Useful for short jobs that are handed a token, e.g. from
/// `az account get-access-token --resource https://storage.azure.com/`.
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from [`ACCESS_TOKEN_VAR`].
    pub fn from_implicit() -> StoreResult<Self> {
        Ok(Self::new(blob_implicit::get(ACCESS_TOKEN_VAR)?))
    }
}

impl TokenCredential for StaticTokenCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        Ok(AccessToken::new(self.token.clone(), DateTime::<Utc>::MAX_UTC))
    }
}

impl fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenCredential").finish_non_exhaustive()
    }
}

/// Service principal client-secret flow, configured through the standard
/// `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET` variables.
#[derive(Debug, Default)]
pub struct EnvironmentCredential {
    authority: Option<String>,
}

impl EnvironmentCredential {
    /// Use a different login host than `https://login.microsoftonline.com`.
    pub fn with_authority(authority: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
        }
    }
}

impl TokenCredential for EnvironmentCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        let tenant = blob_implicit::get("AZURE_TENANT_ID")?;
        let client_id = blob_implicit::get("AZURE_CLIENT_ID")?;
        let secret = blob_implicit::get("AZURE_CLIENT_SECRET")?;
        let authority = self
            .authority
            .as_deref()
            .unwrap_or("https://login.microsoftonline.com");
        let url = format!("{}/{tenant}/oauth2/v2.0/token", authority.trim_end_matches('/'));
        let scope = format!("{STORAGE_RESOURCE}.default");
        let response = http_client()?
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .map_err(auth_error)?;
        parse_token_response(&read_success(response)?, Utc::now())
    }
}

/// The managed identity of the host: App Service / Functions when
/// `IDENTITY_ENDPOINT` is set, otherwise the VM instance metadata service.
#[derive(Debug, Default)]
pub struct ManagedIdentityCredential;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

impl TokenCredential for ManagedIdentityCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        let http = http_client()?;
        let request = match (
            blob_implicit::get_opt("IDENTITY_ENDPOINT")?,
            blob_implicit::get_opt("IDENTITY_HEADER")?,
        ) {
            (Some(endpoint), Some(header)) => http
                .get(endpoint)
                .query(&[("api-version", "2019-08-01"), ("resource", STORAGE_RESOURCE)])
                .header("X-IDENTITY-HEADER", header),
            _ => http
                .get(IMDS_ENDPOINT)
                .query(&[("api-version", "2018-02-01"), ("resource", STORAGE_RESOURCE)])
                .header("Metadata", "true"),
        };
        let response = request.send().map_err(auth_error)?;
        parse_token_response(&read_success(response)?, Utc::now())
    }
}

/// The signed-in Azure CLI user.
#[derive(Debug, Default)]
pub struct AzureCliCredential;

impl TokenCredential for AzureCliCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        let output = Command::new(program)
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(STORAGE_RESOURCE)
            .output()
            .map_err(|e| StoreError::Transport(format!("could not run {program}: {e}")))?;
        if !output.status.success() {
            return Err(StoreError::Transport(format!(
                "{program} account get-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_cli_output(&output.stdout)
    }
}

/// Tries each credential in order and returns the first token obtained.
pub struct ChainedTokenCredential {
    sources: Vec<(&'static str, Arc<dyn TokenCredential>)>,
}

impl ChainedTokenCredential {
    pub fn new(sources: Vec<(&'static str, Arc<dyn TokenCredential>)>) -> Self {
        Self { sources }
    }
}

impl TokenCredential for ChainedTokenCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        let mut failures = Vec::new();
        for (name, source) in &self.sources {
            match source.get_token() {
                Ok(token) => {
                    debug!(credential = *name, "acquired storage token");
                    return Ok(token);
                }
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }
        Err(StoreError::Transport(format!(
            "no credential produced a storage token ({})",
            failures.join("; ")
        )))
    }
}

impl fmt::Debug for ChainedTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.sources.iter().map(|(name, _)| *name).collect();
        f.debug_struct("ChainedTokenCredential")
            .field("sources", &names)
            .finish()
    }
}

/// Caches the token of an inner credential until it is close to expiry.
pub struct CachedTokenCredential {
    inner: Arc<dyn TokenCredential>,
    cached: Mutex<Option<AccessToken>>,
}

impl CachedTokenCredential {
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

impl TokenCredential for CachedTokenCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        let mut cached = self.cached.lock().expect("lock poisoned");
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.clone());
        }
        let token = self.inner.get_token()?;
        debug!(expires_at = %token.expires_at, "refreshed storage token");
        *cached = Some(token.clone());
        Ok(token)
    }
}

impl fmt::Debug for CachedTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTokenCredential").finish_non_exhaustive()
    }
}

/// The platform default chain, cached.
#[derive(Debug)]
pub struct DefaultTokenCredential {
    inner: CachedTokenCredential,
}

impl DefaultTokenCredential {
    pub fn new() -> Self {
        let chain = ChainedTokenCredential::new(vec![
            (
                "environment",
                Arc::new(EnvironmentCredential::default()) as Arc<dyn TokenCredential>,
            ),
            (
                "managed identity",
                Arc::new(ManagedIdentityCredential) as Arc<dyn TokenCredential>,
            ),
            (
                "azure cli",
                Arc::new(AzureCliCredential) as Arc<dyn TokenCredential>,
            ),
        ]);
        Self {
            inner: CachedTokenCredential::new(Arc::new(chain)),
        }
    }

    /// One instance per process, so every connection shares its cache.
    pub fn shared() -> Arc<dyn TokenCredential> {
        static SHARED: OnceLock<Arc<DefaultTokenCredential>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(Self::new())).clone()
    }
}

impl Default for DefaultTokenCredential {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCredential for DefaultTokenCredential {
    fn get_token(&self) -> StoreResult<AccessToken> {
        self.inner.get_token()
    }
}

fn http_client() -> StoreResult<Client> {
    Client::builder()
        .connect_timeout(StdDuration::from_secs(2))
        .timeout(StdDuration::from_secs(30))
        .build()
        .map_err(auth_error)
}

fn auth_error(err: reqwest::Error) -> StoreError {
    StoreError::Transport(format!("token request failed: {err}"))
}

fn read_success(response: reqwest::blocking::Response) -> StoreResult<String> {
    let status = response.status();
    let body = response.text().map_err(auth_error)?;
    if !status.is_success() {
        return Err(StoreError::Transport(format!(
            "token endpoint answered {status}: {body}"
        )));
    }
    Ok(body)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
}

/// Parse an OAuth token response. Identity endpoints disagree on whether
/// lifetimes are numbers or strings, and on `expires_in` vs `expires_on`.
fn parse_token_response(body: &str, now: DateTime<Utc>) -> StoreResult<AccessToken> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| StoreError::ContractViolation(format!("unreadable token response: {e}")))?;
    let expires_at = match (
        response.expires_on.as_ref().and_then(as_i64),
        response.expires_in.as_ref().and_then(as_i64),
    ) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
        (None, Some(secs)) => Some(now + Duration::seconds(secs)),
        (None, None) => None,
    }
    .ok_or_else(|| StoreError::ContractViolation("token response carries no expiry".into()))?;
    Ok(AccessToken::new(response.access_token, expires_at))
}

fn as_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expires_on", default)]
    expires_on: Option<i64>,
    #[serde(rename = "expiresOn", default)]
    expires_on_local: Option<String>,
}

/// Parse `az account get-access-token` output. Older CLI versions only
/// report `expiresOn` as a local timestamp.
fn parse_cli_output(stdout: &[u8]) -> StoreResult<AccessToken> {
    let token: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| StoreError::ContractViolation(format!("unreadable az output: {e}")))?;
    let expires_at = match (token.expires_on, token.expires_on_local.as_deref()) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| naive.and_local_timezone(Local).earliest())
            .map(|t| t.with_timezone(&Utc)),
        (None, None) => None,
    }
    .ok_or_else(|| StoreError::ContractViolation("az output carries no expiry".into()))?;
    Ok(AccessToken::new(token.access_token, expires_at))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting {
        calls: AtomicUsize,
        lifetime: Duration,
    }

    impl Counting {
        fn new(lifetime: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                lifetime,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenCredential for Counting {
        fn get_token(&self) -> StoreResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(format!("token-{n}"), Utc::now() + self.lifetime))
        }
    }

    struct Failing;

    impl TokenCredential for Failing {
        fn get_token(&self) -> StoreResult<AccessToken> {
            Err(StoreError::Transport("unavailable".into()))
        }
    }

    fn failing() -> Arc<dyn TokenCredential> {
        Arc::new(Failing)
    }

    #[test]
    fn cache_reuses_a_fresh_token() {
        let source = Counting::new(Duration::hours(1));
        let cached = CachedTokenCredential::new(source.clone());
        assert_eq!(cached.get_token().unwrap().secret, "token-0");
        assert_eq!(cached.get_token().unwrap().secret, "token-0");
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn cache_refreshes_a_token_about_to_expire() {
        let source = Counting::new(Duration::minutes(1));
        let cached = CachedTokenCredential::new(source.clone());
        assert_eq!(cached.get_token().unwrap().secret, "token-0");
        assert_eq!(cached.get_token().unwrap().secret, "token-1");
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn chain_returns_the_first_success() {
        let source = Counting::new(Duration::hours(1));
        let chain = ChainedTokenCredential::new(vec![
            ("first", failing()),
            ("second", source.clone() as Arc<dyn TokenCredential>),
            ("third", failing()),
        ]);
        assert_eq!(chain.get_token().unwrap().secret, "token-0");
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn chain_reports_every_failure() {
        let chain = ChainedTokenCredential::new(vec![
            ("first", failing()),
            ("second", failing()),
        ]);
        let err = chain.get_token().unwrap_err();
        assert!(matches!(&err, StoreError::Transport(msg) if msg.contains("first") && msg.contains("second")));
    }

    #[test]
    fn static_token_reads_the_implicit_variable() {
        assert!(StaticTokenCredential::from_implicit().is_err());
        let token = blob_implicit::with_vars([(ACCESS_TOKEN_VAR, "tkn")], || {
            StaticTokenCredential::from_implicit().unwrap().get_token().unwrap()
        });
        assert_eq!(token.secret, "tkn");
        assert!(token.is_fresh(Utc::now()));
    }

    #[test]
    fn environment_credential_needs_its_variables() {
        let err = blob_implicit::with_vars(
            [("AZURE_TENANT_ID", "t"), ("AZURE_CLIENT_ID", "c")],
            || EnvironmentCredential::default().get_token().unwrap_err(),
        );
        assert!(matches!(err, StoreError::Implicit(_)));
    }

    #[test]
    fn token_responses_with_relative_and_absolute_expiry() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let relative =
            parse_token_response(r#"{"access_token":"a","expires_in":3599}"#, now).unwrap();
        assert_eq!(relative.expires_at, now + Duration::seconds(3599));

        let absolute =
            parse_token_response(r#"{"access_token":"b","expires_on":"1700003600"}"#, now).unwrap();
        assert_eq!(absolute.expires_at.timestamp(), 1_700_003_600);

        assert!(matches!(
            parse_token_response(r#"{"access_token":"c"}"#, now),
            Err(StoreError::ContractViolation(_))
        ));
    }

    #[test]
    fn cli_output_prefers_the_epoch_expiry() {
        let token = parse_cli_output(
            br#"{"accessToken":"x","expiresOn":"2023-11-14 23:13:20.000000","expires_on":1700003600}"#,
        )
        .unwrap();
        assert_eq!(token.secret, "x");
        assert_eq!(token.expires_at.timestamp(), 1_700_003_600);

        let legacy =
            parse_cli_output(br#"{"accessToken":"y","expiresOn":"2023-11-14 23:13:20.000000"}"#)
                .unwrap();
        assert_eq!(legacy.secret, "y");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let token = AccessToken::new("s3cr3t", Utc::now());
        assert!(!format!("{token:?}").contains("s3cr3t"));
        assert!(!format!("{:?}", StaticTokenCredential::new("s3cr3t")).contains("s3cr3t"));
    }
}
