use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use blob_core::{ClientError, StoreError, StoreResult};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, Url};
use tracing::debug;

use crate::client::{AzureClient, AzureConnector};
use crate::credential::{DefaultTokenCredential, TokenCredential};

/// Blob service REST API version sent with every request.
pub const API_VERSION: &str = "2021-08-06";

const ERROR_CODE_HEADER: &str = "x-ms-error-code";

/// Connects to `https://{account}.blob.core.windows.net`, asking the
/// credential for a token on every connect.
#[derive(Clone)]
pub struct RestConnector {
    credential: Arc<dyn TokenCredential>,
    endpoint_suffix: String,
}

impl RestConnector {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credential,
            endpoint_suffix: "blob.core.windows.net".to_owned(),
        }
    }

    /// Use a different DNS suffix, e.g. for sovereign clouds.
    pub fn with_endpoint_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.endpoint_suffix = suffix.into();
        self
    }
}

impl Default for RestConnector {
    fn default() -> Self {
        Self::new(DefaultTokenCredential::shared())
    }
}

impl AzureConnector for RestConnector {
    fn connect(&self, storage_account: &str) -> StoreResult<Arc<dyn AzureClient>> {
        let endpoint = format!("https://{storage_account}.{}/", self.endpoint_suffix);
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| StoreError::Validation(format!("bad account endpoint {endpoint}: {e}")))?;
        let token = self.credential.get_token()?;
        Ok(Arc::new(RestClient::new(endpoint, token.secret)?))
    }
}

impl fmt::Debug for RestConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConnector")
            .field("endpoint_suffix", &self.endpoint_suffix)
            .finish()
    }
}

/// Blocking client for one storage account's blob endpoint.
pub struct RestClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl RestClient {
    pub fn new(endpoint: Url, token: impl Into<String>) -> StoreResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            token: token.into(),
        })
    }

    /// `{endpoint}/{container}/{name}`, with each segment percent-encoded.
    pub fn blob_url(&self, container: &str, name: &str) -> Result<Url, ClientError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Transport(format!("{} cannot be a base URL", self.endpoint)))?
            .pop_if_empty()
            .push(container)
            .extend(name.split('/'));
        Ok(url)
    }

    fn send(
        &self,
        method: Method,
        container: &str,
        name: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ClientError> {
        let url = self.blob_url(container, name)?;
        debug!(%method, %url, "azure blob request");
        let request = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            );
        let response = build(request).send().map_err(transport)?;
        check(response)
    }
}

impl AzureClient for RestClient {
    fn get_properties(&self, container: &str, name: &str) -> Result<(), ClientError> {
        self.send(Method::HEAD, container, name, |r| r).map(|_| ())
    }

    fn download_to(&self, container: &str, name: &str, dest: &Path) -> Result<u64, ClientError> {
        let mut response = self.send(Method::GET, container, name, |r| r)?;
        let mut file = File::create(dest)?;
        let bytes = response.copy_to(&mut file).map_err(transport)?;
        file.sync_all()?;
        Ok(bytes)
    }

    fn upload_from(&self, container: &str, name: &str, src: &Path) -> Result<u64, ClientError> {
        let file = File::open(src)?;
        let len = file.metadata()?.len();
        self.send(Method::PUT, container, name, |r| {
            r.header("x-ms-blob-type", "BlockBlob")
                .header(CONTENT_LENGTH, len)
                .body(file)
        })?;
        Ok(len)
    }

    fn delete_blob(&self, container: &str, name: &str) -> Result<(), ClientError> {
        self.send(Method::DELETE, container, name, |r| r).map(|_| ())
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

/// Pass successful responses through; turn the rest into error responses
/// keyed by the service's `x-ms-error-code` header.
fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Err(ClientError::Response {
        status: Some(status.as_u16()),
        code,
        message: status.canonical_reason().unwrap_or("unknown status").to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AccessToken, StaticTokenCredential};

    fn client() -> RestClient {
        RestClient::new(
            Url::parse("https://acct.blob.core.windows.net/").unwrap(),
            "s3cr3t",
        )
        .unwrap()
    }

    #[test]
    fn blob_urls_encode_each_segment() {
        let url = client().blob_url("data", "runs/7/out file.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://acct.blob.core.windows.net/data/runs/7/out%20file.json"
        );
    }

    struct NoToken;

    impl TokenCredential for NoToken {
        fn get_token(&self) -> StoreResult<AccessToken> {
            Err(StoreError::Transport("no identity available".into()))
        }
    }

    #[test]
    fn connect_fails_when_no_token_is_available() {
        let err = RestConnector::new(Arc::new(NoToken)).connect("acct").err().expect("connect should fail");
        assert!(matches!(err, StoreError::Transport(msg) if msg.contains("no identity")));
    }

    #[test]
    fn connect_uses_the_given_credential() {
        let connector = RestConnector::new(Arc::new(StaticTokenCredential::new("tkn")));
        assert!(connector.connect("acct").is_ok());
        assert!(connector.connect("bad host name").is_err());
    }

    #[test]
    fn debug_output_hides_the_token() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("acct.blob.core.windows.net"));
    }
}
