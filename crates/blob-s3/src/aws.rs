use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use blob_core::{ClientError, StoreResult};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::client::{S3Client, S3Connector};

/// Connects to S3 through the AWS SDK, using the SDK's default credential
/// chain.
///
/// Clients are built once per region and shared for the life of the
/// process; the SDK refreshes credentials itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct AwsConnector;

static CLIENTS: OnceLock<Mutex<HashMap<String, Arc<AwsS3Client>>>> = OnceLock::new();

impl S3Connector for AwsConnector {
    fn connect(&self, region: &str) -> StoreResult<Arc<dyn S3Client>> {
        let mut clients = CLIENTS
            .get_or_init(Default::default)
            .lock()
            .expect("lock poisoned");
        if let Some(client) = clients.get(region) {
            return Ok(Arc::clone(client) as Arc<dyn S3Client>);
        }
        debug!(region, "building s3 client");
        let client = Arc::new(AwsS3Client::new(region)?);
        clients.insert(region.to_owned(), Arc::clone(&client));
        Ok(client)
    }
}

/// Blocking S3 client over `aws-sdk-s3`.
///
/// Owns a single-worker tokio runtime and blocks on each request, so it
/// must not be used from inside another async runtime. Any number of
/// threads may block on it at once.
pub struct AwsS3Client {
    runtime: Runtime,
    client: aws_sdk_s3::Client,
}

impl AwsS3Client {
    pub fn new(region: &str) -> StoreResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("blob-s3")
            .enable_all()
            .build()?;
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_owned()))
                .load(),
        );
        Ok(Self {
            runtime,
            client: aws_sdk_s3::Client::new(&config),
        })
    }
}

impl S3Client for AwsS3Client {
    fn head_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.runtime
            .block_on(self.client.head_object().bucket(bucket).key(key).send())
            .map(|_| ())
            .map_err(sdk_error)
    }

    fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, ClientError> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(sdk_error)?;
            let data = output
                .body
                .collect()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?
                .into_bytes();
            tokio::fs::write(dest, &data).await?;
            Ok::<_, ClientError>(data.len() as u64)
        })
    }

    fn upload_from(&self, bucket: &str, key: &str, src: &Path) -> Result<u64, ClientError> {
        self.runtime.block_on(async {
            let len = tokio::fs::metadata(src).await?.len();
            let body = ByteStream::from_path(src)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(sdk_error)?;
            Ok::<_, ClientError>(len)
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ClientError> {
        self.runtime
            .block_on(self.client.delete_object().bucket(bucket).key(key).send())
            .map(|_| ())
            .map_err(sdk_error)
    }
}

impl fmt::Debug for AwsS3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsS3Client")
            .field("region", &self.client.config().region())
            .finish()
    }
}

/// Map an SDK error onto [`ClientError`].
///
/// Service responses keep their error code. A response the SDK could not
/// parse has no code, so it classifies as a contract violation. Everything
/// else never reached the service and is a transport failure.
fn sdk_error<E>(err: SdkError<E, HttpResponse>) -> ClientError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(service) => ClientError::Response {
            status: Some(service.raw().status().as_u16()),
            code: service.err().code().map(str::to_owned),
            message: service
                .err()
                .message()
                .map(str::to_owned)
                .unwrap_or_else(|| DisplayErrorContext(service.err()).to_string()),
        },
        SdkError::ResponseError(response) => ClientError::Response {
            status: Some(response.raw().status().as_u16()),
            code: None,
            message: DisplayErrorContext(&err).to_string(),
        },
        _ => ClientError::Transport(DisplayErrorContext(&err).to_string()),
    }
}
