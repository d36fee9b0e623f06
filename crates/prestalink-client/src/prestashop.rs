use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use prestalink_core::config::HttpConfig;
use prestalink_core::error::AppError;
use prestalink_core::models::{RemoteId, RemoteRecord};
use prestalink_core::ports::RecordAdapter;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::debug;
use url::Url;

/// Content type assumed when the shop omits the header.
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// HTTP client for the PrestaShop webservice of one shop.
///
/// The webservice key is sent as the basic-auth user with an empty password.
///
/// # Examples
///
/// ```no_run
/// use prestalink_client::PrestashopClient;
/// use prestalink_core::models::RemoteId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PrestashopClient::new("https://shop.example.com", "WSKEY")?;
/// let image = client.read_image(RemoteId(10), RemoteId(42)).await?;
/// println!("{:?}", image.get("type"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PrestashopClient {
    client: Client,
    base_url: Url,
    api_key: String,
    http: HttpConfig,
}

impl PrestashopClient {
    /// Creates a client with the default [`HttpConfig`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidBackendUrl` if the location is not an http(s) URL.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(location: &str, api_key: &str) -> Result<Self, AppError> {
        Self::with_config(location, api_key, HttpConfig::default())
    }

    pub fn with_config(location: &str, api_key: &str, http: HttpConfig) -> Result<Self, AppError> {
        let mut base_url = Url::parse(location)
            .map_err(|_| AppError::InvalidBackendUrl(location.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::InvalidBackendUrl(location.to_string()));
        }
        // Url::join drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent("Prestalink/0.1 (erp-connector)")
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            http,
        })
    }

    /// Shop location without trailing slash.
    pub fn location(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Downloads one image of a product and returns it as a remote record.
    ///
    /// The record carries `id_image`, `id_product`, `type` (the response
    /// content type), `content` (base64 of the body) and `full_public_url`.
    pub async fn read_image(
        &self,
        product_id: RemoteId,
        image_id: RemoteId,
    ) -> Result<RemoteRecord, AppError> {
        let url = self
            .base_url
            .join(&format!("api/images/products/{}/{}", product_id, image_id))
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        let resp = self.request_with_retry(&url).await?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let body = resp
            .bytes()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;
        if body.is_empty() {
            return Err(AppError::EmptyResponse);
        }
        debug!(
            "Fetched image {} of product {} ({} bytes, {})",
            image_id,
            product_id,
            body.len(),
            content_type
        );

        Ok(self.image_record(product_id, image_id, &content_type, &body))
    }

    fn image_record(
        &self,
        product_id: RemoteId,
        image_id: RemoteId,
        content_type: &str,
        body: &[u8],
    ) -> RemoteRecord {
        RemoteRecord::new()
            .with("id_image", image_id.0)
            .with("id_product", product_id.0)
            .with("type", content_type)
            .with("content", STANDARD.encode(body))
            .with("full_public_url", public_image_url(self.location(), image_id))
    }

    /// GET with retries on transient failures.
    ///
    /// Rate limiting (429) backs off exponentially. Server errors (5xx),
    /// timeouts and connection failures back off linearly.
    async fn request_with_retry(&self, url: &Url) -> Result<reqwest::Response, AppError> {
        let max_retries = self.http.max_retries.max(1);
        let base_delay = self.http.retry_base_delay;
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=max_retries {
            let request = self
                .client
                .get(url.clone())
                .basic_auth(&self.api_key, None::<&str>);

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = AppError::RateLimitExceeded;
                        if attempt < max_retries {
                            sleep(base_delay * 2_u32.pow(attempt)).await;
                            continue;
                        }
                    }

                    if status.is_server_error() {
                        last_error = AppError::ClientError(format!(
                            "Server error: HTTP {}",
                            status.as_u16()
                        ));
                        if attempt < max_retries {
                            sleep(base_delay * attempt).await;
                            continue;
                        }
                    }

                    // 4xx other than 429
                    if !status.is_server_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        return Err(AppError::ClientError(format!(
                            "HTTP {} from {}",
                            status.as_u16(),
                            url
                        )));
                    }
                }
                Err(e) => {
                    last_error = send_error(&e, self.http.timeout.as_secs());
                    if attempt < max_retries && last_error.is_retryable() {
                        sleep(base_delay * attempt).await;
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_error)
    }
}

/// Classifies a failed send: only timeouts and connection failures are retried.
fn send_error(e: &reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {}", e))
    } else {
        AppError::ClientError(e.to_string())
    }
}

/// Public URL PrestaShop serves an image from: every digit of the id
/// becomes a directory, `42` lives at `img/p/4/2/42.jpg`.
pub fn public_image_url(location: &str, image_id: RemoteId) -> String {
    let id = image_id.0.to_string();
    let dirs: Vec<String> = id.chars().map(String::from).collect();
    format!(
        "{}/img/p/{}/{}.jpg",
        location.trim_end_matches('/'),
        dirs.join("/"),
        id
    )
}

/// Reads product images, keyed by (product id, image id).
pub struct ProductImageAdapter<'a> {
    client: &'a PrestashopClient,
}

impl<'a> ProductImageAdapter<'a> {
    pub fn new(client: &'a PrestashopClient) -> Self {
        Self { client }
    }
}

impl RecordAdapter for ProductImageAdapter<'_> {
    async fn read(&self, parent_id: RemoteId, entity_id: RemoteId) -> Result<RemoteRecord, AppError> {
        self.client.read_image(parent_id, entity_id).await
    }
}
