// # Cloudflare DNS Provider
//
// This crate provides a Cloudflare DNS provider for the ecssd agent.
//
// ## Record Mapping
//
// Each service instance is one SRV record in the configured zone:
//
// - `name`: the service record name; SRV names need the RFC 2782 form
//   ("_web._tcp.servicediscovery.internal"), which the daemon configures by
//   default for this provider
// - `data`: priority, weight, port and target parsed from the SRV value
// - `comment`: the set identifier (instance id), which lets several
//   instances of one service share a name
// - `ttl`: the configured TTL, where 0 maps to Cloudflare's "automatic" (1)
//
// ## Architectural Constraints
//
// - One HTTP request per trait call (one per page when listing); retries and
//   backoff are owned by the core
// - Full error propagation, HTTP status codes mapped to specific messages
// - No background tasks and no caching
//
// ## Security Requirements
//
// - API token NEVER appears in logs
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=SRV&name=...&page=N`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ecssd_core::config::ProviderConfig;
use ecssd_core::traits::{DnsProvider, DnsProviderFactory, RecordSet, RecordType};
use ecssd_core::{Error, ProviderRegistry, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page the list endpoint returns
const LIST_PAGE_SIZE: u32 = 100;

/// Cloudflare's "automatic" TTL
const AUTOMATIC_TTL: u32 = 1;

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform list requests
/// - Log the intended create and delete payloads
/// - **NOT** actually modify DNS records
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone holding the service records
    zone_id: String,

    /// API base URL
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, list records but skip mutations
    dry_run: bool,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// SRV payload of a Cloudflare DNS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SrvData {
    priority: u16,
    weight: u32,
    port: u16,
    target: String,
}

impl SrvData {
    /// Parse an SRV value ("priority weight port target.")
    fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::invalid_input(format!("Invalid SRV value: '{}'", value));
        let mut fields = value.split_whitespace();
        let mut next = || fields.next().ok_or_else(invalid);

        let priority = next()?.parse().map_err(|_| invalid())?;
        let weight = next()?.parse().map_err(|_| invalid())?;
        let port = next()?.parse().map_err(|_| invalid())?;
        let target = next()?.trim_end_matches('.').to_string();
        if fields.next().is_some() || target.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            priority,
            weight,
            port,
            target,
        })
    }

    /// Render as an SRV value with a fully qualified target
    fn value(&self) -> String {
        format!(
            "{} {} {} {}.",
            self.priority,
            self.weight,
            self.port,
            self.target.trim_end_matches('.')
        )
    }
}

/// Request body of record creation
#[derive(Debug, Serialize)]
struct CreateRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    ttl: u32,
    data: SrvData,
    comment: &'a str,
}

/// A DNS record as returned by the API
#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    comment: Option<String>,
    data: Option<SrvData>,
}

impl ApiRecord {
    fn into_record_set(self) -> Option<RecordSet> {
        let data = self.data?;
        Some(RecordSet {
            name: self.name,
            record_type: RecordType::Srv,
            value: data.value(),
            set_identifier: self.comment.unwrap_or_default(),
            ttl: if self.ttl == AUTOMATIC_TTL { 0 } else { self.ttl },
            weight: data.weight,
            id: Some(self.id),
        })
    }
}

/// Envelope of every API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

impl<T> ApiResponse<T> {
    /// Page to request after `page`, if the listing continues
    fn next_page(&self, page: u32) -> Option<u32> {
        let info = self.result_info.as_ref()?;
        (page < info.total_pages).then_some(page + 1)
    }
}

/// Pagination of list responses
#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: Zone holding the service records
    /// - `dry_run`: If true, list records but skip mutations
    ///
    /// # Errors
    ///
    /// Fails if the token or zone is empty, or the HTTP client cannot be built.
    pub fn new(api_token: impl Into<String>, zone_id: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        let zone_id = zone_id.into();
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare zone ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn mode(&self) -> &'static str {
        if self.dry_run { "DRY-RUN" } else { "LIVE" }
    }

    /// Decode a response, mapping HTTP and API failures to errors
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<ApiResponse<T>> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, context, &error_text));
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("Failed to parse response: {}", e)))?;

        if !body.success {
            let messages: Vec<String> = body
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect();
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", context, messages.join("; ")),
            ));
        }
        Ok(body)
    }
}

/// Map an unsuccessful HTTP status to an error
fn status_error(status: StatusCode, context: &str, error_text: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            "cloudflare",
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("{}: {}", context, error_text)),
        409 => Error::provider(
            "cloudflare",
            format!("Conflict: Record is being updated by another process. Status: {}", status),
        ),
        429 => Error::provider(
            "cloudflare",
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", context, status, error_text),
        ),
    }
}

/// SRV record sets with an identifier at or after `start_identifier`, in order
fn select_records(records: Vec<ApiRecord>, start_identifier: &str) -> Vec<RecordSet> {
    let mut records: Vec<RecordSet> = records
        .into_iter()
        .filter_map(ApiRecord::into_record_set)
        .filter(|record| record.set_identifier.as_str() >= start_identifier)
        .collect();
    records.sort_by(|a, b| a.set_identifier.cmp(&b.set_identifier));
    records
}

/// Cloudflare TTL for a configured TTL
fn cloudflare_ttl(ttl: u32) -> u32 {
    if ttl == 0 { AUTOMATIC_TTL } else { ttl }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Create an SRV record
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {
    ///   "type": "SRV",
    ///   "name": "web.servicediscovery.internal",
    ///   "ttl": 1,
    ///   "data": {"priority": 1, "weight": 1, "port": 32768, "target": "ip-10-0-0-12.compute.internal"},
    ///   "comment": "4f2a9c1e7b3d"
    /// }
    /// ```
    async fn create_record(&self, record: &RecordSet) -> Result<()> {
        let payload = CreateRecord {
            record_type: record.record_type.as_str(),
            name: record.name.trim_end_matches('.'),
            ttl: cloudflare_ttl(record.ttl),
            data: SrvData::parse(&record.value)?,
            comment: &record.set_identifier,
        };

        tracing::info!(
            record = %record.key(),
            value = %record.value,
            mode = self.mode(),
            "Creating Cloudflare DNS record"
        );

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                self.records_url(),
                serde_json::to_string(&payload)?
            );
            return Ok(());
        }

        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        Self::decode::<serde_json::Value>(response, "Create record").await?;
        Ok(())
    }

    /// List SRV records named `name`, starting at `start_identifier`
    ///
    /// Follows `result_info.total_pages` so that services with more than one
    /// page of instances are listed completely.
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=SRV&name=web.servicediscovery.internal&per_page=100&page=1
    /// ```
    async fn list_records(&self, name: &str, start_identifier: &str) -> Result<Vec<RecordSet>> {
        let name = name.trim_end_matches('.');
        tracing::debug!(record = name, start = start_identifier, "Listing Cloudflare DNS records");

        let mut listed = Vec::new();
        let mut page = 1;
        loop {
            let response = self
                .client
                .get(self.records_url())
                .bearer_auth(&self.api_token)
                .query(&[
                    ("type", RecordType::Srv.as_str().to_string()),
                    ("name", name.to_string()),
                    ("per_page", LIST_PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ])
                .send()
                .await
                .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

            let body: ApiResponse<Vec<ApiRecord>> = Self::decode(response, "List records").await?;
            let next = body.next_page(page);
            listed.extend(body.result.unwrap_or_default());
            match next {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(select_records(listed, start_identifier))
    }

    /// Delete a previously listed record
    ///
    /// # API Call
    ///
    /// ```http
    /// DELETE /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn delete_record(&self, record: &RecordSet) -> Result<()> {
        let id = record.id.as_deref().ok_or_else(|| {
            Error::invalid_input(format!("Record {} has no Cloudflare record ID", record.key()))
        })?;
        let url = format!("{}/{}", self.records_url(), id);

        tracing::info!(
            record = %record.key(),
            value = %record.value,
            mode = self.mode(),
            "Deleting Cloudflare DNS record"
        );

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", url);
            return Ok(());
        }

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        Self::decode::<serde_json::Value>(response, "Delete record").await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
                }
                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    zone_id.clone(),
                    *dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ecssd_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::with_builtin();
/// ecssd_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
