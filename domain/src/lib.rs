//! Domain library for the durable links service.
//!
//! Holds the durable link types, the storage port, and the error taxonomy.
//! Normalization, parameter hashing and short-path resolution live in the
//! submodules. Keep adapters and IO concerns out of this crate.

use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of the tenant owning a link namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| CoreError::InvalidTenantId(e.to_string()))
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AndroidParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_fallback_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_min_package_version_code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IosParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ios_fallback_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ios_ipad_fallback_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ios_app_store_id: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OtherPlatformParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialMetaTagInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_image_link: Option<String>,
}

/// UTM campaign parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketingParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

/// iTunes Connect analytics tokens. `pt` is the provider token; `at`, `ct`
/// and `mt` only make sense alongside it and an App Store ID.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItunesConnectAnalytics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pt: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsInfo {
    pub marketing_parameters: MarketingParameters,
    pub itunes_connect_analytics: ItunesConnectAnalytics,
}

/// Every optional parameter of a durable link. This group, and nothing else,
/// feeds the params hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkParameters {
    pub android_parameters: AndroidParameters,
    pub ios_parameters: IosParameters,
    pub other_platform_parameters: OtherPlatformParameters,
    pub social_meta_tag_info: SocialMetaTagInfo,
    pub analytics_info: AnalyticsInfo,
}

/// A described target link plus its platform and analytics metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableLink {
    /// Short link domain the path is issued under.
    pub host: String,
    /// Target link the durable link points at.
    pub link: String,
    #[serde(flatten)]
    pub params: LinkParameters,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suffix {
    pub option: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateDurableLinkRequest {
    pub durable_link_info: DurableLink,
    pub suffix: Suffix,
}

/// Body accepted by the create endpoint: either a long durable link to be
/// parsed, or the structured request itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateInput {
    pub long_durable_link: Option<String>,
    #[serde(flatten)]
    pub request: CreateDurableLinkRequest,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExchangeShortLinkRequest {
    pub requested_link: String,
}

/// How the path of a new durable link is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuffixOption {
    /// Short, reusable path.
    Short,
    /// Long, high-entropy path; never reused.
    Unguessable,
}

impl SuffixOption {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SHORT" => Some(SuffixOption::Short),
            "UNGUESSABLE" => Some(SuffixOption::Unguessable),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    DefaultApplied,
    MalformedParam,
    UnrecognizedParam,
    InvalidSuffixOption,
}

/// Non-fatal finding reported back to the caller alongside the short link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub warning_code: WarningCode,
    pub warning_message: String,
}

impl Warning {
    pub fn new<S: Into<String>>(code: WarningCode, message: S) -> Self {
        Self {
            warning_code: code,
            warning_message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortLinkResponse {
    pub short_link: String,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongLinkResponse {
    pub long_link: String,
}

/// Per-tenant settings the engine is driven by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantConfig {
    /// Scheme used when rendering short and long links.
    pub url_scheme: String,
    /// Hosts a target link may point at.
    pub domain_allow_list: Vec<String>,
    pub short_path_length: usize,
    pub unguessable_path_length: usize,
    pub default_ios_app_store_id: Option<u64>,
    pub default_android_package: Option<String>,
}

/// Persisted durable link row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredLink {
    /// Assigned by the store on insert.
    pub id: Option<u64>,
    pub host: String,
    pub path: String,
    pub link: String,
    pub is_unguessable_path: bool,
    pub tenant_id: Option<TenantId>,
    pub params: LinkParameters,
    pub params_hash: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl StoredLink {
    pub fn to_durable_link(&self) -> DurableLink {
        DurableLink {
            host: self.host.clone(),
            link: self.link.clone(),
            params: self.params.clone(),
        }
    }

    /// Recompute the params hash and compare it with the persisted one.
    pub fn has_valid_params_hash(&self) -> bool {
        params_hash::compute_params_hash(&self.params) == self.params_hash
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Source of path codes for new durable links.
pub trait PathGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Storage gateway port for durable links.
pub trait LinkStore: Send + Sync {
    /// Find a link by host and path. Without a tenant the lookup is not
    /// tenant-filtered.
    fn lookup_by_host_and_path(
        &self,
        host: &str,
        path: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<StoredLink>, StoreError>;

    /// Path of an existing guessable link with the same dedup key. Tenant
    /// matching is exact, so `None` only matches rows without a tenant.
    fn find_reusable_short_link(
        &self,
        host: &str,
        link: &str,
        params_hash: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<String>, StoreError>;

    /// Persist a new link, returning it with its assigned id. Uniqueness
    /// violations are reported as [`StoreError::Conflict`].
    fn insert(&self, link: StoredLink) -> Result<StoredLink, StoreError>;
}

/// Failure reported by a [`LinkStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("{0}")]
    Backend(String),
}

/// A single field validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// JSON path of the field, e.g. `durableLinkInfo.link`.
    pub field: String,
    pub tag: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.errors.first() {
            Some(first) => f.write_str(&first.message),
            None => f.write_str("validation failed"),
        }
    }
}

impl std::error::Error for ValidationErrors {}

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("host is required")]
    MissingHost,
    #[error("link is required")]
    MissingLink,
    #[error("invalid host: {0}")]
    InvalidHost(String),
    #[error("domain link not in allow list")]
    DomainNotAllowed,
    #[error("invalid URL format: {0}")]
    InvalidUrlFormat(String),
    #[error("link has invalid scheme '{0}', must be one of [http https]")]
    InvalidScheme(String),
    #[error("iOS App Store ID must be an unsigned integer")]
    InvalidAppStoreId,
    #[error("invalid tenant id: {0}")]
    InvalidTenantId(String),
    #[error("path must contain exactly one segment")]
    InvalidPathFormat,
    #[error("invalid requested link")]
    InvalidRequestedLink,
    #[error("link not found")]
    LinkNotFound,
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("failed to {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl CoreError {
    pub(crate) fn storage(operation: &'static str, source: StoreError) -> Self {
        CoreError::Storage { operation, source }
    }
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} (durable links core)", pkg, ver)
}

pub mod adapters;
pub mod normalize;
pub mod params_hash;
pub mod path;
pub mod request;
pub mod service;
pub mod urls;
