//! Inbound request handling: long durable link parsing, field validation and
//! request preparation, plus rendering of the long link on the way out.

use std::collections::HashMap;

use tracing::debug;
use url::{form_urlencoded, Url};

use crate::normalize::LinkValidator;
use crate::params_hash::{canonical_fields, CANONICAL_KEYS};
use crate::urls;
use crate::{
    CoreError, CreateDurableLinkRequest, CreateInput, DurableLink, LinkParameters, Suffix,
    ValidationError, ValidationErrors,
};

/// Parse a long durable link (`https://host/?link=...&apn=...`) into a create
/// request. Empty query values are treated as absent; `path` carries the
/// suffix option.
pub fn parse_long_durable_link(raw: &str) -> Result<CreateDurableLinkRequest, CoreError> {
    debug!(long_link = %raw, "parsing long durable link");
    let u = Url::parse(raw).map_err(|e| CoreError::InvalidUrlFormat(e.to_string()))?;
    let host = urls::hostname(&u)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CoreError::InvalidHost(format!("no host in '{}'", raw)))?;

    // first occurrence wins
    let mut query: HashMap<String, String> = HashMap::new();
    for (k, v) in u.query_pairs() {
        query.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    let mut take = |key: &str| query.remove(key).filter(|v| !v.is_empty());

    let ios_app_store_id = take("isi")
        .map(|v| v.parse::<u64>())
        .transpose()
        .map_err(|_| CoreError::InvalidAppStoreId)?;

    let mut params = LinkParameters::default();
    let android = &mut params.android_parameters;
    android.android_package_name = take("apn");
    android.android_fallback_link = take("afl");
    android.android_min_package_version_code = take("amv");

    let ios = &mut params.ios_parameters;
    ios.ios_app_store_id = ios_app_store_id;
    ios.ios_fallback_link = take("ifl");
    ios.ios_ipad_fallback_link = take("ipfl");

    params.other_platform_parameters.fallback_url = take("ofl");

    let utm = &mut params.analytics_info.marketing_parameters;
    utm.utm_source = take("utm_source");
    utm.utm_medium = take("utm_medium");
    utm.utm_campaign = take("utm_campaign");
    utm.utm_term = take("utm_term");
    utm.utm_content = take("utm_content");

    let itunes = &mut params.analytics_info.itunes_connect_analytics;
    itunes.at = take("at");
    itunes.ct = take("ct");
    itunes.mt = take("mt");
    itunes.pt = take("pt");

    let social = &mut params.social_meta_tag_info;
    social.social_title = take("st");
    social.social_description = take("sd");
    social.social_image_link = take("si");

    let link = take("link").unwrap_or_default();
    let option = take("path").unwrap_or_default();
    debug!(host = %host, link = %link, "parsed long durable link");

    Ok(CreateDurableLinkRequest {
        durable_link_info: DurableLink { host, link, params },
        suffix: Suffix { option },
    })
}

/// Form-urlencoded query of a durable link: `link` first, then every present
/// parameter in canonical key order.
pub fn long_link_query(link: &DurableLink) -> String {
    let mut ser = form_urlencoded::Serializer::new(String::new());
    ser.append_pair("link", &link.link);
    for (key, value) in CANONICAL_KEYS.iter().zip(canonical_fields(&link.params)) {
        if let Some(value) = value {
            ser.append_pair(key, &value);
        }
    }
    ser.finish()
}

/// `{scheme}://{host}/{path}?{query}`
pub fn build_long_link(scheme: &str, host: &str, path: &str, link: &DurableLink) -> String {
    format!("{}://{}/{}?{}", scheme, host, path, long_link_query(link))
}

impl ValidationError {
    pub fn new(field: &str, tag: &str) -> Self {
        let message = match tag {
            "required" => format!("Field '{}' is required", field),
            "url" => format!("Field '{}' must be a valid URL", field),
            "url_scheme" => format!("Field '{}' has an invalid URL scheme", field),
            other => format!("Field '{}' failed validation on '{}' tag", field, other),
        };
        Self {
            field: field.to_string(),
            tag: tag.to_string(),
            message,
        }
    }
}

impl LinkValidator {
    /// Field-level validation of a structured request. Collects every
    /// failure rather than stopping at the first.
    pub fn validate_request(&self, request: &CreateDurableLinkRequest) -> Result<(), ValidationErrors> {
        let info = &request.durable_link_info;
        let mut errors = Vec::new();

        if info.host.trim().is_empty() {
            errors.push(ValidationError::new("durableLinkInfo.host", "required"));
        }

        if info.link.is_empty() {
            errors.push(ValidationError::new("durableLinkInfo.link", "required"));
        } else {
            match self.check_scheme(&info.link) {
                Ok(()) if urls::is_well_formed_url(&info.link) => {}
                Ok(()) | Err(CoreError::InvalidUrlFormat(_)) => {
                    errors.push(ValidationError::new("durableLinkInfo.link", "url"))
                }
                Err(_) => errors.push(ValidationError::new("durableLinkInfo.link", "url_scheme")),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            debug!(errors = errors.len(), "request failed validation");
            Err(ValidationErrors { errors })
        }
    }

    /// Turn a create body into a request: a non-empty long durable link wins
    /// over the structured form. The result must carry a host and a link with
    /// an accepted scheme.
    pub fn prepare(&self, input: CreateInput) -> Result<CreateDurableLinkRequest, CoreError> {
        let request = match input.long_durable_link.as_deref().filter(|s| !s.is_empty()) {
            Some(long) => parse_long_durable_link(long)?,
            None => input.request,
        };

        if request.durable_link_info.host.trim().is_empty() {
            return Err(CoreError::MissingHost);
        }
        if request.durable_link_info.link.is_empty() {
            return Err(CoreError::MissingLink);
        }
        self.check_scheme(&request.durable_link_info.link)?;
        Ok(request)
    }
}
