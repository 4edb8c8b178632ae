//! Link normalization: tenant defaults, advisory URL checks, cross-field
//! consistency and suffix resolution.
//!
//! Problems with optional fields never fail the request. They are reported as
//! [`Warning`]s, in step order, and a malformed URL is cleared rather than
//! persisted. Host and allow-list failures are fatal.

use tracing::{debug, warn};

use crate::urls;
use crate::{
    CoreError, CreateDurableLinkRequest, DurableLink, LinkParameters, SuffixOption, TenantConfig,
    Warning, WarningCode,
};

/// Result of normalizing a create request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedLink {
    /// Cleaned host the path will be issued under.
    pub host: String,
    pub link: DurableLink,
    pub wants_short_path: bool,
    pub warnings: Vec<Warning>,
}

/// Validation engine for durable link requests. Constructed explicitly and
/// handed to the service; holds the schemes a target link may use.
#[derive(Clone, Debug)]
pub struct LinkValidator {
    allowed_schemes: Vec<String>,
}

impl Default for LinkValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: vec!["http".into(), "https".into()],
        }
    }

    pub fn allowed_schemes(&self) -> &[String] {
        &self.allowed_schemes
    }

    /// Check the target link's scheme against this validator's schemes.
    pub fn check_scheme(&self, link: &str) -> Result<(), CoreError> {
        urls::validate_scheme_in(link, &self.allowed_schemes)
    }

    /// Normalize a create request against the tenant configuration.
    pub fn normalize(
        &self,
        request: CreateDurableLinkRequest,
        cfg: &TenantConfig,
    ) -> Result<NormalizedLink, CoreError> {
        let CreateDurableLinkRequest {
            durable_link_info: mut link,
            suffix,
        } = request;
        let mut warnings = Vec::new();

        let host = urls::clean_host(&link.host).map_err(|e| match e {
            CoreError::InvalidHost(_) => e,
            other => CoreError::InvalidHost(other.to_string()),
        })?;

        if !urls::is_domain_allowed(&cfg.domain_allow_list, &link.link) {
            warn!(link = %link.link, "domain link not in allow list");
            return Err(CoreError::DomainNotAllowed);
        }

        apply_defaults(&mut link.params, cfg, &mut warnings);
        clear_malformed_links(&mut link.params, &mut warnings);
        check_itunes_analytics(&link.params, &mut warnings);

        let wants_short_path = match SuffixOption::parse(&suffix.option) {
            Some(option) => option == SuffixOption::Short,
            None => {
                warnings.push(Warning::new(
                    WarningCode::InvalidSuffixOption,
                    format!(
                        "Param 'suffix.option' must be 'SHORT' or 'UNGUESSABLE'. Received '{}', defaulting to 'UNGUESSABLE'.",
                        suffix.option
                    ),
                ));
                false
            }
        };

        link.host = host.clone();
        debug!(
            host = %host,
            wants_short_path,
            warnings = warnings.len(),
            "normalized durable link"
        );
        Ok(NormalizedLink {
            host,
            link,
            wants_short_path,
            warnings,
        })
    }
}

fn apply_defaults(params: &mut LinkParameters, cfg: &TenantConfig, warnings: &mut Vec<Warning>) {
    let ios = &mut params.ios_parameters;
    if ios.ios_app_store_id.is_none() {
        if let Some(id) = cfg.default_ios_app_store_id {
            ios.ios_app_store_id = Some(id);
            warnings.push(Warning::new(
                WarningCode::DefaultApplied,
                format!("Using default iOS App Store ID: {}", id),
            ));
        }
    }

    let android = &mut params.android_parameters;
    if android.android_package_name.is_none() {
        if let Some(pkg) = &cfg.default_android_package {
            android.android_package_name = Some(pkg.clone());
            warnings.push(Warning::new(
                WarningCode::DefaultApplied,
                format!("Using default Android package name: {}", pkg),
            ));
        }
    }
}

fn clear_malformed_links(params: &mut LinkParameters, warnings: &mut Vec<Warning>) {
    let fields = [
        (
            "androidFallbackLink",
            &mut params.android_parameters.android_fallback_link,
        ),
        ("iosFallbackLink", &mut params.ios_parameters.ios_fallback_link),
        (
            "iosIpadFallbackLink",
            &mut params.ios_parameters.ios_ipad_fallback_link,
        ),
        (
            "fallbackUrl",
            &mut params.other_platform_parameters.fallback_url,
        ),
        (
            "socialImageLink",
            &mut params.social_meta_tag_info.social_image_link,
        ),
    ];
    for (name, field) in fields {
        let malformed = field
            .as_deref()
            .is_some_and(|v| !v.is_empty() && !urls::is_well_formed_url(v));
        if malformed {
            warnings.push(Warning::new(
                WarningCode::MalformedParam,
                format!("Param '{}' is not a valid URL", name),
            ));
            *field = None;
        }
    }
}

// Runs both checks; a token can be reported once for each missing parent.
fn check_itunes_analytics(params: &LinkParameters, warnings: &mut Vec<Warning>) {
    let itunes = &params.analytics_info.itunes_connect_analytics;

    if params.ios_parameters.ios_app_store_id.is_none() {
        for (name, value) in [
            ("at", &itunes.at),
            ("ct", &itunes.ct),
            ("mt", &itunes.mt),
            ("pt", &itunes.pt),
        ] {
            if is_present(value) {
                warnings.push(unrecognized(name, "isi"));
            }
        }
    }

    if !is_present(&itunes.pt) {
        for (name, value) in [("at", &itunes.at), ("ct", &itunes.ct), ("mt", &itunes.mt)] {
            if is_present(value) {
                warnings.push(unrecognized(name, "pt"));
            }
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn unrecognized(param: &str, missing: &str) -> Warning {
    Warning::new(
        WarningCode::UnrecognizedParam,
        format!(
            "Param '{}' is not needed, since '{}' is not specified.",
            param, missing
        ),
    )
}
