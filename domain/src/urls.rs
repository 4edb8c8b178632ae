//! URL and host helpers shared by normalization and resolution.

use url::{Host, Url};

use crate::CoreError;

const VALID_SCHEMES: [&str; 2] = ["http", "https"];

/// Parse `s` and require an http or https scheme.
pub fn validate_scheme(s: &str) -> Result<(), CoreError> {
    validate_scheme_in(s, &VALID_SCHEMES)
}

pub fn validate_scheme_in<S: AsRef<str>>(s: &str, allowed: &[S]) -> Result<(), CoreError> {
    let u = Url::parse(s).map_err(|e| CoreError::InvalidUrlFormat(e.to_string()))?;
    if allowed.iter().any(|scheme| scheme.as_ref() == u.scheme()) {
        Ok(())
    } else {
        Err(CoreError::InvalidScheme(u.scheme().to_string()))
    }
}

/// True when `s` parses with both a scheme and a host. Advisory only.
pub fn is_well_formed_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(u) => !u.scheme().is_empty() && hostname(&u).is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Reduce a user supplied host to its bare hostname. A missing scheme is
/// treated as `https://`; port and path are dropped.
pub fn clean_host(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::MissingHost);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let u = Url::parse(&candidate).map_err(|e| CoreError::InvalidHost(e.to_string()))?;
    let host = hostname(&u)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CoreError::InvalidHost(format!("no host in '{}'", trimmed)))?;
    tracing::debug!(host = %host, "cleaned host");
    Ok(host)
}

/// Exact, case-insensitive match of the candidate's hostname against the
/// allow-list. Subdomains of an allowed entry are not allowed.
pub fn is_domain_allowed(allow_list: &[String], candidate: &str) -> bool {
    let host = match Url::parse(candidate).ok().as_ref().and_then(hostname) {
        Some(h) => h.to_lowercase(),
        None => {
            tracing::debug!(candidate = %candidate, "unparsable link in allow-list check");
            return false;
        }
    };
    allow_list
        .iter()
        .any(|allowed| allowed.trim().to_lowercase() == host)
}

/// Map a preview/staging host onto the production host it mirrors:
/// `preview.acme.short.link` and `acme-preview.short.link` both become
/// `acme.short.link`.
pub fn remove_preview(host: &str) -> String {
    if let Some(rest) = host.strip_prefix("preview.") {
        return rest.to_string();
    }
    if let Some((label, rest)) = host.split_once('.') {
        if let Some(app) = label.strip_suffix("-preview") {
            return format!("{}.{}", app, rest);
        }
    }
    host.to_string()
}

/// Hostname without port or IPv6 brackets.
pub(crate) fn hostname(u: &Url) -> Option<String> {
    match u.host()? {
        Host::Domain(d) => Some(d.to_string()),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}
