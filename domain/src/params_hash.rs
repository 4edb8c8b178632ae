//! Canonical serialization and hashing of the optional link parameters.
//!
//! The canonical form lists every optional field in a fixed order, joined by
//! NUL. An absent field contributes the single byte 0x01, so absent, empty
//! and real values never collide (field values are printable text).

use sha2::{Digest, Sha256};

use crate::LinkParameters;

const SEPARATOR: u8 = 0x00;
const ABSENT: u8 = 0x01;

/// Short query keys of the optional fields, in canonical order.
pub const CANONICAL_KEYS: [&str; 19] = [
    "apn",
    "afl",
    "amv",
    "ifl",
    "ipfl",
    "isi",
    "st",
    "sd",
    "si",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "pt",
    "at",
    "ct",
    "mt",
    "ofl",
];

/// Field values in the order of [`CANONICAL_KEYS`].
pub fn canonical_fields(p: &LinkParameters) -> [Option<String>; 19] {
    let android = &p.android_parameters;
    let ios = &p.ios_parameters;
    let social = &p.social_meta_tag_info;
    let utm = &p.analytics_info.marketing_parameters;
    let itunes = &p.analytics_info.itunes_connect_analytics;
    [
        android.android_package_name.clone(),
        android.android_fallback_link.clone(),
        android.android_min_package_version_code.clone(),
        ios.ios_fallback_link.clone(),
        ios.ios_ipad_fallback_link.clone(),
        ios.ios_app_store_id.map(|id| id.to_string()),
        social.social_title.clone(),
        social.social_description.clone(),
        social.social_image_link.clone(),
        utm.utm_source.clone(),
        utm.utm_medium.clone(),
        utm.utm_campaign.clone(),
        utm.utm_term.clone(),
        utm.utm_content.clone(),
        itunes.pt.clone(),
        itunes.at.clone(),
        itunes.ct.clone(),
        itunes.mt.clone(),
        p.other_platform_parameters.fallback_url.clone(),
    ]
}

/// The byte string that is hashed.
pub fn canonical_parameter_set(params: &LinkParameters) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    for (i, field) in canonical_fields(params).iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        match field {
            Some(value) => out.extend_from_slice(value.as_bytes()),
            None => out.push(ABSENT),
        }
    }
    out
}

/// SHA-256 of the canonical parameter set as 64 lowercase hex characters.
pub fn compute_params_hash(params: &LinkParameters) -> String {
    hex::encode(Sha256::digest(canonical_parameter_set(params)))
}
