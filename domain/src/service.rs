use tracing::{debug, error, warn};
use url::Url;

use crate::normalize::{LinkValidator, NormalizedLink};
use crate::params_hash::compute_params_hash;
use crate::request::build_long_link;
use crate::urls;
use crate::{
    Clock, CoreError, CreateDurableLinkRequest, CreateInput, LinkStore, LongLinkResponse,
    PathGenerator, ShortLinkResponse, StoreError, StoredLink, TenantConfig, TenantId,
};

/// Insert attempts made before a path collision is reported.
pub const MAX_CREATE_ATTEMPTS: usize = 5;

/// Application service orchestrating creation and resolution of durable
/// links.
///
/// Generic over the store, path generator and clock so it can be driven by
/// deterministic doubles in tests. The validator is injected rather than
/// shared globally.
pub struct DurableLinkService<S: LinkStore, G: PathGenerator, C: Clock> {
    store: S,
    paths: G,
    clock: C,
    validator: LinkValidator,
}

impl<S: LinkStore, G: PathGenerator, C: Clock> DurableLinkService<S, G, C> {
    pub fn new(store: S, paths: G, clock: C, validator: LinkValidator) -> Self {
        Self {
            store,
            paths,
            clock,
            validator,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Turn an inbound create body into a request.
    pub fn prepare(&self, input: CreateInput) -> Result<CreateDurableLinkRequest, CoreError> {
        self.validator.prepare(input)
    }

    /// Create a durable link, or reuse an identical guessable one.
    pub fn create(
        &self,
        request: CreateDurableLinkRequest,
        tenant: Option<&TenantId>,
        cfg: &TenantConfig,
    ) -> Result<ShortLinkResponse, CoreError> {
        let NormalizedLink {
            host,
            link,
            wants_short_path,
            warnings,
        } = self.validator.normalize(request, cfg)?;
        let params_hash = compute_params_hash(&link.params);

        if wants_short_path {
            if let Some(path) = self.find_reusable(&host, &link.link, &params_hash, tenant)? {
                debug!(host = %host, path = %path, params_hash = %params_hash, "reusing existing short link");
                return Ok(ShortLinkResponse {
                    short_link: short_link(cfg, &host, &path),
                    warnings,
                });
            }
        }

        let length = if wants_short_path {
            cfg.short_path_length
        } else {
            cfg.unguessable_path_length
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = self.clock.now();
            let row = StoredLink {
                id: None,
                host: host.clone(),
                path: self.paths.generate(length),
                link: link.link.clone(),
                is_unguessable_path: !wants_short_path,
                tenant_id: tenant.copied(),
                params: link.params.clone(),
                params_hash: params_hash.clone(),
                created_at: now,
                updated_at: now,
            };
            let path = row.path.clone();

            match self.store.insert(row) {
                Ok(stored) => {
                    debug!(
                        host = %stored.host,
                        path = %stored.path,
                        params_hash = %params_hash,
                        tenant_id = ?tenant,
                        unguessable = stored.is_unguessable_path,
                        "new link stored"
                    );
                    return Ok(ShortLinkResponse {
                        short_link: short_link(cfg, &stored.host, &stored.path),
                        warnings,
                    });
                }
                Err(StoreError::Conflict) if attempt < MAX_CREATE_ATTEMPTS => {
                    warn!(host = %host, path = %path, attempt, "unique constraint hit on insert, retrying");
                    if wants_short_path {
                        if let Some(existing) =
                            self.find_reusable(&host, &link.link, &params_hash, tenant)?
                        {
                            debug!(host = %host, path = %existing, "link created concurrently, reusing");
                            return Ok(ShortLinkResponse {
                                short_link: short_link(cfg, &host, &existing),
                                warnings,
                            });
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, host = %host, path = %path, attempt, "failed to store link");
                    return Err(CoreError::storage("store link", e));
                }
            }
        }
    }

    /// Resolve a short link to its long form.
    pub fn resolve(
        &self,
        raw_short_url: &str,
        tenant: Option<&TenantId>,
        cfg: &TenantConfig,
    ) -> Result<LongLinkResponse, CoreError> {
        let stored = self.lookup(raw_short_url, tenant)?;
        let long_link = build_long_link(
            &cfg.url_scheme,
            &stored.host,
            &stored.path,
            &stored.to_durable_link(),
        );
        Ok(LongLinkResponse { long_link })
    }

    /// Find the stored link a short URL points at. Preview hosts resolve to
    /// the production host they mirror.
    pub fn lookup(&self, raw_short_url: &str, tenant: Option<&TenantId>) -> Result<StoredLink, CoreError> {
        let u = Url::parse(raw_short_url).map_err(|_| CoreError::InvalidRequestedLink)?;
        let host = urls::hostname(&u).ok_or(CoreError::InvalidRequestedLink)?;
        let host = urls::remove_preview(&host);

        let segments: Vec<&str> = u.path().trim_matches('/').split('/').collect();
        let path = match segments.as_slice() {
            [one] if !one.is_empty() => *one,
            _ => return Err(CoreError::InvalidPathFormat),
        };

        let stored = self
            .store
            .lookup_by_host_and_path(&host, path, tenant)
            .map_err(|e| {
                error!(error = %e, host = %host, path = %path, "failed to look up link");
                CoreError::storage("look up link", e)
            })?
            .ok_or(CoreError::LinkNotFound)?;

        if !stored.has_valid_params_hash() {
            warn!(
                host = %stored.host,
                path = %stored.path,
                params_hash = %stored.params_hash,
                "stored params hash does not match parameters"
            );
        }
        Ok(stored)
    }

    fn find_reusable(
        &self,
        host: &str,
        link: &str,
        params_hash: &str,
        tenant: Option<&TenantId>,
    ) -> Result<Option<String>, CoreError> {
        self.store
            .find_reusable_short_link(host, link, params_hash, tenant)
            .map_err(|e| {
                error!(error = %e, host = %host, params_hash = %params_hash, "failed to query reusable short link");
                CoreError::storage("find reusable short link", e)
            })
    }
}

fn short_link(cfg: &TenantConfig, host: &str, path: &str) -> String {
    format!("{}://{}/{}", cfg.url_scheme, host, path)
}
