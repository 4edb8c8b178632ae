//! sqlite-adapter: SQLite implementation of the `LinkStore` port.
//!
//! Purpose
//! - File-based durable link storage for local and single-node deployments.
//! - Enforces the two uniqueness rules in the schema itself:
//!   `(tenant, host, path)` for every row, and `(tenant, host, link,
//!   params_hash)` for guessable rows only (partial index).
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - A missing tenant is stored as NULL; the unique indexes fold it to `''`
//!   so rows without a tenant share one namespace.
//! - Stores timestamps as seconds since UNIX_EPOCH.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::params_hash::{canonical_fields, CANONICAL_KEYS};
use domain::{LinkParameters, LinkStore, StoreError, StoredLink, TenantId};
use rusqlite::{params, Connection};

// Parameter columns follow CANONICAL_KEYS order.
const SELECT_COLUMNS: &str = "SELECT id, host, path, link, is_unguessable_path, tenant_id, \
    apn, afl, amv, ifl, ipfl, isi, st, sd, si, \
    utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
    pt, at, ct, mt, ofl, params_hash, created_at, updated_at FROM durable_links";

/// SQLite-backed durable link store.
pub struct SqliteLinkStore {
    conn: Mutex<Connection>,
}

impl SqliteLinkStore {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqerr)?;
        init_schema(&conn)?;
        tracing::debug!(path = %path.as_ref().display(), "opened sqlite link store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Like [`SqliteLinkStore::new`], creating missing parent directories first.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(dir) = path.as_ref().parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Backend(format!("cannot create {}: {e}", dir.display())))?;
        }
        Self::new(path)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS durable_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host TEXT NOT NULL,
            path TEXT NOT NULL,
            link TEXT NOT NULL,
            is_unguessable_path INTEGER NOT NULL DEFAULT 0,
            tenant_id TEXT,
            apn TEXT,
            afl TEXT,
            amv TEXT,
            ifl TEXT,
            ipfl TEXT,
            isi TEXT,
            st TEXT,
            sd TEXT,
            si TEXT,
            utm_source TEXT,
            utm_medium TEXT,
            utm_campaign TEXT,
            utm_term TEXT,
            utm_content TEXT,
            pt TEXT,
            at TEXT,
            ct TEXT,
            mt TEXT,
            ofl TEXT,
            params_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS ux_durable_links_tenant_host_path
            ON durable_links(IFNULL(tenant_id, ''), host, path);
        CREATE UNIQUE INDEX IF NOT EXISTS ux_durable_links_dedup
            ON durable_links(IFNULL(tenant_id, ''), host, link, params_hash)
            WHERE is_unguessable_path = 0;
        CREATE INDEX IF NOT EXISTS idx_durable_links_host_path ON durable_links(host, path);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(format!("sqlite error: {e}"))
}

fn map_insert_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            StoreError::Conflict
        }
        _ => map_sqerr(e),
    }
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::from_secs(0)).as_secs() as i64
}
fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn row_to_link(row: &rusqlite::Row) -> Result<StoredLink, StoreError> {
    let id: i64 = row.get(0).map_err(map_sqerr)?;
    let tenant: Option<String> = row.get(5).map_err(map_sqerr)?;
    let tenant_id = tenant
        .map(|t| TenantId::parse(&t))
        .transpose()
        .map_err(|e| StoreError::Backend(format!("bad tenant_id in db: {e}")))?;

    let mut v: Vec<Option<String>> = Vec::with_capacity(CANONICAL_KEYS.len());
    for i in 0..CANONICAL_KEYS.len() {
        v.push(row.get(6 + i).map_err(map_sqerr)?);
    }
    let mut col = v.into_iter();
    let mut next = || col.next().flatten();

    let mut params = LinkParameters::default();
    params.android_parameters.android_package_name = next();
    params.android_parameters.android_fallback_link = next();
    params.android_parameters.android_min_package_version_code = next();
    params.ios_parameters.ios_fallback_link = next();
    params.ios_parameters.ios_ipad_fallback_link = next();
    params.ios_parameters.ios_app_store_id = next()
        .map(|s| s.parse::<u64>())
        .transpose()
        .map_err(|e| StoreError::Backend(format!("bad isi in db: {e}")))?;
    params.social_meta_tag_info.social_title = next();
    params.social_meta_tag_info.social_description = next();
    params.social_meta_tag_info.social_image_link = next();
    let utm = &mut params.analytics_info.marketing_parameters;
    utm.utm_source = next();
    utm.utm_medium = next();
    utm.utm_campaign = next();
    utm.utm_term = next();
    utm.utm_content = next();
    let itunes = &mut params.analytics_info.itunes_connect_analytics;
    itunes.pt = next();
    itunes.at = next();
    itunes.ct = next();
    itunes.mt = next();
    params.other_platform_parameters.fallback_url = next();

    let created_at: i64 = row.get(26).map_err(map_sqerr)?;
    let updated_at: i64 = row.get(27).map_err(map_sqerr)?;
    Ok(StoredLink {
        id: Some(id as u64),
        host: row.get(1).map_err(map_sqerr)?,
        path: row.get(2).map_err(map_sqerr)?,
        link: row.get(3).map_err(map_sqerr)?,
        is_unguessable_path: row.get::<_, i64>(4).map_err(map_sqerr)? != 0,
        tenant_id,
        params,
        params_hash: row.get(25).map_err(map_sqerr)?,
        created_at: secs_to_system_time(created_at),
        updated_at: secs_to_system_time(updated_at),
    })
}

impl LinkStore for SqliteLinkStore {
    fn lookup_by_host_and_path(
        &self,
        host: &str,
        path: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<StoredLink>, StoreError> {
        let conn = self.lock()?;
        let (sql, tenant) = match tenant_id {
            Some(t) => (
                format!("{SELECT_COLUMNS} WHERE host = ?1 AND path = ?2 AND tenant_id = ?3 LIMIT 1"),
                Some(t.to_string()),
            ),
            None => (format!("{SELECT_COLUMNS} WHERE host = ?1 AND path = ?2 LIMIT 1"), None),
        };
        let mut stmt = conn.prepare(&sql).map_err(map_sqerr)?;
        let mut rows = match &tenant {
            Some(t) => stmt.query(params![host, path, t]),
            None => stmt.query(params![host, path]),
        }
        .map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_link(row)?)),
            None => Ok(None),
        }
    }

    fn find_reusable_short_link(
        &self,
        host: &str,
        link: &str,
        params_hash: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT path FROM durable_links \
                 WHERE host = ?1 AND link = ?2 AND params_hash = ?3 \
                 AND is_unguessable_path = 0 AND tenant_id IS ?4 LIMIT 1",
            )
            .map_err(map_sqerr)?;
        let tenant = tenant_id.map(|t| t.to_string());
        let mut rows = stmt
            .query(params![host, link, params_hash, tenant])
            .map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row.get(0).map_err(map_sqerr)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, mut link: StoredLink) -> Result<StoredLink, StoreError> {
        let conn = self.lock()?;
        let [apn, afl, amv, ifl, ipfl, isi, st, sd, si, utm_source, utm_medium, utm_campaign, utm_term, utm_content, pt, at, ct, mt, ofl] =
            canonical_fields(&link.params);
        conn.execute(
            "INSERT INTO durable_links(host, path, link, is_unguessable_path, tenant_id, \
             apn, afl, amv, ifl, ipfl, isi, st, sd, si, \
             utm_source, utm_medium, utm_campaign, utm_term, utm_content, \
             pt, at, ct, mt, ofl, params_hash, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
            params![
                link.host,
                link.path,
                link.link,
                link.is_unguessable_path as i64,
                link.tenant_id.map(|t| t.to_string()),
                apn,
                afl,
                amv,
                ifl,
                ipfl,
                isi,
                st,
                sd,
                si,
                utm_source,
                utm_medium,
                utm_campaign,
                utm_term,
                utm_content,
                pt,
                at,
                ct,
                mt,
                ofl,
                link.params_hash,
                system_time_to_secs(link.created_at),
                system_time_to_secs(link.updated_at),
            ],
        )
        .map_err(map_insert_err)?;
        link.id = Some(conn.last_insert_rowid() as u64);
        Ok(link)
    }
}
