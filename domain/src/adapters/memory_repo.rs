use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{LinkStore, StoreError, StoredLink, TenantId};

type RowKey = (Option<TenantId>, String, String);

#[derive(Default)]
struct Inner {
    rows: BTreeMap<RowKey, StoredLink>,
    next_id: u64,
}

/// In-memory link store for tests and local runs. Enforces the same two
/// uniqueness rules as the SQLite schema behind a single mutex.
pub struct InMemoryLinkStore {
    inner: Mutex<Inner>,
}

impl InMemoryLinkStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))
    }
}

impl Default for InMemoryLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_reusable(row: &StoredLink, host: &str, link: &str, hash: &str, tenant: Option<&TenantId>) -> bool {
    !row.is_unguessable_path
        && row.tenant_id.as_ref() == tenant
        && row.host == host
        && row.link == link
        && row.params_hash == hash
}

impl LinkStore for InMemoryLinkStore {
    fn lookup_by_host_and_path(
        &self,
        host: &str,
        path: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<StoredLink>, StoreError> {
        let inner = self.lock()?;
        let found = match tenant_id {
            Some(t) => inner
                .rows
                .get(&(Some(*t), host.to_string(), path.to_string()))
                .cloned(),
            None => inner
                .rows
                .values()
                .find(|r| r.host == host && r.path == path)
                .cloned(),
        };
        Ok(found)
    }

    fn find_reusable_short_link(
        &self,
        host: &str,
        link: &str,
        params_hash: &str,
        tenant_id: Option<&TenantId>,
    ) -> Result<Option<String>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .rows
            .values()
            .find(|r| is_reusable(r, host, link, params_hash, tenant_id))
            .map(|r| r.path.clone()))
    }

    fn insert(&self, mut link: StoredLink) -> Result<StoredLink, StoreError> {
        let mut inner = self.lock()?;
        let key = (link.tenant_id, link.host.clone(), link.path.clone());
        if inner.rows.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        if !link.is_unguessable_path
            && inner.rows.values().any(|r| {
                is_reusable(
                    r,
                    &link.host,
                    &link.link,
                    &link.params_hash,
                    link.tenant_id.as_ref(),
                )
            })
        {
            return Err(StoreError::Conflict);
        }
        inner.next_id += 1;
        link.id = Some(inner.next_id);
        inner.rows.insert(key, link.clone());
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LinkParameters;
    use std::time::SystemTime;
    use uuid::Uuid;

    fn mk_link(path: &str, tenant: Option<TenantId>, unguessable: bool) -> StoredLink {
        StoredLink {
            id: None,
            host: "acme.short.link".into(),
            path: path.into(),
            link: "https://example.com".into(),
            is_unguessable_path: unguessable,
            tenant_id: tenant,
            params: LinkParameters::default(),
            params_hash: "h".into(),
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn insert_assigns_ids_and_lookup_finds_row() {
        let store = InMemoryLinkStore::new();
        let a = store.insert(mk_link("a", None, false)).unwrap();
        let b = store.insert(mk_link("b", None, true)).unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
        let got = store
            .lookup_by_host_and_path("acme.short.link", "a", None)
            .unwrap()
            .expect("row");
        assert_eq!(got, a);
        assert!(store
            .lookup_by_host_and_path("other.link", "a", None)
            .unwrap()
            .is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn duplicate_path_conflicts_per_tenant() {
        let store = InMemoryLinkStore::new();
        let t = TenantId::new(Uuid::new_v4());
        store.insert(mk_link("p", None, true)).unwrap();
        assert!(matches!(
            store.insert(mk_link("p", None, true)),
            Err(StoreError::Conflict)
        ));
        store.insert(mk_link("p", Some(t), true)).unwrap();
    }

    #[test]
    fn dedup_key_is_unique_for_guessable_rows_only() {
        let store = InMemoryLinkStore::new();
        store.insert(mk_link("one", None, false)).unwrap();
        assert!(matches!(
            store.insert(mk_link("two", None, false)),
            Err(StoreError::Conflict)
        ));
        store.insert(mk_link("three", None, true)).unwrap();
        store.insert(mk_link("four", None, true)).unwrap();
    }

    #[test]
    fn reuse_matches_tenant_exactly() {
        let store = InMemoryLinkStore::new();
        let t = TenantId::new(Uuid::new_v4());
        store.insert(mk_link("shared", None, false)).unwrap();
        store.insert(mk_link("mine", Some(t), false)).unwrap();
        store.insert(mk_link("secret", None, true)).unwrap();

        let find = |tenant: Option<&TenantId>| {
            store
                .find_reusable_short_link("acme.short.link", "https://example.com", "h", tenant)
                .unwrap()
        };
        assert_eq!(find(None).as_deref(), Some("shared"));
        assert_eq!(find(Some(&t)).as_deref(), Some("mine"));
        assert_eq!(find(Some(&TenantId::new(Uuid::new_v4()))), None);
    }

    #[test]
    fn tenant_filtered_lookup() {
        let store = InMemoryLinkStore::new();
        let t = TenantId::new(Uuid::new_v4());
        store.insert(mk_link("p", Some(t), true)).unwrap();
        assert!(store
            .lookup_by_host_and_path("acme.short.link", "p", Some(&t))
            .unwrap()
            .is_some());
        assert!(store
            .lookup_by_host_and_path("acme.short.link", "p", Some(&TenantId::new(Uuid::new_v4())))
            .unwrap()
            .is_none());
        // unfiltered lookup sees every tenant
        assert!(store
            .lookup_by_host_and_path("acme.short.link", "p", None)
            .unwrap()
            .is_some());
    }
}
