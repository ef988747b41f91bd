//! Query cache: server pages keyed by resource, pagination and filters.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use tillwise_core::{ClientError, ClientResult, Paginated, Pagination};

use crate::http::ApiClient;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Deterministic cache key.
///
/// Filters live in a `BTreeMap`, so the order they were added in never
/// changes the key or its rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    resource: String,
    page: u32,
    size: u32,
    filters: BTreeMap<String, String>,
}

impl QueryKey {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            filters: BTreeMap::new(),
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size.max(1);
        self
    }

    /// Add a filter. Blank values are dropped so an empty search box and no
    /// search box produce the same key.
    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        let name = name.into();
        if value.trim().is_empty() {
            self.filters.remove(&name);
        } else {
            self.filters.insert(name, value.trim().to_string());
        }
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn page_number(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.size
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    /// Query string pairs for the list endpoint.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
        ];
        query.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        query
    }
}

impl core::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}?page={}&size={}", self.resource, self.page, self.size)?;
        for (k, v) in &self.filters {
            write!(f, "&{k}={v}")?;
        }
        Ok(())
    }
}

/// One cached page plus its pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
    pub cached_at: DateTime<Utc>,
    /// Set by invalidation; the page is still served until refetched.
    pub stale: bool,
}

impl<T> CachedPage<T> {
    /// A page holding a single non-paginated value (summaries, reports).
    pub fn single(value: T) -> Self {
        Self {
            items: vec![value],
            total: 1,
            page: 1,
            size: 1,
            total_pages: 1,
            has_next: false,
            has_prev: false,
            cached_at: Utc::now(),
            stale: false,
        }
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }
}

impl<T> From<Paginated<T>> for CachedPage<T> {
    fn from(value: Paginated<T>) -> Self {
        let Pagination {
            total,
            page,
            size,
            total_pages,
            has_next,
            has_prev,
        } = value.pagination;
        Self {
            items: value.items,
            total,
            page,
            size,
            total_pages,
            has_next,
            has_prev,
            cached_at: Utc::now(),
            stale: false,
        }
    }
}

/// Copies of cached pages taken before a speculative patch.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
    pages: Vec<(QueryKey, CachedPage<T>)>,
}

impl<T> CacheSnapshot<T> {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.pages.iter().map(|(k, _)| k)
    }
}

/// Cached pages of one item type.
#[derive(Debug, Clone)]
pub struct QueryCache<T> {
    pages: BTreeMap<QueryKey, CachedPage<T>>,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self { pages: BTreeMap::new() }
    }
}

impl<T: Clone> QueryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&CachedPage<T>> {
        self.pages.get(key)
    }

    pub fn insert(&mut self, key: QueryKey, page: CachedPage<T>) {
        tracing::debug!(%key, items = page.items.len(), "cache insert");
        self.pages.insert(key, page);
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Missing or invalidated.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.pages.get(key).is_none_or(|p| p.stale)
    }

    /// GET a paginated list endpoint for `key` and cache the page.
    pub async fn fetch(&mut self, client: &ApiClient, path: &str, key: QueryKey) -> ClientResult<&CachedPage<T>>
    where
        T: DeserializeOwned,
    {
        let page: Paginated<T> = client.get_query(path, &key.to_query()).await?;
        Ok(self.store(key, page.into()))
    }

    /// GET a non-paginated endpoint and cache its value under `key`.
    pub async fn fetch_single(&mut self, client: &ApiClient, path: &str, key: QueryKey) -> ClientResult<&T>
    where
        T: DeserializeOwned,
    {
        let value: T = client.get_query(path, &filter_query(&key)).await?;
        self.store(key, CachedPage::single(value))
            .first()
            .ok_or(ClientError::MissingData)
    }

    fn store(&mut self, key: QueryKey, page: CachedPage<T>) -> &CachedPage<T> {
        tracing::debug!(%key, items = page.items.len(), "cache fill");
        match self.pages.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.insert(page);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(page),
        }
    }

    fn resource_keys<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a QueryKey> + 'a {
        self.pages.keys().filter(move |k| k.resource == resource)
    }

    /// Copy every page of `resource` that contains an item matching `pred`.
    pub fn snapshot_matching<P>(&self, resource: &str, pred: P) -> CacheSnapshot<T>
    where
        P: Fn(&T) -> bool,
    {
        let pages = self
            .pages
            .iter()
            .filter(|(k, page)| k.resource == resource && page.items.iter().any(&pred))
            .map(|(k, page)| (k.clone(), page.clone()))
            .collect();
        CacheSnapshot { pages }
    }

    /// Copy every page of `resource`.
    pub fn snapshot_resource(&self, resource: &str) -> CacheSnapshot<T> {
        self.snapshot_matching(resource, |_| true)
    }

    /// Apply `patch` to every cached item of `resource` matching `pred`.
    ///
    /// Returns how many items were patched.
    pub fn patch_resource<P, F>(&mut self, resource: &str, pred: P, mut patch: F) -> usize
    where
        P: Fn(&T) -> bool,
        F: FnMut(&mut T),
    {
        let mut patched = 0;
        for (_, page) in self.pages.iter_mut().filter(|(k, _)| k.resource == resource) {
            for item in page.items.iter_mut().filter(|i| pred(i)) {
                patch(item);
                patched += 1;
            }
        }
        tracing::debug!(resource, patched, "cache patch");
        patched
    }

    /// Put snapshotted pages back exactly as they were.
    pub fn restore(&mut self, snapshot: CacheSnapshot<T>) {
        tracing::debug!(pages = snapshot.pages.len(), "cache restore");
        for (key, page) in snapshot.pages {
            self.pages.insert(key, page);
        }
    }

    /// Mark every page of `resource` stale so the next read refetches.
    pub fn invalidate_resource(&mut self, resource: &str) -> usize {
        let mut count = 0;
        for (_, page) in self.pages.iter_mut().filter(|(k, _)| k.resource == resource) {
            page.stale = true;
            count += 1;
        }
        tracing::debug!(resource, pages = count, "cache invalidate");
        count
    }

    pub fn remove_resource(&mut self, resource: &str) -> usize {
        let keys: Vec<QueryKey> = self.resource_keys(resource).cloned().collect();
        for key in &keys {
            self.pages.remove(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

fn filter_query(key: &QueryKey) -> Vec<(String, String)> {
    key.filters.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}
