//! Stock adjustment and stock-threshold updates against the cached
//! inventory pages.
//!
//! Both mutations patch every cached page that lists the product, restore
//! those pages exactly if the server rejects the change, and invalidate the
//! summary and valuation caches once the call settles either way.

use std::sync::Arc;

use tillwise_auth::PermissionRequirement;
use tillwise_core::{ClientError, ClientResult, OptimisticError, RecordId, Validate};

use crate::http::ApiClient;
use crate::notify::{Notification, Notifier};
use crate::query_cache::{CacheSnapshot, CachedPage, QueryCache, QueryKey};
use crate::session_store::SessionStore;
use crate::types::{InventorySummary, InventoryValuation, StockAdjustment, StockLevel, StockSettings};

pub const INVENTORY: &str = "inventory";
pub const INVENTORY_SUMMARY: &str = "inventory-summary";
pub const INVENTORY_VALUATION: &str = "inventory-valuation";

pub const INVENTORY_PATH: &str = "/inventory";
pub const ADJUST_PATH: &str = "/inventory/adjust";
pub const SUMMARY_PATH: &str = "/inventory/summary";
pub const VALUATION_PATH: &str = "/inventory/valuation";

pub const ADJUST_PERMISSION: &str = "inventory:adjust";
pub const SETTINGS_PERMISSION: &str = "inventory:update";

fn settings_path(product_id: RecordId) -> String {
    format!("{INVENTORY_PATH}/{product_id}/settings")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChangeKind {
    Adjust { delta: i64 },
    Settings(StockSettings),
}

/// A speculative stock change waiting for the server's answer.
#[must_use = "a stock change must be settled with InventoryHooks::finish"]
#[derive(Debug)]
pub struct StockChange {
    product_id: RecordId,
    generation: u64,
    kind: ChangeKind,
    snapshot: CacheSnapshot<StockLevel>,
}

impl StockChange {
    pub fn product_id(&self) -> RecordId {
        self.product_id
    }

    /// Number of cached pages that were patched.
    pub fn pages_touched(&self) -> usize {
        self.snapshot.len()
    }
}

/// Inventory mutations plus the caches they keep in step.
///
/// At most one stock change is outstanding at a time; its snapshot is only
/// exact while no other change touches the same pages.
pub struct InventoryHooks {
    client: ApiClient,
    session: SessionStore,
    notifier: Arc<dyn Notifier>,
    pending: Option<u64>,
    generation: u64,
    pub levels: QueryCache<StockLevel>,
    pub summary: QueryCache<InventorySummary>,
    pub valuation: QueryCache<InventoryValuation>,
}

impl InventoryHooks {
    pub fn new(session: SessionStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client: session.client().clone(),
            session,
            notifier,
            pending: None,
            generation: 0,
            levels: QueryCache::new(),
            summary: QueryCache::new(),
            valuation: QueryCache::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn fetch_levels(&mut self, key: QueryKey) -> ClientResult<&CachedPage<StockLevel>> {
        self.levels.fetch(&self.client, INVENTORY_PATH, key).await
    }

    pub async fn fetch_summary(&mut self) -> ClientResult<&InventorySummary> {
        self.summary
            .fetch_single(&self.client, SUMMARY_PATH, QueryKey::new(INVENTORY_SUMMARY))
            .await
    }

    pub async fn fetch_valuation(&mut self) -> ClientResult<&InventoryValuation> {
        self.valuation
            .fetch_single(&self.client, VALUATION_PATH, QueryKey::new(INVENTORY_VALUATION))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Change the on-hand quantity of `product_id` by `delta`.
    pub async fn adjust_stock(
        &mut self,
        product_id: RecordId,
        delta: i64,
        reason: Option<String>,
    ) -> ClientResult<StockLevel> {
        let adjustment = StockAdjustment {
            product_id,
            quantity: delta,
            reason,
        };
        let change = match self.begin_adjust(&adjustment) {
            Ok(change) => change,
            Err(e) => return Err(self.report(e)),
        };
        let outcome = self.client.post(ADJUST_PATH, &adjustment).await;
        self.finish(change, outcome)
    }

    /// Replace the stock thresholds of `product_id`.
    pub async fn update_stock_settings(
        &mut self,
        product_id: RecordId,
        settings: StockSettings,
    ) -> ClientResult<StockLevel> {
        let change = match self.begin_settings(product_id, &settings) {
            Ok(change) => change,
            Err(e) => return Err(self.report(e)),
        };
        let outcome = self.client.put(&settings_path(product_id), &settings).await;
        self.finish(change, outcome)
    }

    /// `true` while a stock change awaits [`InventoryHooks::finish`].
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Check, validate and apply the speculative delta. Nothing is sent.
    pub fn begin_adjust(&mut self, adjustment: &StockAdjustment) -> ClientResult<StockChange> {
        self.session.require(&PermissionRequirement::one(ADJUST_PERMISSION))?;
        adjustment.validate()?;
        self.ensure_idle()?;
        Ok(self.apply(
            adjustment.product_id,
            ChangeKind::Adjust {
                delta: adjustment.quantity,
            },
        ))
    }

    pub fn begin_settings(&mut self, product_id: RecordId, settings: &StockSettings) -> ClientResult<StockChange> {
        self.session.require(&PermissionRequirement::one(SETTINGS_PERMISSION))?;
        settings.validate()?;
        self.ensure_idle()?;
        Ok(self.apply(product_id, ChangeKind::Settings(settings.clone())))
    }

    /// Settle a change with the server's outcome and notify once.
    pub fn finish(&mut self, change: StockChange, outcome: ClientResult<StockLevel>) -> ClientResult<StockLevel> {
        let StockChange {
            product_id,
            generation,
            kind,
            snapshot,
        } = change;

        if self.pending != Some(generation) {
            return Err(self.report(OptimisticError::StaleTicket.into()));
        }
        self.pending = None;

        let result = match outcome {
            Ok(server) => {
                self.levels.patch_resource(
                    INVENTORY,
                    |l| l.product_id == product_id,
                    |l| reconcile(l, &server),
                );
                let message = match kind {
                    ChangeKind::Adjust { .. } => "Stock adjusted",
                    ChangeKind::Settings(_) => "Stock settings updated",
                };
                self.notifier.notify(Notification::success(message));
                Ok(server)
            }
            Err(e) => {
                tracing::warn!(%product_id, pages = snapshot.len(), "restoring inventory pages after failed change");
                self.levels.restore(snapshot);
                Err(self.report(e))
            }
        };

        self.summary.invalidate_resource(INVENTORY_SUMMARY);
        self.valuation.invalidate_resource(INVENTORY_VALUATION);
        result
    }

    fn ensure_idle(&self) -> ClientResult<()> {
        if self.pending.is_some() {
            return Err(OptimisticError::MutationPending.into());
        }
        Ok(())
    }

    fn apply(&mut self, product_id: RecordId, kind: ChangeKind) -> StockChange {
        self.generation += 1;
        self.pending = Some(self.generation);
        let snapshot = self.levels.snapshot_matching(INVENTORY, |l| l.product_id == product_id);
        self.levels.patch_resource(
            INVENTORY,
            |l| l.product_id == product_id,
            |l| match &kind {
                ChangeKind::Adjust { delta } => l.quantity = l.quantity.saturating_add(*delta),
                ChangeKind::Settings(settings) => l.apply_settings(settings),
            },
        );
        StockChange {
            product_id,
            generation: self.generation,
            kind,
            snapshot,
        }
    }

    fn report(&self, error: ClientError) -> ClientError {
        tracing::warn!(error = %error, "inventory change failed");
        self.notifier.notify(Notification::error(error.user_message()));
        error
    }
}

/// Take the server's numbers, keep display fields the response may omit.
fn reconcile(cached: &mut StockLevel, server: &StockLevel) {
    cached.quantity = server.quantity;
    cached.min_stock = server.min_stock;
    cached.max_stock = server.max_stock;
    cached.reorder_point = server.reorder_point;
    if server.updated_at.is_some() {
        cached.updated_at = server.updated_at;
    }
}
