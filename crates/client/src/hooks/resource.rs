//! Create/update/delete for list resources (customers, products, users).
//!
//! Every mutation runs the same steps:
//! 1. strict permission re-check and local validation (nothing is sent on failure)
//! 2. optimistic change to the list
//! 3. network call
//! 4. replace-id / commit on success, rollback on failure
//! 5. exactly one notification

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use tillwise_auth::PermissionRequirement;
use tillwise_core::{ClientError, ClientResult, Paginated, Pagination, Record, RecordId, Validate};

use crate::http::ApiClient;
use crate::notify::{Notification, Notifier};
use crate::optimistic::{MutationKind, MutationTicket, OptimisticList};
use crate::query_cache::QueryKey;
use crate::session_store::SessionStore;
use crate::types::{Customer, CustomerInput, Product, ProductInput, UserAccount, UserInput};

/// REST collection and the permission codes guarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    /// Singular, capitalised; used in notifications.
    pub label: &'static str,
    pub view: &'static str,
    pub create: &'static str,
    pub update: &'static str,
    pub delete: &'static str,
}

impl Endpoint {
    pub fn item_path(&self, id: RecordId) -> String {
        format!("{}/{}", self.path, id)
    }

    pub fn requirement(&self, kind: MutationKind) -> PermissionRequirement {
        PermissionRequirement::one(match kind {
            MutationKind::Add => self.create,
            MutationKind::Update => self.update,
            MutationKind::Remove => self.delete,
        })
    }

    fn past_tense(&self, kind: MutationKind) -> String {
        let verb = match kind {
            MutationKind::Add => "created",
            MutationKind::Update => "updated",
            MutationKind::Remove => "deleted",
        };
        format!("{} {verb}", self.label)
    }
}

pub mod resources {
    use super::Endpoint;

    pub const CUSTOMERS: Endpoint = Endpoint {
        path: "/customers",
        label: "Customer",
        view: "customers:view",
        create: "customers:create",
        update: "customers:update",
        delete: "customers:delete",
    };

    pub const PRODUCTS: Endpoint = Endpoint {
        path: "/products",
        label: "Product",
        view: "products:view",
        create: "products:create",
        update: "products:update",
        delete: "products:delete",
    };

    pub const USERS: Endpoint = Endpoint {
        path: "/users",
        label: "User",
        view: "users:view",
        create: "users:create",
        update: "users:update",
        delete: "users:delete",
    };
}

/// A record type managed through [`ResourceHooks`].
pub trait Resource: Record + DeserializeOwned {
    /// Create/update payload.
    type Input: Serialize + Validate;

    const ENDPOINT: Endpoint;

    /// Speculative record shown while a create is in flight.
    fn draft(input: &Self::Input) -> Self;

    /// Shallow merge of an update payload.
    fn apply(&mut self, input: &Self::Input);
}

impl Resource for Customer {
    type Input = CustomerInput;

    const ENDPOINT: Endpoint = resources::CUSTOMERS;

    fn draft(input: &CustomerInput) -> Self {
        Customer {
            id: RecordId::new(0),
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            is_active: true,
            created_at: None,
        }
    }

    fn apply(&mut self, input: &CustomerInput) {
        self.name = input.name.clone();
        if input.email.is_some() {
            self.email = input.email.clone();
        }
        if input.phone.is_some() {
            self.phone = input.phone.clone();
        }
        if input.address.is_some() {
            self.address = input.address.clone();
        }
    }
}

impl Resource for Product {
    type Input = ProductInput;

    const ENDPOINT: Endpoint = resources::PRODUCTS;

    fn draft(input: &ProductInput) -> Self {
        Product {
            id: RecordId::new(0),
            name: input.name.clone(),
            sku: input.sku.clone(),
            price: input.price,
            cost: input.cost,
            category: input.category.clone(),
            is_active: true,
        }
    }

    fn apply(&mut self, input: &ProductInput) {
        self.name = input.name.clone();
        self.sku = input.sku.clone();
        self.price = input.price;
        if input.cost.is_some() {
            self.cost = input.cost;
        }
        if input.category.is_some() {
            self.category = input.category.clone();
        }
    }
}

impl Resource for UserAccount {
    type Input = UserInput;

    const ENDPOINT: Endpoint = resources::USERS;

    fn draft(input: &UserInput) -> Self {
        UserAccount {
            id: RecordId::new(0),
            username: input.username.clone(),
            full_name: input.full_name.clone(),
            email: input.email.clone(),
            role: input.role.clone(),
            is_active: true,
        }
    }

    fn apply(&mut self, input: &UserInput) {
        self.username = input.username.clone();
        if input.full_name.is_some() {
            self.full_name = input.full_name.clone();
        }
        if input.email.is_some() {
            self.email = input.email.clone();
        }
        if input.role.is_some() {
            self.role = input.role.clone();
        }
    }
}

/// Optimistic CRUD over one resource list.
pub struct ResourceHooks<T: Resource> {
    client: ApiClient,
    session: SessionStore,
    notifier: Arc<dyn Notifier>,
    list: OptimisticList<T>,
}

impl<T: Resource> ResourceHooks<T> {
    pub fn new(session: SessionStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client: session.client().clone(),
            session,
            notifier,
            list: OptimisticList::new(),
        }
    }

    pub fn list(&self) -> &OptimisticList<T> {
        &self.list
    }

    /// Whether navigation should offer this resource at all.
    pub fn visible(&self) -> bool {
        self.session.can_view(&PermissionRequirement::one(T::ENDPOINT.view))
    }

    /// Load one page of the resource into the list.
    pub async fn fetch(&mut self, key: &QueryKey) -> ClientResult<Pagination> {
        let page: Paginated<T> = self.client.get_query(T::ENDPOINT.path, &key.to_query()).await?;
        self.list.load(page.items)?;
        Ok(page.pagination)
    }

    pub async fn create(&mut self, input: T::Input) -> ClientResult<T> {
        let ticket = match self.begin_create(&input) {
            Ok(ticket) => ticket,
            Err(e) => return Err(self.report(e)),
        };
        let outcome = self.client.post(T::ENDPOINT.path, &input).await.map(Some);
        server_record(self.finish(ticket, outcome))
    }

    pub async fn update(&mut self, id: RecordId, input: T::Input) -> ClientResult<T> {
        let ticket = match self.begin_update(id, &input) {
            Ok(ticket) => ticket,
            Err(e) => return Err(self.report(e)),
        };
        let outcome = self.client.put(&T::ENDPOINT.item_path(id), &input).await.map(Some);
        server_record(self.finish(ticket, outcome))
    }

    pub async fn delete(&mut self, id: RecordId) -> ClientResult<()> {
        let ticket = match self.begin_delete(id) {
            Ok(ticket) => ticket,
            Err(e) => return Err(self.report(e)),
        };
        let outcome = self.client.delete(&T::ENDPOINT.item_path(id)).await.map(|()| None);
        self.finish(ticket, outcome).map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Phases
    // ─────────────────────────────────────────────────────────────────────────

    /// Check, validate and show the speculative record. Nothing is sent.
    pub fn begin_create(&mut self, input: &T::Input) -> ClientResult<MutationTicket> {
        self.session.require(&T::ENDPOINT.requirement(MutationKind::Add))?;
        input.validate()?;
        let (_, ticket) = self.list.add_optimistic(T::draft(input))?;
        Ok(ticket)
    }

    pub fn begin_update(&mut self, id: RecordId, input: &T::Input) -> ClientResult<MutationTicket> {
        self.session.require(&T::ENDPOINT.requirement(MutationKind::Update))?;
        input.validate()?;
        Ok(self.list.update_optimistic(id, |item| item.apply(input))?)
    }

    pub fn begin_delete(&mut self, id: RecordId) -> ClientResult<MutationTicket> {
        self.session.require(&T::ENDPOINT.requirement(MutationKind::Remove))?;
        Ok(self.list.remove_optimistic(id)?)
    }

    /// Settle a mutation with the server's outcome and notify once.
    pub fn finish(&mut self, ticket: MutationTicket, outcome: ClientResult<Option<T>>) -> ClientResult<Option<T>> {
        let kind = ticket.kind();
        match outcome {
            Ok(server_item) => {
                let settled = match server_item.clone() {
                    Some(item) => self.list.commit_with(ticket, item),
                    None => self.list.commit(ticket),
                };
                if let Err(e) = settled {
                    tracing::warn!(error = %e, "could not settle optimistic mutation");
                }
                self.notifier.notify(Notification::success(T::ENDPOINT.past_tense(kind)));
                Ok(server_item)
            }
            Err(e) => {
                if let Err(settle_err) = self.list.rollback(ticket) {
                    tracing::warn!(error = %settle_err, "could not roll back optimistic mutation");
                }
                Err(self.report(e))
            }
        }
    }

    fn report(&self, error: ClientError) -> ClientError {
        tracing::warn!(resource = T::ENDPOINT.path, error = %error, "mutation failed");
        self.notifier.notify(Notification::error(error.user_message()));
        error
    }
}

/// Create and update always answer with the stored record.
fn server_record<T>(settled: ClientResult<Option<T>>) -> ClientResult<T> {
    settled?.ok_or(ClientError::MissingData)
}
