//! Paginated list view state with optimistic updates.
//!
//! The controller remembers the last server page and the mutations the user
//! submitted that the server has not echoed back yet. What the view shows is
//! always `merge_optimistic(last page, pending)`; pending mutations are only
//! dropped when a fetched page confirms them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use propdesk_api::{ListQuery, PageMeta, Resource};
use propdesk_core::{MergeOptions, PendingMutation, Record, merge_optimistic};
use propdesk_runtime_config::ListingSettings;

use crate::client::ApiClient;
use crate::error::Result;

#[derive(Debug, Default)]
struct ListState {
    page: u32,
    server: Vec<Record>,
    items: Vec<Record>,
    pending: Vec<PendingMutation>,
    meta: Option<PageMeta>,
    /// Bumped by every fetch.
    generation: u64,
    /// Generation of the response currently shown. An older response is
    /// discarded once a newer one has been applied; a newer fetch that
    /// failed does not hold it back.
    applied: u64,
}

pub struct ListController {
    client: Arc<ApiClient>,
    resource: Resource,
    limit: u32,
    options: MergeOptions,
    state: Mutex<ListState>,
}

impl ListController {
    pub fn new(client: Arc<ApiClient>, resource: Resource, limit: u32) -> Self {
        Self {
            client,
            resource,
            limit: limit.max(1),
            options: MergeOptions::with_id_key(resource.id_key()),
            state: Mutex::new(ListState {
                page: 1,
                ..ListState::default()
            }),
        }
    }

    /// A controller sized and keyed by the `[listing]` settings. The
    /// configured `id_key` applies to the property list only.
    pub fn from_settings(
        client: Arc<ApiClient>,
        resource: Resource,
        settings: &ListingSettings,
    ) -> Self {
        let id_key = match resource {
            Resource::Property => settings.id_key.clone(),
            other => other.id_key().to_string(),
        };
        Self::new(client, resource, settings.page_size).with_merge_options(MergeOptions {
            id_key,
            attachment_key: settings.attachment_key.clone(),
        })
    }

    pub fn with_merge_options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Fetch `page` and reconcile pending mutations against it.
    ///
    /// Returns `Ok(false)` when the response of a later fetch was already
    /// applied; this one is discarded.
    pub async fn load(&self, page: u32) -> Result<bool> {
        self.fetch(ListQuery::new(page, self.limit)).await
    }

    /// Fetch the current page again, bypassing the backend's list cache.
    /// Hosts call this when the view regains focus.
    pub async fn refresh(&self) -> Result<bool> {
        let page = self.state().page;
        self.fetch(ListQuery::new(page, self.limit).refreshed())
            .await
    }

    /// Show a record the user just created.
    pub fn record_created(&self, entity: Record, attachment: Option<Value>) {
        let mutation = PendingMutation::created(entity);
        self.push_pending(match attachment {
            Some(value) => mutation.with_attachment(value),
            None => mutation,
        });
    }

    /// Show the user's edit of an existing record.
    pub fn record_updated(&self, entity: Record, attachment: Option<Value>) {
        let mutation = PendingMutation::updated(entity);
        self.push_pending(match attachment {
            Some(value) => mutation.with_attachment(value),
            None => mutation,
        });
    }

    pub fn push_pending(&self, mutation: PendingMutation) {
        let mut state = self.state();
        state.pending.push(mutation);
        state.items = merge_optimistic(&state.server, &state.pending, &self.options).merged;
    }

    /// Records to display.
    pub fn items(&self) -> Vec<Record> {
        self.state().items.clone()
    }

    /// Mutations not yet confirmed by the server.
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.state().pending.clone()
    }

    /// Some mutation is still waiting for the server; callers keep refetching.
    pub fn has_unresolved(&self) -> bool {
        !self.state().pending.is_empty()
    }

    pub fn meta(&self) -> Option<PageMeta> {
        self.state().meta.clone()
    }

    pub fn page(&self) -> u32 {
        self.state().page
    }

    async fn fetch(&self, query: ListQuery) -> Result<bool> {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.generation
        };

        let page = self.client.list::<Record>(self.resource, &query).await?;

        let mut state = self.state();
        if generation < state.applied {
            debug!(
                resource = %self.resource,
                page = query.page,
                "discarding superseded list response"
            );
            return Ok(false);
        }

        let outcome = merge_optimistic(&page.data, &state.pending, &self.options);
        let resolved = state.pending.len() - outcome.remaining.len();
        if resolved > 0 {
            debug!(resource = %self.resource, resolved, "server confirmed pending mutations");
        }

        state.applied = generation;
        state.page = query.page;
        state.server = page.data;
        state.meta = Some(page.meta);
        state.items = outcome.merged;
        state.pending = outcome.remaining;
        Ok(true)
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
