//! Query manager: one-shot execution into pages, and stored queries.

use crate::binding::QueryParam;
use crate::compiler::Field;
use crate::evaluator::field_value;
use crate::query::ArtifactQuery;
use cairn_core::{Artifact, RegistryResult};
use cairn_storage::{Registry, StorageBackend};
use serde::Serialize;
use std::collections::BTreeMap;

/// One result with the extra properties requested for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageEntry {
    pub artifact: Artifact,
    /// Requested properties that have a value, core or custom.
    pub extra_properties: BTreeMap<String, String>,
}

/// A materialized page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub entries: Vec<PageEntry>,
    pub start_index: usize,
    /// Matches before pagination.
    pub total: usize,
    pub has_more: bool,
}

impl Page {
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter().map(|e| &e.artifact)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Paging and ordering for [`QueryManager::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub start_index: usize,
    /// `None` uses the configured default page size.
    pub count: Option<usize>,
    /// `None` uses the configured default order property.
    pub order_by: Option<String>,
    /// Descending when false. Defaults to ascending.
    pub descending: bool,
}

impl PageRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn order_by(mut self, property: impl Into<String>) -> Self {
        self.order_by = Some(property.into());
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.descending = !ascending;
        self
    }
}

/// Entry point for running queries against a registry.
pub struct QueryManager<'r, B: StorageBackend> {
    registry: &'r Registry<B>,
}

impl<'r, B: StorageBackend> QueryManager<'r, B> {
    pub fn new(registry: &'r Registry<B>) -> Self {
        Self { registry }
    }

    /// Start a query from a template with `?` placeholders.
    pub fn new_query(&self, template: impl Into<String>) -> ArtifactQuery<'r, B> {
        ArtifactQuery::new(self.registry, template)
    }

    /// Run a query without parameters and collect one page.
    pub fn execute(
        &self,
        query: &str,
        page: &PageRequest,
        extra_property_names: &[String],
    ) -> RegistryResult<Page> {
        self.run(self.new_query(query), page, extra_property_names)
    }

    /// Run the stored query `name` with `params`, projecting the stored
    /// query's property names.
    pub fn execute_stored(
        &self,
        name: &str,
        params: Vec<QueryParam>,
        page: &PageRequest,
    ) -> RegistryResult<Page> {
        let stored = self.registry.get_stored_query(name)?;
        tracing::debug!(name = %name, query = %stored.query_expression, "Executing stored query");
        let query = self.new_query(stored.query_expression).set_params(params);
        self.run(query, page, &stored.property_names)
    }

    fn run(
        &self,
        query: ArtifactQuery<'r, B>,
        page: &PageRequest,
        extra_property_names: &[String],
    ) -> RegistryResult<Page> {
        let mut query = query.start_index(page.start_index).ascending(!page.descending);
        if let Some(count) = page.count {
            query = query.count(count);
        }
        if let Some(order_by) = &page.order_by {
            query = query.order_by(order_by.clone());
        }

        let mut results = query.query()?;
        let fields: Vec<(&String, Field)> = extra_property_names
            .iter()
            .map(|name| (name, Field::property(name)))
            .collect();

        let mut entries = Vec::with_capacity(results.page_len());
        for artifact in results.by_ref() {
            let artifact = artifact?;
            let extra_properties = fields
                .iter()
                .filter_map(|(name, field)| {
                    field_value(&artifact, field, None).map(|v| ((*name).clone(), v.as_text()))
                })
                .collect();
            entries.push(PageEntry {
                artifact,
                extra_properties,
            });
        }

        let page = Page {
            start_index: results.start_index(),
            total: results.total(),
            has_more: results.has_more(),
            entries,
        };
        results.close()?;

        tracing::info!(
            query = %query.template(),
            total = page.total,
            returned = page.entries.len(),
            "Query executed"
        );
        Ok(page)
    }
}
