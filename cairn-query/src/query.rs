//! Artifact query lifecycle: build, bind parameters, execute.

use crate::binding::{bind, QueryParam};
use crate::compiler::compile;
use crate::evaluator::{Catalog, Evaluator};
use crate::parser::parse;
use crate::result_set::{sort_artifacts, ResultSet};
use cairn_core::{Classifier, RegistryResult, Timestamp};
use cairn_storage::{Registry, StorageBackend};
use chrono::NaiveDate;

/// Where a query is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// No parameters bound yet.
    Built,
    /// At least one parameter bound.
    Parameterized,
}

/// A query template plus its bound parameters and paging options.
///
/// Parameters bind positionally to the `?` placeholders in the template.
/// `query()` may be called any number of times; each call runs against the
/// state committed at that moment.
pub struct ArtifactQuery<'r, B: StorageBackend> {
    registry: &'r Registry<B>,
    template: String,
    params: Vec<QueryParam>,
    order_by: String,
    ascending: bool,
    start_index: usize,
    count: Option<usize>,
}

impl<'r, B: StorageBackend> ArtifactQuery<'r, B> {
    pub fn new(registry: &'r Registry<B>, template: impl Into<String>) -> Self {
        Self {
            order_by: registry.config().default_order_by.clone(),
            registry,
            template: template.into(),
            params: Vec::new(),
            ascending: true,
            start_index: 0,
            count: None,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn state(&self) -> QueryState {
        if self.params.is_empty() {
            QueryState::Built
        } else {
            QueryState::Parameterized
        }
    }

    pub fn set_param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn set_params(mut self, params: impl IntoIterator<Item = QueryParam>) -> Self {
        self.params.extend(params);
        self
    }

    /// Bind a quoted string.
    pub fn set_string(self, value: impl Into<String>) -> Self {
        self.set_param(QueryParam::String(value.into()))
    }

    /// Bind an unquoted number.
    pub fn set_number(self, value: f64) -> Self {
        self.set_param(QueryParam::Number(value))
    }

    /// Bind a calendar date, `YYYY-MM-DD`.
    pub fn set_date(self, value: NaiveDate) -> Self {
        self.set_param(QueryParam::Date(value))
    }

    /// Bind an instant, second precision.
    pub fn set_date_time(self, value: Timestamp) -> Self {
        self.set_param(QueryParam::DateTime(value))
    }

    pub fn order_by(mut self, property: impl Into<String>) -> Self {
        self.order_by = property.into();
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    pub fn start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    /// Page size; clamped to the configured maximum.
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Parse, bind, compile and evaluate, returning one ordered page.
    ///
    /// Fails with `ParamCount` when the bound parameters do not match the
    /// placeholders, `Parse` on malformed text, and the other query errors
    /// on invalid function use.
    pub fn query(&self) -> RegistryResult<ResultSet<B::Session>> {
        let parsed = parse(&self.template)?;
        let bound = bind(&parsed, &self.params)?;

        let reader = self.registry.reader()?;
        let ontologies = reader.ontologies()?;
        let classifier = Classifier::new(&ontologies);
        let plan = compile(&bound, &classifier)?;
        let catalog = Catalog::new(reader.artifacts()?);

        let mut selected = Evaluator::new(&catalog, classifier).select(&plan);
        sort_artifacts(&mut selected, &self.order_by, self.ascending);

        let total = selected.len();
        let page_size = self.registry.config().page_size(self.count);
        let page: Vec<String> = selected
            .iter()
            .skip(self.start_index)
            .take(page_size)
            .map(|a| a.uuid_str().to_string())
            .collect();

        tracing::debug!(
            query = %self.template,
            parameters = self.params.len(),
            scanned = catalog.len(),
            total,
            returned = page.len(),
            "Query evaluated"
        );
        Ok(ResultSet::new(reader, page, total, self.start_index))
    }
}
