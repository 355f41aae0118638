//! Lazy, forward-only query results.

use crate::compiler::Field;
use crate::evaluator::field_value;
use cairn_core::{Artifact, RegistryResult};
use cairn_storage::{ArtifactReader, BackendSession};
use std::cmp::Ordering;

/// One page of query results, read on demand from the snapshot the query
/// ran against.
///
/// Iteration is forward-only and cannot be restarted. The underlying read
/// session stays open until [`ResultSet::close`] or drop.
pub struct ResultSet<S: BackendSession> {
    reader: ArtifactReader<S>,
    pending: std::vec::IntoIter<String>,
    total: usize,
    start_index: usize,
    page_len: usize,
}

impl<S: BackendSession> ResultSet<S> {
    pub(crate) fn new(
        reader: ArtifactReader<S>,
        page: Vec<String>,
        total: usize,
        start_index: usize,
    ) -> Self {
        Self {
            page_len: page.len(),
            pending: page.into_iter(),
            reader,
            total,
            start_index,
        }
    }

    /// Number of matches before pagination.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Size of this page.
    pub fn page_len(&self) -> usize {
        self.page_len
    }

    /// Whether matches exist beyond this page.
    pub fn has_more(&self) -> bool {
        self.start_index + self.page_len < self.total
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }

    /// Release the read session. Iteration ends; closing twice is a no-op.
    pub fn close(&mut self) -> RegistryResult<()> {
        self.pending = Vec::new().into_iter();
        self.reader.close()
    }
}

impl<S: BackendSession> Iterator for ResultSet<S> {
    type Item = RegistryResult<Artifact>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_closed() {
            return None;
        }
        loop {
            let uuid = self.pending.next()?;
            match self.reader.artifact(&uuid) {
                Ok(Some(artifact)) => return Some(Ok(artifact)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.len()))
    }
}

/// Sort by a property. Artifacts without a value come first in either
/// direction; ties fall back to UUID order.
pub fn sort_artifacts(artifacts: &mut [&Artifact], order_by: &str, ascending: bool) {
    let field = Field::property(order_by);
    artifacts.sort_by_cached_key(|a| SortKey {
        value: field_value(a, &field, None),
        uuid: a.uuid_str().to_string(),
        ascending,
    });
}

struct SortKey {
    value: Option<crate::evaluator::FieldValue>,
    uuid: String,
    ascending: bool,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_value = match (&self.value, &other.value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) if self.ascending => a.sort_cmp(b),
            (Some(a), Some(b)) => b.sort_cmp(a),
        };
        by_value.then_with(|| self.uuid.cmp(&other.uuid))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

// ============================================================================
// TESTS
// ============================================================================
