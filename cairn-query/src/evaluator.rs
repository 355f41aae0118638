//! Plan evaluation over a snapshot of live artifacts.

use crate::compiler::*;
use crate::parser::CompareOp;
use cairn_core::{Artifact, Classifier, Relationship, Target, Timestamp, RELATED_DOCUMENT};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

// ============================================================================
// FIELD VALUES
// ============================================================================

/// A resolved field value, typed for comparison and ordering.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Time(Timestamp),
}

impl FieldValue {
    /// Display form, used for projections.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Time(t) => t.to_rfc3339(),
        }
    }

    /// Total order within a type; mixed types compare by display form.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (a, b) => a.as_text().cmp(&b.as_text()),
        }
    }
}

/// The relationship and target an artifact was reached through.
pub type Link<'a> = (&'a Relationship, &'a Target);

/// Value of `field` on `artifact`, or `None` when absent.
pub fn field_value(artifact: &Artifact, field: &Field, link: Option<Link<'_>>) -> Option<FieldValue> {
    let text = |s: &str| Some(FieldValue::Text(s.to_string()));
    match field {
        Field::Core(core) => match core {
            CoreField::Uuid => artifact.uuid.as_deref().and_then(text),
            CoreField::Name => text(&artifact.name),
            CoreField::Description => artifact.description.as_deref().and_then(text),
            CoreField::Version => artifact.version.as_deref().and_then(text),
            CoreField::CreatedBy => artifact.created_by.as_deref().and_then(text),
            CoreField::CreatedTimestamp => artifact.created_timestamp.map(FieldValue::Time),
            CoreField::LastModifiedBy => artifact.last_modified_by.as_deref().and_then(text),
            CoreField::LastModifiedTimestamp => {
                artifact.last_modified_timestamp.map(FieldValue::Time)
            }
            CoreField::ContentType => text(&artifact.artifact_type.mime_type),
            CoreField::ContentSize => artifact
                .content
                .as_ref()
                .map(|c| FieldValue::Number(c.size as f64)),
            CoreField::ContentHash => artifact.content.as_ref().and_then(|c| text(&c.hash)),
            CoreField::ContentEncoding => artifact
                .content
                .as_ref()
                .and_then(|c| c.encoding.as_deref())
                .and_then(text),
            CoreField::ExtendedType => artifact.artifact_type.extended_type.as_deref().and_then(text),
            CoreField::Derived => Some(FieldValue::Bool(artifact.derived)),
            CoreField::TargetNamespace => artifact.target_namespace().and_then(text),
            CoreField::Namespace => artifact.namespace().and_then(text),
            CoreField::NcName => artifact.nc_name().and_then(text),
        },
        Field::Custom(name) => artifact.property(name).and_then(text),
        Field::RelationshipAttribute(key) => {
            link.and_then(|(rel, _)| rel.attributes.get(key)).and_then(|v| text(v))
        }
        Field::TargetAttribute(key) => {
            link.and_then(|(_, target)| target.attributes.get(key)).and_then(|v| text(v))
        }
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

fn apply(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

/// Parse `YYYY-MM-DD` as the UTC day it names.
fn parse_day(s: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?;
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, start + Duration::days(1)))
}

/// A date literal covers its whole day: `=` means within the day, `<` means
/// before it starts and `>` means after it ends.
fn compare_time(actual: &Timestamp, op: CompareOp, expected: &Value) -> bool {
    let Value::Text(s) = expected else {
        return false;
    };
    if let Some((start, end)) = parse_day(s) {
        let within = *actual >= start && *actual < end;
        return match op {
            CompareOp::Eq => within,
            CompareOp::Ne => !within,
            CompareOp::Lt => *actual < start,
            CompareOp::Le => *actual < end,
            CompareOp::Gt => *actual >= end,
            CompareOp::Ge => *actual >= start,
        };
    }
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(t) => apply(op, actual.cmp(&t.with_timezone(&Utc))),
        Err(_) => false,
    }
}

/// Compare an actual field value with a literal.
pub fn compare(actual: &FieldValue, op: CompareOp, expected: &Value) -> bool {
    match actual {
        FieldValue::Time(t) => compare_time(t, op, expected),
        FieldValue::Bool(b) => {
            let wanted = match expected {
                Value::Text(s) if s.eq_ignore_ascii_case("true") => true,
                Value::Text(s) if s.eq_ignore_ascii_case("false") => false,
                _ => return false,
            };
            match op {
                CompareOp::Eq => *b == wanted,
                CompareOp::Ne => *b != wanted,
                _ => false,
            }
        }
        FieldValue::Number(n) => {
            let wanted = match expected {
                Value::Number(m) => *m,
                Value::Text(s) => match as_number(s) {
                    Some(m) => m,
                    None => return false,
                },
            };
            compare_numbers(*n, op, wanted)
        }
        FieldValue::Text(s) => match expected {
            Value::Number(m) => match as_number(s) {
                Some(n) => compare_numbers(n, op, *m),
                None => apply(op, s.as_str().cmp(m.to_string().as_str())),
            },
            Value::Text(t) => match (as_number(s), as_number(t)) {
                (Some(n), Some(m)) => compare_numbers(n, op, m),
                _ => apply(op, s.as_str().cmp(t.as_str())),
            },
        },
    }
}

/// Finite numbers only; `"nan"` and `"inf"` stay text.
fn as_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn compare_numbers(actual: f64, op: CompareOp, expected: f64) -> bool {
    actual
        .partial_cmp(&expected)
        .map(|ord| apply(op, ord))
        .unwrap_or(false)
}

// ============================================================================
// CATALOG
// ============================================================================

/// The live artifacts of one snapshot, indexed by UUID.
pub struct Catalog {
    artifacts: Vec<Artifact>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(artifacts: Vec<Artifact>) -> Self {
        let index = artifacts
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.uuid.clone().map(|u| (u, i)))
            .collect();
        Self { artifacts, index }
    }

    pub fn get(&self, uuid: &str) -> Option<&Artifact> {
        self.index.get(uuid).map(|&i| &self.artifacts[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Evaluates a plan against a catalog.
pub struct Evaluator<'a> {
    catalog: &'a Catalog,
    classifier: Classifier<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a Catalog, classifier: Classifier<'a>) -> Self {
        Self {
            catalog,
            classifier,
        }
    }

    /// Artifacts selected by the plan, in catalog order, without duplicates.
    pub fn select(&self, plan: &QueryPlan) -> Vec<&'a Artifact> {
        let roots = self.catalog.iter().filter(|&a| {
            in_location(a, plan)
                && plan
                    .predicate
                    .as_ref()
                    .map(|p| self.matches(p, a, None))
                    .unwrap_or(true)
        });

        let Some(steps) = &plan.steps else {
            return roots.collect();
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for root in roots {
            self.reach(root, steps, &mut seen, &mut out);
        }
        out
    }

    fn reach(
        &self,
        from: &'a Artifact,
        step: &Step,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<&'a Artifact>,
    ) {
        for (link, target) in self.hop(from, &step.relationship) {
            if !self.step_accepts(step, target, link) {
                continue;
            }
            match &step.next {
                Some(next) => self.reach(target, next, seen, out),
                None => {
                    if seen.insert(target.uuid_str()) {
                        out.push(target);
                    }
                }
            }
        }
    }

    /// Live artifacts one relationship hop away, with the link used.
    fn hop(&self, from: &'a Artifact, relationship: &str) -> Vec<(Option<Link<'a>>, &'a Artifact)> {
        if relationship == RELATED_DOCUMENT {
            return from
                .related_document
                .as_deref()
                .and_then(|uuid| self.catalog.get(uuid))
                .map(|doc| vec![(None, doc)])
                .unwrap_or_default();
        }
        from.relationships
            .iter()
            .filter(|rel| rel.name == relationship)
            .flat_map(|rel| {
                rel.targets.iter().filter_map(move |target| {
                    self.catalog
                        .get(&target.uuid)
                        .map(|artifact| (Some((rel, target)), artifact))
                })
            })
            .collect()
    }

    fn step_accepts(&self, step: &Step, target: &'a Artifact, link: Option<Link<'a>>) -> bool {
        step.predicate
            .as_ref()
            .map(|p| self.matches(p, target, link))
            .unwrap_or(true)
    }

    /// True when some target of the step satisfies its predicate and, for
    /// multi-level paths, the rest of the path.
    fn navigate(&self, from: &'a Artifact, step: &Step) -> bool {
        self.hop(from, &step.relationship)
            .into_iter()
            .any(|(link, target)| {
                self.step_accepts(step, target, link)
                    && step
                        .next
                        .as_ref()
                        .map(|next| self.navigate(target, next))
                        .unwrap_or(true)
            })
    }

    pub fn matches(&self, predicate: &Predicate, artifact: &'a Artifact, link: Option<Link<'a>>) -> bool {
        match predicate {
            Predicate::And(left, right) => {
                self.matches(left, artifact, link) && self.matches(right, artifact, link)
            }
            Predicate::Or(left, right) => {
                self.matches(left, artifact, link) || self.matches(right, artifact, link)
            }
            Predicate::Not(inner) => !self.matches(inner, artifact, link),
            Predicate::Compare { field, op, value } => field_value(artifact, field, link)
                .map(|actual| compare(&actual, *op, value))
                .unwrap_or(false),
            Predicate::Exists(field) => field_value(artifact, field, link).is_some(),
            Predicate::Matches { field, regex } => field_value(artifact, field, link)
                .map(|actual| regex.is_match(&actual.as_text()))
                .unwrap_or(false),
            Predicate::FullText(needle) => full_text(artifact, needle),
            Predicate::Classified {
                uris,
                mode,
                normalized,
            } => {
                let classes = if *normalized {
                    self.normalized_classes(artifact)
                } else {
                    artifact.classified_by.iter().cloned().collect()
                };
                match mode {
                    ClassMatch::All => uris.is_subset(&classes),
                    ClassMatch::Any => !uris.is_disjoint(&classes),
                }
            }
            Predicate::Navigate(step) => self.navigate(artifact, step),
        }
    }

    /// The artifact's classes plus all their ancestors. A class whose
    /// ontology has since been removed still counts as itself.
    fn normalized_classes(&self, artifact: &Artifact) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for uri in &artifact.classified_by {
            match self.classifier.normalize(uri) {
                Ok(set) => out.extend(set),
                Err(_) => {
                    out.insert(uri.clone());
                }
            }
        }
        out
    }
}

fn in_location(artifact: &Artifact, plan: &QueryPlan) -> bool {
    let model_ok = plan
        .model
        .as_deref()
        .map(|m| artifact.artifact_type.model() == m)
        .unwrap_or(true);
    let type_ok = plan
        .type_name
        .as_deref()
        .map(|t| artifact.artifact_type.type_name() == t)
        .unwrap_or(true);
    model_ok && type_ok
}

/// Case-insensitive substring search over name, description, property
/// values and comments. `needle` is already lowercased.
fn full_text(artifact: &Artifact, needle: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(needle);
    hit(&artifact.name)
        || artifact.description.as_deref().map(hit).unwrap_or(false)
        || artifact.properties.iter().any(|p| hit(&p.value))
        || artifact.comments.iter().any(|c| hit(&c.text))
}

// ============================================================================
// TESTS
// ============================================================================
