//! Query Compiler - Transform a bound AST into an executable plan
//!
//! The compiler validates what the grammar cannot: function names and
//! arities, argument shapes, where attribute functions may appear, regex
//! syntax and classifier tokens. The resulting plan holds compiled regexes
//! and canonical class URIs so evaluation never fails.
//!
//! # Pipeline
//!
//! ```text
//! Query text → Lexer → Parser → AST → bind(params) → Compiler → QueryPlan → Evaluator
//! ```

use crate::parser::*;
use cairn_core::{Classifier, QueryError, RegistryResult, RELATED_DOCUMENT};
use regex::Regex;
use std::collections::BTreeSet;

// ============================================================================
// PLAN TYPES
// ============================================================================

/// Built-in artifact fields addressable as `@name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreField {
    Uuid,
    Name,
    Description,
    Version,
    CreatedBy,
    CreatedTimestamp,
    LastModifiedBy,
    LastModifiedTimestamp,
    ContentType,
    ContentSize,
    ContentHash,
    ContentEncoding,
    ExtendedType,
    Derived,
    TargetNamespace,
    Namespace,
    NcName,
}

impl CoreField {
    pub fn from_name(name: &str) -> Option<CoreField> {
        let field = match name {
            "uuid" => CoreField::Uuid,
            "name" => CoreField::Name,
            "description" => CoreField::Description,
            "version" => CoreField::Version,
            "createdBy" => CoreField::CreatedBy,
            "createdTimestamp" => CoreField::CreatedTimestamp,
            "lastModifiedBy" => CoreField::LastModifiedBy,
            "lastModifiedTimestamp" => CoreField::LastModifiedTimestamp,
            "contentType" => CoreField::ContentType,
            "contentSize" => CoreField::ContentSize,
            "contentHash" => CoreField::ContentHash,
            "contentEncoding" => CoreField::ContentEncoding,
            "extendedType" => CoreField::ExtendedType,
            "derived" => CoreField::Derived,
            "targetNamespace" => CoreField::TargetNamespace,
            "namespace" => CoreField::Namespace,
            "ncName" => CoreField::NcName,
            _ => return None,
        };
        Some(field)
    }
}

/// Where a compared value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Core(CoreField),
    Custom(String),
    RelationshipAttribute(String),
    TargetAttribute(String),
}

impl Field {
    /// Core field when the name is built in, custom property otherwise.
    pub fn property(name: &str) -> Field {
        CoreField::from_name(name)
            .map(Field::Core)
            .unwrap_or_else(|| Field::Custom(name.to_string()))
    }
}

/// A bound literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassMatch {
    All,
    Any,
}

#[derive(Debug, Clone)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Compare {
        field: Field,
        op: CompareOp,
        value: Value,
    },
    Exists(Field),
    /// Full match of a field against a regex.
    Matches { field: Field, regex: Regex },
    /// Case-insensitive search; the needle is stored lowercased.
    FullText(String),
    Classified {
        uris: BTreeSet<String>,
        mode: ClassMatch,
        /// Match against ancestors of the artifact's classes as well.
        normalized: bool,
    },
    Navigate(Step),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub relationship: String,
    pub predicate: Option<Box<Predicate>>,
    pub next: Option<Box<Step>>,
}

impl Step {
    /// `relatedDocument` hops to the primary and carries no relationship
    /// context.
    pub fn is_related_document(&self) -> bool {
        self.relationship == RELATED_DOCUMENT
    }
}

/// Executable form of a bound query.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub model: Option<String>,
    pub type_name: Option<String>,
    pub predicate: Option<Predicate>,
    pub steps: Option<Step>,
}

// ============================================================================
// COMPILER
// ============================================================================

/// Compile a bound query against the classifier's ontologies.
pub fn compile(query: &Query, classifier: &Classifier<'_>) -> RegistryResult<QueryPlan> {
    let compiler = Compiler { classifier };
    let predicate = query
        .predicate
        .as_ref()
        .map(|p| compiler.expr(p, false))
        .transpose()?;
    let steps = query.steps.as_ref().map(|s| compiler.step(s)).transpose()?;
    Ok(QueryPlan {
        model: query.path.model.clone(),
        type_name: query.path.type_name.clone(),
        predicate,
        steps,
    })
}

struct Compiler<'c, 'o> {
    classifier: &'c Classifier<'o>,
}

impl Compiler<'_, '_> {
    /// `in_relationship` is true while compiling the predicate of a
    /// relationship step, where attribute functions are allowed.
    fn expr(&self, expr: &Expr, in_relationship: bool) -> RegistryResult<Predicate> {
        Ok(match expr {
            Expr::And(left, right) => Predicate::And(
                Box::new(self.expr(left, in_relationship)?),
                Box::new(self.expr(right, in_relationship)?),
            ),
            Expr::Or(left, right) => Predicate::Or(
                Box::new(self.expr(left, in_relationship)?),
                Box::new(self.expr(right, in_relationship)?),
            ),
            Expr::Comparison { operand, op, value } => Predicate::Compare {
                field: self.operand(operand, in_relationship)?,
                op: *op,
                value: literal_value(value)?,
            },
            Expr::Exists(operand) => Predicate::Exists(self.operand(operand, in_relationship)?),
            Expr::Path(step) => Predicate::Navigate(self.step(step)?),
            Expr::Call(call) => self.call(call, in_relationship)?,
        })
    }

    fn step(&self, step: &PathStep) -> RegistryResult<Step> {
        let in_relationship = step.relationship != RELATED_DOCUMENT;
        Ok(Step {
            relationship: step.relationship.clone(),
            predicate: step
                .predicate
                .as_ref()
                .map(|p| self.expr(p, in_relationship).map(Box::new))
                .transpose()?,
            next: step
                .next
                .as_ref()
                .map(|n| self.step(n).map(Box::new))
                .transpose()?,
        })
    }

    fn operand(&self, operand: &Operand, in_relationship: bool) -> RegistryResult<Field> {
        match operand {
            Operand::Property(name) => Ok(Field::property(name)),
            Operand::Call(call) => {
                let qualified = call.qualified_name();
                let name = function_name(call, &[None, Some("s-ramp")])
                    .ok_or_else(|| unsupported(&qualified))?;
                if name != "getRelationshipAttribute" && name != "getTargetAttribute" {
                    return Err(unsupported(&qualified));
                }
                if !in_relationship {
                    return Err(QueryError::InvalidContext {
                        reason: format!("{} is only valid inside a relationship predicate", qualified),
                    }
                    .into());
                }
                let key = match call.args.as_slice() {
                    [Argument::Context, Argument::Literal(Literal::String(key))] => key.clone(),
                    _ => {
                        return Err(invalid_argument(
                            &qualified,
                            "expected (., 'attributeName')",
                        ))
                    }
                };
                Ok(if name == "getRelationshipAttribute" {
                    Field::RelationshipAttribute(key)
                } else {
                    Field::TargetAttribute(key)
                })
            }
        }
    }

    fn call(&self, call: &FunctionCall, in_relationship: bool) -> RegistryResult<Predicate> {
        let qualified = call.qualified_name();
        match call.name.as_str() {
            "not" if function_name(call, &[None, Some("fn")]).is_some() => {
                match call.args.as_slice() {
                    [Argument::Expr(inner)] => {
                        Ok(Predicate::Not(Box::new(self.expr(inner, in_relationship)?)))
                    }
                    _ => Err(invalid_argument(&qualified, "expected one predicate argument")),
                }
            }
            "matches" if function_name(call, &[None, Some("fn"), Some("xp2")]).is_some() => {
                self.matches(call, &qualified, in_relationship)
            }
            "classifiedByAllOf"
            | "classifiedByAnyOf"
            | "exactlyClassifiedByAllOf"
            | "exactlyClassifiedByAnyOf"
                if function_name(call, &[None, Some("s-ramp")]).is_some() =>
            {
                self.classified(call, &qualified)
            }
            _ => Err(unsupported(&qualified)),
        }
    }

    fn matches(
        &self,
        call: &FunctionCall,
        qualified: &str,
        in_relationship: bool,
    ) -> RegistryResult<Predicate> {
        let (subject, pattern) = match call.args.as_slice() {
            [subject, Argument::Literal(Literal::String(pattern))] => (subject, pattern),
            _ => {
                return Err(invalid_argument(
                    qualified,
                    "expected a subject and a string pattern",
                ))
            }
        };
        match subject {
            Argument::Context => Ok(Predicate::FullText(pattern.to_lowercase())),
            Argument::Expr(Expr::Exists(operand)) => {
                let field = self.operand(operand, in_relationship)?;
                let regex = Regex::new(&format!("^(?:{})$", pattern))
                    .map_err(|e| invalid_argument(qualified, &e.to_string()))?;
                Ok(Predicate::Matches { field, regex })
            }
            _ => Err(invalid_argument(
                qualified,
                "first argument must be '.' or a property",
            )),
        }
    }

    fn classified(&self, call: &FunctionCall, qualified: &str) -> RegistryResult<Predicate> {
        let (first, rest) = match call.args.split_first() {
            Some(split) => split,
            None => return Err(invalid_argument(qualified, "expected '.' and at least one class")),
        };
        if *first != Argument::Context || rest.is_empty() {
            return Err(invalid_argument(qualified, "expected '.' and at least one class"));
        }
        let tokens = rest
            .iter()
            .map(|arg| match arg {
                Argument::Literal(Literal::String(token)) => Ok(token.as_str()),
                _ => Err(invalid_argument(qualified, "classes must be strings")),
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        let uris = self.classifier.resolve_all(tokens)?;
        let mode = if call.name.ends_with("AllOf") {
            ClassMatch::All
        } else {
            ClassMatch::Any
        };
        Ok(Predicate::Classified {
            uris,
            mode,
            normalized: !call.name.starts_with("exactly"),
        })
    }
}

/// The bare function name when its prefix is one of `allowed`.
fn function_name<'a>(call: &'a FunctionCall, allowed: &[Option<&str>]) -> Option<&'a str> {
    allowed
        .contains(&call.prefix.as_deref())
        .then_some(call.name.as_str())
}

fn literal_value(literal: &Literal) -> RegistryResult<Value> {
    match literal {
        Literal::String(s) => Ok(Value::Text(s.clone())),
        Literal::Number(n) => Ok(Value::Number(*n)),
        Literal::Parameter(index) => Err(QueryError::InvalidContext {
            reason: format!("parameter {} is unbound", index + 1),
        }
        .into()),
    }
}

fn unsupported(name: &str) -> cairn_core::RegistryError {
    QueryError::UnsupportedFunction {
        name: name.to_string(),
    }
    .into()
}

fn invalid_argument(function: &str, reason: &str) -> cairn_core::RegistryError {
    QueryError::InvalidArgument {
        function: function.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{ErrorKind, Ontology, RegistryError};

    fn world() -> Vec<Ontology> {
        let o = Ontology::new("http://example.org/world");
        let japan = o.create_class("Japan");
        let asia = o.create_class("Asia").with_child(japan);
        vec![o.clone().with_root(o.create_class("World").with_child(asia))]
    }

    fn compile_str(source: &str) -> RegistryResult<QueryPlan> {
        let ontologies = world();
        let query = parse(source)?;
        compile(&query, &Classifier::new(&ontologies))
    }

    fn query_error(result: RegistryResult<QueryPlan>) -> QueryError {
        match result {
            Err(RegistryError::Query(e)) => e,
            other => panic!("expected query error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_properties_map_to_core_or_custom() {
        assert_eq!(Field::property("createdTimestamp"), Field::Core(CoreField::CreatedTimestamp));
        assert_eq!(Field::property("owner"), Field::Custom("owner".into()));
    }

    #[test]
    fn test_compile_location_and_comparison() {
        let plan = compile_str("/core/Document[@version >= 2]").unwrap();
        assert_eq!(plan.model.as_deref(), Some("core"));
        assert_eq!(plan.type_name.as_deref(), Some("Document"));
        assert!(matches!(
            plan.predicate,
            Some(Predicate::Compare {
                field: Field::Core(CoreField::Version),
                op: CompareOp::Ge,
                value: Value::Number(n),
            }) if n == 2.0
        ));
    }

    #[test]
    fn test_unknown_function_unsupported() {
        let err = query_error(compile_str("/s-ramp[fn:upper-case(@name)]"));
        assert_eq!(
            err,
            QueryError::UnsupportedFunction {
                name: "fn:upper-case".into()
            }
        );
        let err = query_error(compile_str("/s-ramp[s-ramp:not(@name)]"));
        assert!(matches!(err, QueryError::UnsupportedFunction { .. }));
    }

    #[test]
    fn test_function_arity_checked() {
        assert!(matches!(
            query_error(compile_str("/s-ramp[not(@a, @b)]")),
            QueryError::InvalidArgument { .. }
        ));
        assert!(matches!(
            query_error(compile_str("/s-ramp[matches(@name)]")),
            QueryError::InvalidArgument { .. }
        ));
        assert!(matches!(
            query_error(compile_str("/s-ramp[classifiedByAnyOf(.)]")),
            QueryError::InvalidArgument { .. }
        ));
        assert!(matches!(
            query_error(compile_str("/s-ramp[classifiedByAnyOf('Japan', 'Asia')]")),
            QueryError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_invalid_regex_is_invalid_argument() {
        let err = query_error(compile_str("/s-ramp[matches(@name, '(')]"));
        assert!(matches!(err, QueryError::InvalidArgument { ref function, .. } if function == "matches"));
    }

    #[test]
    fn test_full_text_needle_lowercased() {
        let plan = compile_str("/s-ramp[xp2:matches(., 'HeLLo')]").unwrap();
        assert!(matches!(plan.predicate, Some(Predicate::FullText(ref s)) if s == "hello"));
    }

    #[test]
    fn test_classifiers_resolved_to_uris() {
        let plan = compile_str("/s-ramp[s-ramp:exactlyClassifiedByAllOf(., 'Japan', 'Asia')]").unwrap();
        let Some(Predicate::Classified {
            uris,
            mode,
            normalized,
        }) = plan.predicate
        else {
            panic!("expected classifier predicate");
        };
        assert_eq!(mode, ClassMatch::All);
        assert!(!normalized);
        assert!(uris.contains("http://example.org/world#Japan"));
        assert!(uris.contains("http://example.org/world#Asia"));
    }

    #[test]
    fn test_unknown_class_not_found() {
        let err = compile_str("/s-ramp[classifiedByAnyOf(., 'Atlantis')]").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_attribute_functions_need_relationship_context() {
        let err = query_error(compile_str("/s-ramp[getTargetAttribute(., 'k') = 'v']"));
        assert!(matches!(err, QueryError::InvalidContext { .. }));

        let err = query_error(compile_str(
            "/s-ramp[relatedDocument[getRelationshipAttribute(., 'k')]]",
        ));
        assert!(matches!(err, QueryError::InvalidContext { .. }));

        let plan = compile_str("/s-ramp[dependsOn[s-ramp:getRelationshipAttribute(., 'k') = 'v']]").unwrap();
        let Some(Predicate::Navigate(step)) = plan.predicate else {
            panic!("expected navigation");
        };
        assert!(matches!(
            step.predicate.as_deref(),
            Some(Predicate::Compare {
                field: Field::RelationshipAttribute(k),
                ..
            }) if k == "k"
        ));
    }

    #[test]
    fn test_attribute_function_in_top_level_step() {
        let plan = compile_str("/s-ramp/core/Document/dependsOn[getTargetAttribute(., 'w')]").unwrap();
        let step = plan.steps.expect("steps");
        assert!(matches!(
            step.predicate.as_deref(),
            Some(Predicate::Exists(Field::TargetAttribute(k))) if k == "w"
        ));
    }

    #[test]
    fn test_unbound_parameter_rejected() {
        let err = query_error(compile_str("/s-ramp[@name = ?]"));
        assert!(matches!(err, QueryError::InvalidContext { .. }));
    }
}
