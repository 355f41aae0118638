//! Positional parameter binding.
//!
//! Placeholders are counted by the parser, so a `?` inside a quoted string
//! is never mistaken for a parameter.

use crate::parser::*;
use cairn_core::{QueryError, RegistryResult, Timestamp};
use chrono::{NaiveDate, SecondsFormat};

/// A value bound to one `?`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    String(String),
    Number(f64),
    /// Binds as `YYYY-MM-DD`.
    Date(NaiveDate),
    /// Binds as an RFC 3339 timestamp with second precision.
    DateTime(Timestamp),
}

impl QueryParam {
    fn to_literal(&self) -> Literal {
        match self {
            QueryParam::String(s) => Literal::String(s.clone()),
            QueryParam::Number(n) => Literal::Number(*n),
            QueryParam::Date(d) => Literal::String(d.format("%Y-%m-%d").to_string()),
            QueryParam::DateTime(t) => {
                Literal::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

impl From<&str> for QueryParam {
    fn from(s: &str) -> Self {
        QueryParam::String(s.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(s: String) -> Self {
        QueryParam::String(s)
    }
}

impl From<f64> for QueryParam {
    fn from(n: f64) -> Self {
        QueryParam::Number(n)
    }
}

impl From<i64> for QueryParam {
    fn from(n: i64) -> Self {
        QueryParam::Number(n as f64)
    }
}

/// Substitute `params` for the placeholders of `query`, in order.
///
/// Fails with `ParamCount` unless exactly one value is given per
/// placeholder.
pub fn bind(query: &Query, params: &[QueryParam]) -> RegistryResult<Query> {
    if query.parameters != params.len() {
        return Err(QueryError::ParamCount {
            expected: query.parameters,
            got: params.len(),
        }
        .into());
    }

    let mut bound = query.clone();
    if let Some(predicate) = bound.predicate.as_mut() {
        bind_expr(predicate, params);
    }
    if let Some(step) = bound.steps.as_mut() {
        bind_step(step, params);
    }
    bound.parameters = 0;
    Ok(bound)
}

fn bind_expr(expr: &mut Expr, params: &[QueryParam]) {
    match expr {
        Expr::And(left, right) | Expr::Or(left, right) => {
            bind_expr(left, params);
            bind_expr(right, params);
        }
        Expr::Comparison { operand, value, .. } => {
            bind_operand(operand, params);
            bind_literal(value, params);
        }
        Expr::Exists(operand) => bind_operand(operand, params),
        Expr::Path(step) => bind_step(step, params),
        Expr::Call(call) => bind_call(call, params),
    }
}

fn bind_operand(operand: &mut Operand, params: &[QueryParam]) {
    if let Operand::Call(call) = operand {
        bind_call(call, params);
    }
}

fn bind_call(call: &mut FunctionCall, params: &[QueryParam]) {
    for arg in call.args.iter_mut() {
        match arg {
            Argument::Context => {}
            Argument::Literal(literal) => bind_literal(literal, params),
            Argument::Expr(expr) => bind_expr(expr, params),
        }
    }
}

fn bind_step(step: &mut PathStep, params: &[QueryParam]) {
    if let Some(predicate) = step.predicate.as_mut() {
        bind_expr(predicate, params);
    }
    if let Some(next) = step.next.as_mut() {
        bind_step(next, params);
    }
}

fn bind_literal(literal: &mut Literal, params: &[QueryParam]) {
    if let Literal::Parameter(index) = literal {
        if let Some(param) = params.get(*index) {
            *literal = param.to_literal();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::{ErrorKind, RegistryError};
    use chrono::TimeZone;

    fn query(source: &str) -> Query {
        parse(source).expect("query parses")
    }

    #[test]
    fn test_bind_substitutes_in_order() {
        let q = query("/wsdl/PortType[@name = ?]/operation[@name = ?]");
        let bound = bind(&q, &["p".into(), "op".into()]).unwrap();
        assert_eq!(bound.parameters, 0);
        assert_eq!(
            crate::pretty_printer::pretty_print(&bound),
            "/s-ramp/wsdl/PortType[@name = 'p']/operation[@name = 'op']"
        );
    }

    #[test]
    fn test_bind_too_few_and_too_many() {
        let q = query("/core[@a = ? and @b = ?]");
        let err = bind(&q, &["x".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamCount);
        assert_eq!(
            err,
            RegistryError::from(QueryError::ParamCount {
                expected: 2,
                got: 1
            })
        );

        let err = bind(&q, &["x".into(), "y".into(), "z".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamCount);
    }

    #[test]
    fn test_question_mark_inside_string_is_not_a_parameter() {
        let q = query("/core[@name = 'why?']");
        assert_eq!(q.parameters, 0);
        assert!(bind(&q, &[]).is_ok());
        assert!(bind(&q, &["x".into()]).is_err());
    }

    #[test]
    fn test_bind_typed_values() {
        let q = query("/core[@size > ? and @createdTimestamp >= ? and matches(@name, ?) and @t < ?]");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let stamp = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let bound = bind(
            &q,
            &[
                QueryParam::from(10_i64),
                QueryParam::Date(date),
                "re.*".into(),
                QueryParam::DateTime(stamp),
            ],
        )
        .unwrap();
        assert_eq!(
            crate::pretty_printer::pretty_print(&bound),
            "/s-ramp/core[@size > 10 and @createdTimestamp >= '2024-03-01' and matches(@name, 're.*') and @t < '2024-03-01T12:30:00Z']"
        );
    }
}
