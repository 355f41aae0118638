//! Pretty printer for query ASTs
//!
//! Prints the canonical form: explicit `/s-ramp` prefix, single quotes,
//! spaces around operators and parentheses only where precedence needs them.

use crate::parser::*;
use std::fmt::Write;

/// Pretty-print a Query back to query text.
pub fn pretty_print(query: &Query) -> String {
    let mut out = String::new();
    print_location(&query.path, &mut out);
    if let Some(predicate) = &query.predicate {
        out.push('[');
        print_expr(predicate, &mut out);
        out.push(']');
    }
    if let Some(step) = &query.steps {
        out.push('/');
        print_step(step, &mut out);
    }
    out
}

fn print_location(path: &LocationPath, out: &mut String) {
    match (&path.model, &path.type_name) {
        (None, Some(type_name)) => {
            let _ = write!(out, "//{}", type_name);
        }
        (model, type_name) => {
            out.push_str("/s-ramp");
            if let Some(model) = model {
                let _ = write!(out, "/{}", model);
            }
            if let Some(type_name) = type_name {
                let _ = write!(out, "/{}", type_name);
            }
        }
    }
}

fn print_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::And(left, right) => {
            print_grouped(left, matches!(**left, Expr::And(..)), out);
            out.push_str(" and ");
            print_expr(right, out);
        }
        Expr::Or(left, right) => {
            print_grouped(left, matches!(**left, Expr::And(..) | Expr::Or(..)), out);
            out.push_str(" or ");
            print_grouped(right, matches!(**right, Expr::And(..)), out);
        }
        Expr::Comparison { operand, op, value } => {
            print_operand(operand, out);
            let _ = write!(out, " {} ", op.symbol());
            print_literal(value, out);
        }
        Expr::Exists(operand) => print_operand(operand, out),
        Expr::Path(step) => print_step(step, out),
        Expr::Call(call) => print_call(call, out),
    }
}

fn print_grouped(expr: &Expr, parenthesize: bool, out: &mut String) {
    if parenthesize {
        out.push('(');
        print_expr(expr, out);
        out.push(')');
    } else {
        print_expr(expr, out);
    }
}

fn print_operand(operand: &Operand, out: &mut String) {
    match operand {
        Operand::Property(name) => {
            let _ = write!(out, "@{}", name);
        }
        Operand::Call(call) => print_call(call, out),
    }
}

fn print_step(step: &PathStep, out: &mut String) {
    out.push_str(&step.relationship);
    if let Some(predicate) = &step.predicate {
        out.push('[');
        print_expr(predicate, out);
        out.push(']');
    }
    if let Some(next) = &step.next {
        out.push('/');
        print_step(next, out);
    }
}

fn print_call(call: &FunctionCall, out: &mut String) {
    out.push_str(&call.qualified_name());
    out.push('(');
    for (i, arg) in call.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match arg {
            Argument::Context => out.push('.'),
            Argument::Literal(literal) => print_literal(literal, out),
            Argument::Expr(expr) => print_expr(expr, out),
        }
    }
    out.push(')');
}

fn print_literal(literal: &Literal, out: &mut String) {
    match literal {
        Literal::String(s) => {
            let _ = write!(out, "'{}'", s.replace('\'', "''"));
        }
        Literal::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Literal::Parameter(_) => out.push('?'),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn printed(source: &str) -> String {
        pretty_print(&parse(source).expect("query parses"))
    }

    #[test]
    fn test_print_canonical_location() {
        assert_eq!(printed("/xsd/XsdDocument"), "/s-ramp/xsd/XsdDocument");
        assert_eq!(printed("//PortType"), "//PortType");
        assert_eq!(printed("/s-ramp"), "/s-ramp");
    }

    #[test]
    fn test_print_quotes_and_numbers() {
        assert_eq!(
            printed(r#"/core[@name="it's" and @size>=2.5]"#),
            "/s-ramp/core[@name = 'it''s' and @size >= 2.5]"
        );
    }

    #[test]
    fn test_print_keeps_needed_parentheses() {
        assert_eq!(printed("/core[(@a and @b) or @c]"), "/s-ramp/core[(@a and @b) or @c]");
        assert_eq!(printed("/core[@a and (@b or @c)]"), "/s-ramp/core[@a and @b or @c]");
    }

    #[test]
    fn test_print_calls_and_steps() {
        assert_eq!(
            printed("/wsdl/PortType[s-ramp:classifiedByAllOf(.,'Japan')]/operation[@name=?]"),
            "/s-ramp/wsdl/PortType[s-ramp:classifiedByAllOf(., 'Japan')]/operation[@name = ?]"
        );
    }
}
