//! Constraint checker
//!
//! A [`Constraint`] tree is compiled once, against a layout, into a boxed
//! [`ConstraintChecker`]. Checks take the tuple mutably because a full-text
//! predicate records its relevance score in the selector's score slot.

use crate::error::{Error, Result};
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::operand::{create_dynamic_operation, location_at, DynamicOperation};
use crate::model::{Constraint, Operator, StaticOperand};
use crate::schema::TypeSystem;
use crate::value::{Location, Path, Value};
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Per-tuple accept/reject check
pub trait ConstraintChecker: Send + Sync {
    /// Whether the tuple satisfies the constraint; may write score slots
    fn satisfies(&self, tuple: &mut [Value]) -> bool;
}

impl<F> ConstraintChecker for F
where
    F: Fn(&mut [Value]) -> bool + Send + Sync,
{
    fn satisfies(&self, tuple: &mut [Value]) -> bool {
        self(tuple)
    }
}

/// A boxed checker
pub type BoxedChecker = Box<dyn ConstraintChecker>;

/// Translate a LIKE pattern (`%`, `_`, `\` escape) into an anchored regex
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => expr.push_str(&regex::escape(&escaped.to_string())),
                None => expr.push_str(r"\\"),
            },
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|_| Error::conversion(pattern, "LIKE pattern"))
}

/// Right-hand side of a comparison, coerced to the operand's type
struct BoundValue {
    literal: Option<Value>,
    variable: Option<String>,
}

impl BoundValue {
    fn bind(types: &dyn TypeSystem, type_name: &str, operand: &StaticOperand) -> Result<Self> {
        Ok(match operand {
            StaticOperand::Literal(value) => Self {
                literal: Some(types.factory_or_default(type_name).create(value)?),
                variable: None,
            },
            StaticOperand::BindVariable(name) => Self {
                literal: None,
                variable: Some(name.clone()),
            },
        })
    }

    /// Current value; unbound or unconvertible variables yield `None`
    fn resolve(&self, ctx: &QueryContext, type_name: &str) -> Option<Cow<'_, Value>> {
        if let Some(literal) = &self.literal {
            return Some(Cow::Borrowed(literal));
        }
        let name = self.variable.as_deref()?;
        let raw = ctx.variable(name)?;
        match ctx.type_system().factory_or_default(type_name).create(&raw) {
            Ok(value) => Some(Cow::Owned(value)),
            Err(e) => {
                tracing::debug!("Variable '{}' cannot be used here: {}", name, e);
                None
            }
        }
    }
}

/// Elements of a multi-valued value, or the value itself
fn each_value(value: &Value) -> &[Value] {
    match value {
        Value::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn operator_accepts(operator: Operator, ordering: Ordering) -> bool {
    match operator {
        Operator::EqualTo => ordering == Ordering::Equal,
        Operator::NotEqualTo => ordering != Ordering::Equal,
        Operator::LessThan => ordering == Ordering::Less,
        Operator::LessThanOrEqualTo => ordering != Ordering::Greater,
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::GreaterThanOrEqualTo => ordering != Ordering::Less,
        Operator::Like => false,
    }
}

fn parse_location(path: &str) -> Result<Location> {
    Ok(Location::new(Path::parse(path)?))
}

/// Compile a constraint against a layout
pub fn create_checker(
    ctx: &QueryContext,
    layout: &ColumnLayout,
    constraint: &Constraint,
) -> Result<BoxedChecker> {
    match constraint {
        Constraint::And(left, right) => {
            let left = create_checker(ctx, layout, left)?;
            let right = create_checker(ctx, layout, right)?;
            Ok(Box::new(move |tuple: &mut [Value]| {
                left.satisfies(tuple) && right.satisfies(tuple)
            }))
        }
        Constraint::Or(left, right) => {
            let left = create_checker(ctx, layout, left)?;
            let right = create_checker(ctx, layout, right)?;
            Ok(Box::new(move |tuple: &mut [Value]| {
                left.satisfies(tuple) || right.satisfies(tuple)
            }))
        }
        Constraint::Not(inner) => {
            let inner = create_checker(ctx, layout, inner)?;
            Ok(Box::new(move |tuple: &mut [Value]| !inner.satisfies(tuple)))
        }
        Constraint::Comparison {
            operand,
            operator: Operator::Like,
            value,
        } => compile_like(ctx, layout, operand, value),
        Constraint::Comparison {
            operand,
            operator,
            value,
        } => {
            let operation = create_dynamic_operation(ctx, layout, operand)?;
            let type_name = operation.expected_type().to_string();
            let bound = BoundValue::bind(ctx.type_system().as_ref(), &type_name, value)?;
            let operator = *operator;
            let ctx = ctx.clone();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let actual = operation.evaluate(tuple);
                if actual.is_null() {
                    return false;
                }
                let Some(expected) = bound.resolve(&ctx, &type_name) else {
                    return false;
                };
                let factory = ctx.type_system().factory_or_default(&type_name);
                each_value(&actual)
                    .iter()
                    .filter(|v| !v.is_null())
                    .any(|v| operator_accepts(operator, factory.compare(v, &expected)))
            }))
        }
        Constraint::Between {
            operand,
            lower,
            upper,
            include_lower,
            include_upper,
        } => {
            let operation = create_dynamic_operation(ctx, layout, operand)?;
            let type_name = operation.expected_type().to_string();
            let types = ctx.type_system().as_ref();
            let lower = BoundValue::bind(types, &type_name, lower)?;
            let upper = BoundValue::bind(types, &type_name, upper)?;
            let (include_lower, include_upper) = (*include_lower, *include_upper);
            let ctx = ctx.clone();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let actual = operation.evaluate(tuple);
                if actual.is_null() {
                    return false;
                }
                let (Some(low), Some(high)) =
                    (lower.resolve(&ctx, &type_name), upper.resolve(&ctx, &type_name))
                else {
                    return false;
                };
                let factory = ctx.type_system().factory_or_default(&type_name);
                each_value(&actual).iter().filter(|v| !v.is_null()).any(|v| {
                    let above = match factory.compare(v, &low) {
                        Ordering::Greater => true,
                        Ordering::Equal => include_lower,
                        Ordering::Less => false,
                    };
                    let below = match factory.compare(v, &high) {
                        Ordering::Less => true,
                        Ordering::Equal => include_upper,
                        Ordering::Greater => false,
                    };
                    above && below
                })
            }))
        }
        Constraint::SetCriteria { operand, values } => {
            let operation = create_dynamic_operation(ctx, layout, operand)?;
            let type_name = operation.expected_type().to_string();
            let bound = values
                .iter()
                .map(|v| BoundValue::bind(ctx.type_system().as_ref(), &type_name, v))
                .collect::<Result<Vec<_>>>()?;
            let ctx = ctx.clone();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let actual = operation.evaluate(tuple);
                if actual.is_null() {
                    return false;
                }
                let factory = ctx.type_system().factory_or_default(&type_name);
                let candidates: Vec<Cow<'_, Value>> =
                    bound.iter().filter_map(|b| b.resolve(&ctx, &type_name)).collect();
                each_value(&actual).iter().filter(|v| !v.is_null()).any(|v| {
                    candidates.iter().any(|candidate| {
                        each_value(candidate)
                            .iter()
                            .any(|c| factory.compare(v, c) == Ordering::Equal)
                    })
                })
            }))
        }
        Constraint::PropertyExistence { selector, property } => {
            // The analyzer sees stored properties; a projected column is
            // only consulted without one
            let Some(analyzer) = ctx.analyzer().cloned() else {
                let checker: BoxedChecker = match layout.column_index_for_property(selector, property) {
                    Some(index) => Box::new(move |tuple: &mut [Value]| tuple.get(index).is_some_and(|v| !v.is_null())),
                    None => Box::new(|_: &mut [Value]| false),
                };
                return Ok(checker);
            };
            let location_index = layout.location_index(selector)?;
            let property = property.clone();
            let ctx = ctx.clone();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let Some(location) = location_at(tuple, location_index) else {
                    return false;
                };
                match analyzer.has_property(location, &property) {
                    Ok(found) => found,
                    Err(e) => {
                        ctx.add_error(format!("Property existence check failed: {}", e));
                        false
                    }
                }
            }))
        }
        Constraint::FullTextSearch {
            selector,
            property,
            expression,
        } => {
            let location_index = layout.location_index(selector)?;
            let Some(expression) = expression.clone() else {
                return Ok(Box::new(|_: &mut [Value]| false));
            };
            let Some(analyzer) = ctx.analyzer().cloned() else {
                // The access layer already applied the search
                return Ok(Box::new(|_: &mut [Value]| true));
            };
            let score_index = layout.score_index(selector);
            let property = property.clone();
            let ctx = ctx.clone();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let score = {
                    let Some(location) = location_at(tuple, location_index) else {
                        return false;
                    };
                    match analyzer.full_text_score(location, property.as_deref(), &expression) {
                        Ok(score) => score,
                        Err(e) => {
                            ctx.add_error(format!("Full-text search failed: {}", e));
                            return false;
                        }
                    }
                };
                // Matching rows were chosen by the access layer; this only
                // records the relevance
                if let Some(slot) = score_index.and_then(|i| tuple.get_mut(i)) {
                    let existing = slot.as_f64().unwrap_or(0.0);
                    *slot = Value::Double(existing.max(score));
                }
                true
            }))
        }
        Constraint::SameNode { selector, path } => {
            let location_index = layout.location_index(selector)?;
            let target = parse_location(path)?;
            let analyzer = ctx.analyzer().cloned();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let Some(location) = location_at(tuple, location_index) else {
                    return false;
                };
                match &analyzer {
                    Some(analyzer) => analyzer.is_same_node(location, &target),
                    None => location.path() == target.path(),
                }
            }))
        }
        Constraint::ChildNode {
            selector,
            parent_path,
        } => {
            let location_index = layout.location_index(selector)?;
            let parent = Path::parse(parent_path)?;
            Ok(Box::new(move |tuple: &mut [Value]| {
                location_at(tuple, location_index)
                    .and_then(|location| location.path().parent())
                    .is_some_and(|p| p == parent)
            }))
        }
        Constraint::DescendantNode {
            selector,
            ancestor_path,
        } => {
            let location_index = layout.location_index(selector)?;
            let ancestor = parse_location(ancestor_path)?;
            let analyzer = ctx.analyzer().cloned();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let Some(location) = location_at(tuple, location_index) else {
                    return false;
                };
                match &analyzer {
                    Some(analyzer) => analyzer.is_descendant_of(location, &ancestor),
                    None => location.path().is_descendant_of(ancestor.path()),
                }
            }))
        }
    }
}

fn compile_like(
    ctx: &QueryContext,
    layout: &ColumnLayout,
    operand: &crate::model::DynamicOperand,
    pattern: &StaticOperand,
) -> Result<BoxedChecker> {
    let operation: DynamicOperation = create_dynamic_operation(ctx, layout, operand)?;
    let matches = |regex: &Regex, actual: &Value| {
        each_value(actual)
            .iter()
            .filter(|v| !v.is_null())
            .any(|v| regex.is_match(&v.to_string()))
    };
    match pattern {
        StaticOperand::Literal(literal) => {
            let regex = like_to_regex(&literal.to_string())?;
            Ok(Box::new(move |tuple: &mut [Value]| {
                let actual = operation.evaluate(tuple);
                !actual.is_null() && matches(&regex, &actual)
            }))
        }
        StaticOperand::BindVariable(name) => {
            let name = name.clone();
            let ctx = ctx.clone();
            Ok(Box::new(move |tuple: &mut [Value]| {
                let actual = operation.evaluate(tuple);
                if actual.is_null() {
                    return false;
                }
                let Some(pattern) = ctx.variable(&name) else {
                    return false;
                };
                match like_to_regex(&pattern.to_string()) {
                    Ok(regex) => matches(&regex, &actual),
                    Err(e) => {
                        ctx.add_error(e.to_string());
                        false
                    }
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, DynamicOperand};
    use crate::schema::types::{LONG, STRING};
    use crate::schema::{ImmutableSchemata, StandardTypeSystem};
    use std::sync::Arc;

    struct FixedScores;

    impl crate::execution::analyzer::Analyzer for FixedScores {
        fn length(&self, value: &Value) -> i64 {
            value.to_string().len() as i64
        }

        fn has_property(&self, _location: &Location, property: &str) -> Result<bool> {
            Ok(property == "present")
        }

        fn full_text_score(
            &self,
            location: &Location,
            _property: Option<&str>,
            expression: &str,
        ) -> Result<f64> {
            if location.path().to_string().contains(expression) {
                Ok(0.75)
            } else {
                Ok(0.0)
            }
        }
    }

    fn context() -> QueryContext {
        QueryContext::new(
            Arc::new(StandardTypeSystem::new()),
            Arc::new(ImmutableSchemata::new()),
        )
    }

    fn layout(scores: bool) -> ColumnLayout {
        ColumnLayout::new(
            vec![Column::new("a", "title"), Column::new("a", "rank")],
            vec![STRING.into(), LONG.into()],
            scores,
        )
        .unwrap()
    }

    fn tuple(title: &str, rank: Value, path: &str) -> Vec<Value> {
        vec![
            Value::from(title),
            rank,
            Value::Location(Location::parse(path).unwrap()),
        ]
    }

    fn check(ctx: &QueryContext, constraint: Constraint, tuple: &mut [Value]) -> bool {
        let layout = layout(false);
        create_checker(ctx, &layout, &constraint)
            .unwrap()
            .satisfies(tuple)
    }

    #[test]
    fn test_comparison_coerces_literal_to_column_type() {
        let ctx = context();
        let rank_gt = |v: &str| {
            Constraint::compare(DynamicOperand::property("a", "rank"), Operator::GreaterThan, v)
        };
        let mut row = tuple("x", Value::Long(10), "/a");
        assert!(check(&ctx, rank_gt("9"), &mut row));
        assert!(!check(&ctx, rank_gt("10"), &mut row));

        let err = create_checker(&ctx, &layout(false), &rank_gt("ten"));
        assert!(matches!(err, Err(Error::TypeConversion { .. })));
    }

    #[test]
    fn test_null_operand_never_matches() {
        let ctx = context();
        let mut row = tuple("x", Value::Null, "/a");
        let eq = Constraint::compare(DynamicOperand::property("a", "rank"), Operator::NotEqualTo, 1i64);
        assert!(!check(&ctx, eq.clone(), &mut row));
        assert!(check(&ctx, Constraint::not(eq), &mut row));
    }

    #[test]
    fn test_like_patterns() {
        let ctx = context();
        let like = |p: &str| Constraint::compare(DynamicOperand::property("a", "title"), Operator::Like, p);
        let mut row = tuple("100% rust_lang", Value::Null, "/a");
        assert!(check(&ctx, like("100\\%%"), &mut row));
        assert!(check(&ctx, like("%rust_lang"), &mut row));
        assert!(check(&ctx, like("%rust\\_lang"), &mut row));
        assert!(!check(&ctx, like("rust%"), &mut row));
        let mut other = tuple("100x rustXlang", Value::Null, "/a");
        assert!(!check(&ctx, like("100\\%%"), &mut other));
        assert!(check(&ctx, like("%rust_lang"), &mut other));
    }

    #[test]
    fn test_between_bounds() {
        let ctx = context();
        let between = |include_lower, include_upper| Constraint::Between {
            operand: DynamicOperand::property("a", "rank"),
            lower: StaticOperand::literal(1i64),
            upper: StaticOperand::literal(5i64),
            include_lower,
            include_upper,
        };
        let mut low = tuple("x", Value::Long(1), "/a");
        let mut high = tuple("x", Value::Long(5), "/a");
        assert!(check(&ctx, between(true, true), &mut low));
        assert!(!check(&ctx, between(false, true), &mut low));
        assert!(check(&ctx, between(false, true), &mut high));
        assert!(!check(&ctx, between(true, false), &mut high));
    }

    #[test]
    fn test_set_criteria_expands_list_variables() {
        let ctx = context().with_variable("ranks", Value::List(vec![Value::Long(3), Value::Long(4)]));
        let in_ranks = Constraint::SetCriteria {
            operand: DynamicOperand::property("a", "rank"),
            values: vec![StaticOperand::variable("ranks")],
        };
        assert!(check(&ctx, in_ranks.clone(), &mut tuple("x", Value::Long(4), "/a")));
        assert!(!check(&ctx, in_ranks, &mut tuple("x", Value::Long(5), "/a")));

        let empty = Constraint::SetCriteria {
            operand: DynamicOperand::property("a", "rank"),
            values: vec![],
        };
        assert!(!check(&ctx, empty, &mut tuple("x", Value::Long(4), "/a")));

        let unbound = Constraint::SetCriteria {
            operand: DynamicOperand::property("a", "rank"),
            values: vec![StaticOperand::variable("nothing")],
        };
        assert!(!check(&ctx, unbound, &mut tuple("x", Value::Long(4), "/a")));
    }

    #[test]
    fn test_path_constraints_without_analyzer() {
        let ctx = context();
        let mut row = tuple("x", Value::Null, "/docs/guide/intro");
        let same = Constraint::SameNode { selector: "a".into(), path: "/docs/guide/intro".into() };
        let child = Constraint::ChildNode { selector: "a".into(), parent_path: "/docs/guide".into() };
        let not_child = Constraint::ChildNode { selector: "a".into(), parent_path: "/docs".into() };
        let descendant = Constraint::DescendantNode { selector: "a".into(), ancestor_path: "/docs".into() };
        let self_descendant = Constraint::DescendantNode {
            selector: "a".into(),
            ancestor_path: "/docs/guide/intro".into(),
        };
        assert!(check(&ctx, same, &mut row));
        assert!(check(&ctx, child, &mut row));
        assert!(!check(&ctx, not_child, &mut row));
        assert!(check(&ctx, descendant, &mut row));
        assert!(!check(&ctx, self_descendant, &mut row));
    }

    #[test]
    fn test_property_existence() {
        let ctx = context();
        let exists = |p: &str| Constraint::PropertyExistence { selector: "a".into(), property: p.into() };
        assert!(check(&ctx, exists("title"), &mut tuple("x", Value::Null, "/a")));
        assert!(!check(&ctx, exists("rank"), &mut tuple("x", Value::Null, "/a")));
        assert!(!check(&ctx, exists("present"), &mut tuple("x", Value::Null, "/a")));

        let ctx = context().with_analyzer(Arc::new(FixedScores));
        assert!(check(&ctx, exists("present"), &mut tuple("x", Value::Null, "/a")));
    }

    #[test]
    fn test_property_existence_asks_analyzer_before_columns() {
        let ctx = context().with_analyzer(Arc::new(FixedScores));
        let exists = |p: &str| Constraint::PropertyExistence { selector: "a".into(), property: p.into() };
        let layout = ColumnLayout::new(
            vec![Column::new("a", "title"), Column::new("a", "present")],
            vec![STRING.into(), STRING.into()],
            false,
        )
        .unwrap();
        let location = Value::Location(Location::parse("/a").unwrap());

        // projected but null, stored according to the analyzer
        let mut row = vec![Value::from("x"), Value::Null, location.clone()];
        let checker = create_checker(&ctx, &layout, &exists("present")).unwrap();
        assert!(checker.satisfies(&mut row));

        // projected and set, unknown to the analyzer
        let checker = create_checker(&ctx, &layout, &exists("title")).unwrap();
        assert!(!checker.satisfies(&mut row));
    }

    #[test]
    fn test_full_text_without_expression_rejects() {
        let plain = context();
        let analyzed = context().with_analyzer(Arc::new(FixedScores));
        for ctx in [plain, analyzed] {
            let mut row = tuple("x", Value::Null, "/rust");
            assert!(!check(&ctx, Constraint::full_text("a", None), &mut row));
        }
    }

    #[test]
    fn test_full_text_records_max_score() {
        let ctx = context().with_analyzer(Arc::new(FixedScores));
        let layout = layout(true);
        let checker = create_checker(&ctx, &layout, &Constraint::full_text("a", Some("rust"))).unwrap();

        let mut row = tuple("x", Value::Null, "/rust");
        row.push(Value::Double(0.25));
        assert!(checker.satisfies(&mut row));
        assert_eq!(row[3], Value::Double(0.75));

        row[3] = Value::Double(2.0);
        assert!(checker.satisfies(&mut row));
        assert_eq!(row[3], Value::Double(2.0));

        // a zero score is recorded but does not filter the row
        let mut miss = tuple("x", Value::Null, "/go");
        miss.push(Value::Null);
        assert!(checker.satisfies(&mut miss));
        assert_eq!(miss[3], Value::Double(0.0));

        let mut unplaced = tuple("x", Value::Null, "/go");
        unplaced[2] = Value::Null;
        unplaced.push(Value::Null);
        assert!(!checker.satisfies(&mut unplaced));
    }
}
