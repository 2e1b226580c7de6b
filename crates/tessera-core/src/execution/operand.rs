//! Dynamic operand evaluator
//!
//! Compiles a [`DynamicOperand`] against a layout once, resolving every slot
//! index up front, into a closure that derives a value from one tuple.

use crate::error::{Error, Result};
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::model::{ArithmeticOperator, DynamicOperand};
use crate::schema::types::{DOUBLE, LONG, NAME, PATH, REFERENCE, STRING};
use crate::value::{Location, Value};
use std::fmt;
use std::sync::Arc;

type Evaluator = Box<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A compiled per-tuple value extractor
pub struct DynamicOperation {
    expected_type: String,
    eval: Evaluator,
}

impl DynamicOperation {
    fn new(expected_type: impl Into<String>, eval: Evaluator) -> Self {
        Self {
            expected_type: expected_type.into(),
            eval,
        }
    }

    /// Type name of the values this operation produces
    pub fn expected_type(&self) -> &str {
        &self.expected_type
    }

    /// Evaluate against one tuple
    pub fn evaluate(&self, tuple: &[Value]) -> Value {
        (self.eval)(tuple)
    }
}

impl fmt::Debug for DynamicOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicOperation")
            .field("expected_type", &self.expected_type)
            .finish_non_exhaustive()
    }
}

/// Location stored in a slot, if the slot holds one
pub(crate) fn location_at(tuple: &[Value], index: usize) -> Option<&Location> {
    tuple.get(index).and_then(Value::as_location)
}

/// Compile an operand against a layout
pub fn create_dynamic_operation(
    ctx: &QueryContext,
    layout: &ColumnLayout,
    operand: &DynamicOperand,
) -> Result<DynamicOperation> {
    match operand {
        DynamicOperand::PropertyValue { selector, property } => {
            let index = layout
                .column_index_for_property(selector, property)
                .ok_or_else(|| Error::NoSuchColumn(format!("{}.{}", selector, property)))?;
            let expected = layout.column_type(index)?.to_string();
            Ok(DynamicOperation::new(
                expected,
                Box::new(move |tuple: &[Value]| tuple.get(index).cloned().unwrap_or_default()),
            ))
        }
        DynamicOperand::ReferenceValue { selector, property } => {
            let indexes: Vec<usize> = match property {
                Some(property) => vec![
                    layout
                        .column_index_for_property(selector, property)
                        .ok_or_else(|| Error::NoSuchColumn(format!("{}.{}", selector, property)))?,
                ],
                None => {
                    layout.location_index(selector)?;
                    layout
                        .columns()
                        .iter()
                        .enumerate()
                        .filter(|(i, c)| {
                            &c.selector == selector
                                && layout.column_types()[*i].eq_ignore_ascii_case(REFERENCE)
                        })
                        .map(|(i, _)| i)
                        .collect()
                }
            };
            Ok(DynamicOperation::new(
                REFERENCE,
                Box::new(move |tuple: &[Value]| {
                    indexes
                        .iter()
                        .filter_map(|&i| tuple.get(i))
                        .find(|v| !v.is_null())
                        .cloned()
                        .unwrap_or_default()
                }),
            ))
        }
        DynamicOperand::Length(inner) => {
            let inner = create_dynamic_operation(ctx, layout, inner)?;
            let types = Arc::clone(ctx.type_system());
            let analyzer = ctx.analyzer().cloned();
            Ok(DynamicOperation::new(
                LONG,
                Box::new(move |tuple: &[Value]| {
                    let value = match inner.evaluate(tuple) {
                        Value::List(items) => items.into_iter().next().unwrap_or_default(),
                        other => other,
                    };
                    if value.is_null() {
                        return Value::Null;
                    }
                    let length = match &analyzer {
                        Some(analyzer) => analyzer.length(&value),
                        None => types.factory_or_default(inner.expected_type()).length(&value),
                    };
                    Value::Long(length)
                }),
            ))
        }
        DynamicOperand::LowerCase(inner) => {
            let inner = create_dynamic_operation(ctx, layout, inner)?;
            Ok(DynamicOperation::new(
                STRING,
                Box::new(move |tuple: &[Value]| map_string(inner.evaluate(tuple), &|s: &str| s.to_lowercase())),
            ))
        }
        DynamicOperand::UpperCase(inner) => {
            let inner = create_dynamic_operation(ctx, layout, inner)?;
            Ok(DynamicOperation::new(
                STRING,
                Box::new(move |tuple: &[Value]| map_string(inner.evaluate(tuple), &|s: &str| s.to_uppercase())),
            ))
        }
        DynamicOperand::NodeDepth { selector } => {
            let index = layout.location_index(selector)?;
            Ok(DynamicOperation::new(
                LONG,
                Box::new(move |tuple: &[Value]| match location_at(tuple, index) {
                    Some(location) => Value::Long(location.path().depth() as i64),
                    None => Value::Null,
                }),
            ))
        }
        DynamicOperand::NodePath { selector } => {
            let index = layout.location_index(selector)?;
            Ok(DynamicOperation::new(
                PATH,
                Box::new(move |tuple: &[Value]| match location_at(tuple, index) {
                    Some(location) => Value::Path(location.path().clone()),
                    None => Value::Null,
                }),
            ))
        }
        DynamicOperand::NodeName { selector } => {
            let index = layout.location_index(selector)?;
            Ok(DynamicOperation::new(
                NAME,
                Box::new(move |tuple: &[Value]| match location_at(tuple, index) {
                    Some(location) => Value::Name(
                        location
                            .path()
                            .last_segment()
                            .map(|s| s.name().to_string())
                            .unwrap_or_default(),
                    ),
                    None => Value::Null,
                }),
            ))
        }
        DynamicOperand::NodeLocalName { selector } => {
            let index = layout.location_index(selector)?;
            Ok(DynamicOperation::new(
                STRING,
                Box::new(move |tuple: &[Value]| match location_at(tuple, index) {
                    Some(location) => Value::String(
                        location
                            .path()
                            .last_segment()
                            .map(|s| s.local_name().to_string())
                            .unwrap_or_default(),
                    ),
                    None => Value::Null,
                }),
            ))
        }
        DynamicOperand::FullTextSearchScore { selector } => {
            layout.location_index(selector)?;
            let index = layout.score_index(selector);
            Ok(DynamicOperation::new(
                DOUBLE,
                Box::new(move |tuple: &[Value]| match index.and_then(|i| tuple.get(i)) {
                    Some(Value::Double(score)) => Value::Double(*score),
                    _ => Value::Double(0.0),
                }),
            ))
        }
        DynamicOperand::Arithmetic {
            left,
            operator,
            right,
        } => {
            let left = create_dynamic_operation(ctx, layout, left)?;
            let right = create_dynamic_operation(ctx, layout, right)?;
            let result_type = ctx
                .type_system()
                .compatible_type(left.expected_type(), right.expected_type());
            let operator = *operator;
            Ok(DynamicOperation::new(
                result_type,
                Box::new(move |tuple: &[Value]| {
                    arithmetic(operator, &left.evaluate(tuple), &right.evaluate(tuple))
                }),
            ))
        }
    }
}

fn map_string(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::List(items) => Value::List(items.into_iter().map(|v| map_string(v, f)).collect()),
        Value::String(s) => Value::String(f(&s)),
        other => Value::String(f(&other.to_string())),
    }
}

/// Apply an arithmetic operator. Nulls, non-numeric operands, integer
/// overflow and division by zero all produce null.
fn arithmetic(operator: ArithmeticOperator, left: &Value, right: &Value) -> Value {
    if let (Value::Long(a), Value::Long(b)) = (left, right) {
        let result = match operator {
            ArithmeticOperator::Add => a.checked_add(*b),
            ArithmeticOperator::Subtract => a.checked_sub(*b),
            ArithmeticOperator::Multiply => a.checked_mul(*b),
            ArithmeticOperator::Divide => a.checked_div(*b),
        };
        return result.map(Value::Long).unwrap_or_default();
    }
    let (Some(a), Some(b)) = (numeric(left), numeric(right)) else {
        return Value::Null;
    };
    match operator {
        ArithmeticOperator::Add => Value::Double(a + b),
        ArithmeticOperator::Subtract => Value::Double(a - b),
        ArithmeticOperator::Multiply => Value::Double(a * b),
        ArithmeticOperator::Divide if b == 0.0 => Value::Null,
        ArithmeticOperator::Divide => Value::Double(a / b),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;
    use crate::schema::{ImmutableSchemata, StandardTypeSystem};

    fn context() -> QueryContext {
        QueryContext::new(
            Arc::new(StandardTypeSystem::new()),
            Arc::new(ImmutableSchemata::new()),
        )
    }

    fn layout() -> ColumnLayout {
        ColumnLayout::new(
            vec![
                Column::new("a", "title"),
                Column::new("a", "rank"),
                Column::new("a", "weight"),
                Column::new("a", "ref"),
            ],
            vec![STRING.into(), LONG.into(), DOUBLE.into(), REFERENCE.into()],
            true,
        )
        .unwrap()
    }

    fn tuple() -> Vec<Value> {
        vec![
            Value::from("Hello"),
            Value::Long(7),
            Value::Double(0.5),
            Value::Null,
            Value::Location(Location::parse("/docs/ns:intro[2]").unwrap()),
            Value::Double(1.25),
        ]
    }

    fn eval(operand: DynamicOperand) -> (String, Value) {
        let op = create_dynamic_operation(&context(), &layout(), &operand).unwrap();
        (op.expected_type().to_string(), op.evaluate(&tuple()))
    }

    #[test]
    fn test_property_value_uses_column_type() {
        assert_eq!(
            eval(DynamicOperand::property("a", "rank")),
            (LONG.to_string(), Value::Long(7))
        );
        let missing = create_dynamic_operation(
            &context(),
            &layout(),
            &DynamicOperand::property("a", "nope"),
        );
        assert!(matches!(missing, Err(Error::NoSuchColumn(_))));
    }

    #[test]
    fn test_node_functions() {
        assert_eq!(eval(DynamicOperand::node_depth("a")).1, Value::Long(2));
        assert_eq!(
            eval(DynamicOperand::node_name("a")).1,
            Value::Name("ns:intro".into())
        );
        assert_eq!(
            eval(DynamicOperand::NodeLocalName { selector: "a".into() }).1,
            Value::from("intro")
        );
        assert_eq!(
            eval(DynamicOperand::node_path("a")).1.to_string(),
            "/docs/ns:intro[2]"
        );
    }

    #[test]
    fn test_case_and_length() {
        let lower = DynamicOperand::LowerCase(Box::new(DynamicOperand::property("a", "title")));
        assert_eq!(eval(lower), (STRING.to_string(), Value::from("hello")));
        let length = DynamicOperand::Length(Box::new(DynamicOperand::property("a", "title")));
        assert_eq!(eval(length).1, Value::Long(5));
        let null_length = DynamicOperand::Length(Box::new(DynamicOperand::property("a", "ref")));
        assert_eq!(eval(null_length).1, Value::Null);
    }

    #[test]
    fn test_arithmetic_named_semantics() {
        let rank = || DynamicOperand::property("a", "rank");
        let weight = || DynamicOperand::property("a", "weight");
        assert_eq!(
            eval(DynamicOperand::arithmetic(rank(), ArithmeticOperator::Add, rank())),
            (LONG.to_string(), Value::Long(14))
        );
        assert_eq!(
            eval(DynamicOperand::arithmetic(rank(), ArithmeticOperator::Subtract, weight())),
            (DOUBLE.to_string(), Value::Double(6.5))
        );
        assert_eq!(
            eval(DynamicOperand::arithmetic(rank(), ArithmeticOperator::Divide, weight())).1,
            Value::Double(14.0)
        );
        assert_eq!(
            eval(DynamicOperand::arithmetic(rank(), ArithmeticOperator::Multiply, rank())).1,
            Value::Long(49)
        );
    }

    #[test]
    fn test_arithmetic_edge_cases_yield_null() {
        assert_eq!(
            arithmetic(ArithmeticOperator::Divide, &Value::Long(1), &Value::Long(0)),
            Value::Null
        );
        assert_eq!(
            arithmetic(ArithmeticOperator::Add, &Value::Long(i64::MAX), &Value::Long(1)),
            Value::Null
        );
        assert_eq!(
            arithmetic(ArithmeticOperator::Add, &Value::Null, &Value::Long(1)),
            Value::Null
        );
    }

    #[test]
    fn test_score_reads_score_slot() {
        assert_eq!(
            eval(DynamicOperand::score("a")),
            (DOUBLE.to_string(), Value::Double(1.25))
        );
        let unscored = ColumnLayout::new(vec![Column::new("a", "title")], vec![STRING.into()], false)
            .unwrap();
        let op = create_dynamic_operation(&context(), &unscored, &DynamicOperand::score("a")).unwrap();
        assert_eq!(op.evaluate(&[Value::Null, Value::Null]), Value::Double(0.0));
    }
}
