use crate::common::Result;
use crate::config::Settings;
use crate::sql::planner::{BoxedNode, Expression, Node};
use std::collections::HashMap;

/// A plan optimizer, which recursively transforms a plan node to make plan
/// execution more efficient where possible.
pub type Optimizer = fn(BoxedNode, &Settings) -> Result<BoxedNode>;

/// The set of optimizers, and the order in which they are applied.
pub static OPTIMIZERS: &[(&str, Optimizer)] = &[(
    "Common subexpression elimination",
    common_subexpression_elimination,
)];

/// Assigns cache slots to subexpressions that occur more than once within a
/// node's evaluation scope, so each is computed at most once per row.
///
/// A scope is the set of expressions a node evaluates against the same input
/// row: the projection list, a filter or join predicate, the grouping keys
/// together with the aggregate arguments, the HAVING predicate, or the sort
/// keys. Column references and constants are never cached, nor is anything
/// containing a non-deterministic function call. Scopes that already carry
/// cache slots are left untouched.
pub fn common_subexpression_elimination(
    node: BoxedNode,
    settings: &Settings,
) -> Result<BoxedNode> {
    if !settings.use_common_subexpression_elimination {
        return Ok(node);
    }
    let rewrite = |node: Node| -> Result<Node> {
        Ok(match node {
            Node::Aggregate {
                source,
                group_by,
                aggregates,
                having,
            } => {
                let width = group_by.len();
                let mut scope = group_by;
                scope.extend(aggregates.iter().map(|a| a.expression().clone()));
                let mut scope = cache_scope(scope, settings);
                let arguments = scope.split_off(width);
                Node::Aggregate {
                    source,
                    group_by: scope,
                    aggregates: aggregates
                        .iter()
                        .zip(arguments)
                        .map(|(aggregate, expr)| aggregate.with_expression(expr))
                        .collect(),
                    having: having.map(|expr| cache_single(expr, settings)),
                }
            }
            Node::Filter { source, predicate } => Node::Filter {
                source,
                predicate: cache_single(predicate, settings),
            },
            Node::Join {
                left,
                right,
                join_type,
                predicate,
            } => Node::Join {
                left,
                right,
                join_type,
                predicate: predicate.map(|expr| cache_single(expr, settings)),
            },
            Node::Order { source, key } => {
                let (exprs, directions): (Vec<_>, Vec<_>) = key.into_iter().unzip();
                Node::Order {
                    source,
                    key: cache_scope(exprs, settings)
                        .into_iter()
                        .zip(directions)
                        .collect(),
                }
            }
            Node::Projection {
                source,
                expressions,
                aliases,
            } => Node::Projection {
                source,
                expressions: cache_scope(expressions, settings),
                aliases,
            },
            Node::Scan {
                table,
                filter,
                alias,
            } => Node::Scan {
                table,
                filter: filter.map(|expr| cache_single(expr, settings)),
                alias,
            },
            node => node,
        })
    };
    let mut node = node;
    *node.inner = node.inner.transform(&|node| Ok(node), &rewrite)?;
    Ok(node)
}

fn cache_single(expr: Expression, settings: &Settings) -> Expression {
    let mut scope = cache_scope(vec![expr], settings);
    scope.remove(0)
}

/// Rewrites one evaluation scope, wrapping repeated subexpressions in
/// numbered cache slots. Slots are numbered in order of first occurrence.
fn cache_scope(exprs: Vec<Expression>, settings: &Settings) -> Vec<Expression> {
    if exprs
        .iter()
        .any(|expr| expr.contains(&|e| matches!(e, Expression::Cached { .. })))
    {
        return exprs;
    }

    let mut counts: HashMap<&Expression, usize> = HashMap::new();
    let mut order: Vec<&Expression> = Vec::new();
    for expr in &exprs {
        count_subexpressions(expr, settings, &mut counts, &mut order);
    }
    let slots: HashMap<Expression, usize> = order
        .into_iter()
        .filter(|expr| counts[expr] > 1)
        .enumerate()
        .map(|(slot, expr)| (expr.clone(), slot))
        .collect();
    if slots.is_empty() {
        return exprs;
    }
    log::debug!("assigned {} subexpression cache slots", slots.len());

    exprs
        .into_iter()
        .map(|expr| assign_slots(expr, &slots))
        .collect()
}

/// Counts every cacheable subtree of the expression. Returns true if the
/// expression is deterministic.
fn count_subexpressions<'a>(
    expr: &'a Expression,
    settings: &Settings,
    counts: &mut HashMap<&'a Expression, usize>,
    order: &mut Vec<&'a Expression>,
) -> bool {
    let mut deterministic = true;
    for child in expr.children() {
        deterministic &= count_subexpressions(child, settings, counts, order);
    }
    if let Expression::Function { name, .. } = expr {
        deterministic &= !settings.is_non_deterministic(name);
    }
    let leaf = matches!(expr, Expression::Column(_) | Expression::Constant(_));
    if deterministic && !leaf {
        let count = counts.entry(expr).or_insert(0);
        if *count == 0 {
            order.push(expr);
        }
        *count += 1;
    }
    deterministic
}

/// Wraps slotted subtrees top-down. The lookup happens before the children
/// are rewritten, while the subtree still matches its counted form.
fn assign_slots(expr: Expression, slots: &HashMap<Expression, usize>) -> Expression {
    let slot = slots.get(&expr).copied();
    let expr = match expr {
        Expression::Constant(_) | Expression::Column(_) | Expression::Cached { .. } => expr,
        expr => rebuild(expr, |child| assign_slots(child, slots)),
    };
    match slot {
        Some(slot) => Expression::Cached {
            slot,
            expr: Box::new(expr),
        },
        None => expr,
    }
}

/// Rebuilds an expression by mapping each direct child.
fn rebuild(expr: Expression, f: impl Fn(Expression) -> Expression) -> Expression {
    use Expression::*;
    let b = |e: Box<Expression>| Box::new(f(*e));
    match expr {
        And(l, r) => And(b(l), b(r)),
        Or(l, r) => Or(b(l), b(r)),
        Equal(l, r) => Equal(b(l), b(r)),
        NotEqual(l, r) => NotEqual(b(l), b(r)),
        GreaterThan(l, r) => GreaterThan(b(l), b(r)),
        GreaterThanOrEqual(l, r) => GreaterThanOrEqual(b(l), b(r)),
        LessThan(l, r) => LessThan(b(l), b(r)),
        LessThanOrEqual(l, r) => LessThanOrEqual(b(l), b(r)),
        Add(l, r) => Add(b(l), b(r)),
        Subtract(l, r) => Subtract(b(l), b(r)),
        Multiply(l, r) => Multiply(b(l), b(r)),
        Divide(l, r) => Divide(b(l), b(r)),
        Remainder(l, r) => Remainder(b(l), b(r)),
        Exponentiate(l, r) => Exponentiate(b(l), b(r)),
        Like(l, r) => Like(b(l), b(r)),
        Not(e) => Not(b(e)),
        IsNull(e) => IsNull(b(e)),
        Negate(e) => Negate(b(e)),
        Try(e) => Try(b(e)),
        Cached { slot, expr } => Cached { slot, expr: b(expr) },
        Function { name, args } => Function {
            name,
            args: args.into_iter().map(&f).collect(),
        },
        Case {
            operand,
            branches,
            otherwise,
        } => Case {
            operand: operand.map(b),
            branches: branches
                .into_iter()
                .map(|(when, then)| (f(when), f(then)))
                .collect(),
            otherwise: otherwise.map(b),
        },
        Constant(_) | Column(_) => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::planner::{RowContext, SlotCache};
    use crate::storage::tuple::Row;
    use crate::types::field::{Field, Label};
    use crate::types::{DataType, Table};
    use Expression::*;

    fn settings() -> Settings {
        Settings {
            use_common_subexpression_elimination: true,
            ..Settings::default()
        }
    }

    fn sum() -> Expression {
        Add(Box::new(Column(0)), Box::new(Column(1)))
    }

    fn projection(expressions: Vec<Expression>) -> BoxedNode {
        let table = Table::builder()
            .name("t")
            .column("a", DataType::Int, false)
            .column("b", DataType::Int, false)
            .build();
        let aliases = vec![Label::None; expressions.len()];
        Node::Projection {
            source: Node::scan(&table).into(),
            expressions,
            aliases,
        }
        .into()
    }

    fn expressions(node: &BoxedNode) -> Vec<Expression> {
        match &**node {
            Node::Projection { expressions, .. } => expressions.clone(),
            node => panic!("unexpected node {node:?}"),
        }
    }

    #[test]
    fn test_repeated_subexpression_gets_slot() {
        let node = projection(vec![
            Multiply(Box::new(sum()), Box::new(Constant(Field::Integer(2)))),
            Subtract(Box::new(sum()), Box::new(Column(0))),
        ]);
        let exprs = expressions(&common_subexpression_elimination(node, &settings()).unwrap());
        let cached = Cached {
            slot: 0,
            expr: Box::new(sum()),
        };
        assert_eq!(
            exprs,
            vec![
                Multiply(Box::new(cached.clone()), Box::new(Constant(Field::Integer(2)))),
                Subtract(Box::new(cached), Box::new(Column(0))),
            ]
        );

        let row = Row::from(vec![Field::Integer(3), Field::Integer(4)]);
        let slots = SlotCache::for_expressions(&exprs);
        assert_eq!(slots.len(), 1);
        slots.next_row();
        let ctx = RowContext::with_slots(Some(&row), &slots);
        let values: Vec<Field> = exprs.iter().map(|e| e.evaluate_in(&ctx).unwrap()).collect();
        assert_eq!(values, vec![Field::Integer(14), Field::Integer(4)]);
    }

    #[test]
    fn test_leaves_and_single_occurrences_not_cached() {
        let input = vec![Column(0), Column(0), sum()];
        let node = projection(input.clone());
        let exprs = expressions(&common_subexpression_elimination(node, &settings()).unwrap());
        assert_eq!(exprs, input);
    }

    #[test]
    fn test_non_deterministic_never_cached() {
        let random = || Function {
            name: "random".to_string(),
            args: vec![],
        };
        let input = vec![
            Add(Box::new(random()), Box::new(Column(0))),
            Add(Box::new(random()), Box::new(Column(0))),
        ];
        let node = projection(input.clone());
        let exprs = expressions(&common_subexpression_elimination(node, &settings()).unwrap());
        assert_eq!(exprs, input);
    }

    #[test]
    fn test_disabled_is_identity() {
        let input = vec![sum(), sum()];
        let node = projection(input.clone());
        let exprs = expressions(&common_subexpression_elimination(node, &Settings::baseline()).unwrap());
        assert_eq!(exprs, input);
    }

    #[test]
    fn test_case_branches_do_not_leak() {
        // CASE WHEN a > 0 THEN a + b ELSE 0 END, a + b: the branch value
        // must not be served to the second expression unless it was taken.
        let case = Case {
            operand: None,
            branches: vec![(
                GreaterThan(Box::new(Column(0)), Box::new(Constant(Field::Integer(0)))),
                sum(),
            )],
            otherwise: Some(Box::new(Constant(Field::Integer(0)))),
        };
        let node = projection(vec![case, sum()]);
        let exprs = expressions(&common_subexpression_elimination(node, &settings()).unwrap());
        let slots = SlotCache::for_expressions(&exprs);

        for (a, b) in [(1, 2), (-1, 5)] {
            let row = Row::from(vec![Field::Integer(a), Field::Integer(b)]);
            slots.next_row();
            let ctx = RowContext::with_slots(Some(&row), &slots);
            let values: Vec<Field> = exprs.iter().map(|e| e.evaluate_in(&ctx).unwrap()).collect();
            let expected = if a > 0 { a + b } else { 0 };
            assert_eq!(values, vec![Field::Integer(expected), Field::Integer(a + b)]);
        }
    }
}
