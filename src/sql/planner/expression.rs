use crate::common::{Error, Result};
use crate::errinput;
use crate::sql::planner::{functions, Node};
use crate::storage::tuple::Row;
use crate::types::field::Field;
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;

/// A resolved scalar expression. Columns are referenced by index into the
/// row the expression is evaluated against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// A constant value.
    Constant(Field),
    /// A column reference, as an index into the input row.
    Column(usize),

    /// Logical AND, with SQL three-valued logic.
    And(Box<Expression>, Box<Expression>),
    /// Logical OR, with SQL three-valued logic.
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT.
    Not(Box<Expression>),

    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    IsNull(Box<Expression>),

    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Remainder(Box<Expression>, Box<Expression>),
    Exponentiate(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
    /// SQL LIKE pattern match, with % and _ wildcards.
    Like(Box<Expression>, Box<Expression>),

    /// A call into the function library.
    Function { name: String, args: Vec<Expression> },
    /// CASE [operand] WHEN .. THEN .. [ELSE ..] END. Only the taken branch
    /// is evaluated.
    Case {
        operand: Option<Box<Expression>>,
        branches: Vec<(Expression, Expression)>,
        otherwise: Option<Box<Expression>>,
    },
    /// Evaluates the inner expression, yielding NULL if it errors.
    Try(Box<Expression>),
    /// A common subexpression assigned to a cache slot. The first evaluation
    /// in a row computes and stores the value, later ones read it back.
    Cached { slot: usize, expr: Box<Expression> },
}

/// The per-row evaluation context: the row's column bindings, and the
/// subexpression slots of the enclosing evaluation scope, if any.
#[derive(Clone, Copy)]
pub struct RowContext<'a> {
    row: Option<&'a Row>,
    slots: Option<&'a SlotCache>,
}

impl<'a> RowContext<'a> {
    pub fn new(row: Option<&'a Row>) -> Self {
        Self { row, slots: None }
    }

    pub fn with_slots(row: Option<&'a Row>, slots: &'a SlotCache) -> Self {
        Self {
            row,
            slots: Some(slots),
        }
    }

    fn column(&self, index: usize) -> Result<Field> {
        match self.row {
            Some(row) => row.get_field(index),
            None => errinput!("can't reference column {index} without a row"),
        }
    }
}

/// Subexpression cache slots for one evaluation scope.
///
/// A slot holds a valid value only while its stamp equals the current row
/// stamp. Moving to the next row bumps the stamp, so values are overwritten
/// rather than cleared. Slots first computed inside a CASE branch are
/// unstamped when the branch exits.
#[derive(Clone, Debug)]
pub struct SlotCache {
    values: RefCell<Vec<Field>>,
    stamps: RefCell<Vec<u64>>,
    row: Cell<u64>,
    branches: RefCell<Vec<Vec<usize>>>,
}

impl SlotCache {
    pub fn new(slots: usize) -> Self {
        Self {
            values: RefCell::new(vec![Field::Null; slots]),
            stamps: RefCell::new(vec![0; slots]),
            row: Cell::new(1),
            branches: RefCell::new(Vec::new()),
        }
    }

    /// Creates a cache sized for the slots used by the given expressions.
    pub fn for_expressions<'a>(exprs: impl IntoIterator<Item = &'a Expression>) -> Self {
        Self::new(Expression::slot_count(exprs))
    }

    pub fn len(&self) -> usize {
        self.stamps.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invalidates every slot. Called once at the start of each row.
    pub fn next_row(&self) {
        self.row.set(self.row.get() + 1);
        self.branches.borrow_mut().clear();
    }

    /// Returns true if the slot holds a value computed for the current row.
    pub fn is_computed(&self, slot: usize) -> bool {
        self.stamps.borrow().get(slot) == Some(&self.row.get())
    }

    fn get_or_compute(
        &self,
        slot: usize,
        compute: impl FnOnce() -> Result<Field>,
    ) -> Result<Field> {
        if self.is_computed(slot) {
            return Ok(self.values.borrow()[slot].clone());
        }
        // No borrows may be held here: computing a slot can fill nested slots.
        let value = compute()?;
        {
            let mut values = self.values.borrow_mut();
            let mut stamps = self.stamps.borrow_mut();
            if slot >= stamps.len() {
                values.resize(slot + 1, Field::Null);
                stamps.resize(slot + 1, 0);
            }
            values[slot] = value.clone();
            stamps[slot] = self.row.get();
        }
        if let Some(frame) = self.branches.borrow_mut().last_mut() {
            frame.push(slot);
        }
        Ok(value)
    }

    fn enter_branch(&self) {
        self.branches.borrow_mut().push(Vec::new());
    }

    fn exit_branch(&self) {
        let Some(frame) = self.branches.borrow_mut().pop() else {
            return;
        };
        let mut stamps = self.stamps.borrow_mut();
        for slot in frame {
            stamps[slot] = 0;
        }
    }
}

impl Expression {
    /// Evaluates the expression against an optional row, without
    /// subexpression caching.
    pub fn evaluate(&self, row: Option<&Row>) -> Result<Field> {
        self.evaluate_in(&RowContext::new(row))
    }

    /// Evaluates the expression in the given row context.
    pub fn evaluate_in(&self, ctx: &RowContext) -> Result<Field> {
        use Field::*;
        Ok(match self {
            Self::Constant(value) => value.clone(),
            Self::Column(index) => ctx.column(*index)?,

            Self::And(lhs, rhs) => match lhs.evaluate_in(ctx)? {
                Boolean(false) => Boolean(false),
                lhs @ (Boolean(true) | Null) => match (lhs, rhs.evaluate_in(ctx)?) {
                    (_, Boolean(false)) => Boolean(false),
                    (Boolean(true), Boolean(true)) => Boolean(true),
                    (_, Boolean(true) | Null) => Null,
                    (_, rhs) => return errinput!("can't AND {rhs}"),
                },
                lhs => return errinput!("can't AND {lhs}"),
            },
            Self::Or(lhs, rhs) => match lhs.evaluate_in(ctx)? {
                Boolean(true) => Boolean(true),
                lhs @ (Boolean(false) | Null) => match (lhs, rhs.evaluate_in(ctx)?) {
                    (_, Boolean(true)) => Boolean(true),
                    (Boolean(false), Boolean(false)) => Boolean(false),
                    (_, Boolean(false) | Null) => Null,
                    (_, rhs) => return errinput!("can't OR {rhs}"),
                },
                lhs => return errinput!("can't OR {lhs}"),
            },
            Self::Not(expr) => match expr.evaluate_in(ctx)? {
                Boolean(b) => Boolean(!b),
                Null => Null,
                value => return errinput!("can't negate {value}"),
            },

            Self::Equal(lhs, rhs) => compare(lhs, rhs, ctx, |o| o == Ordering::Equal)?,
            Self::NotEqual(lhs, rhs) => compare(lhs, rhs, ctx, |o| o != Ordering::Equal)?,
            Self::GreaterThan(lhs, rhs) => compare(lhs, rhs, ctx, |o| o == Ordering::Greater)?,
            Self::GreaterThanOrEqual(lhs, rhs) => {
                compare(lhs, rhs, ctx, |o| o != Ordering::Less)?
            }
            Self::LessThan(lhs, rhs) => compare(lhs, rhs, ctx, |o| o == Ordering::Less)?,
            Self::LessThanOrEqual(lhs, rhs) => {
                compare(lhs, rhs, ctx, |o| o != Ordering::Greater)?
            }
            Self::IsNull(expr) => Boolean(expr.evaluate_in(ctx)?.is_null()),

            Self::Add(lhs, rhs) => lhs.evaluate_in(ctx)?.checked_add(&rhs.evaluate_in(ctx)?)?,
            Self::Subtract(lhs, rhs) => {
                lhs.evaluate_in(ctx)?.checked_sub(&rhs.evaluate_in(ctx)?)?
            }
            Self::Multiply(lhs, rhs) => {
                lhs.evaluate_in(ctx)?.checked_mul(&rhs.evaluate_in(ctx)?)?
            }
            Self::Divide(lhs, rhs) => lhs.evaluate_in(ctx)?.checked_div(&rhs.evaluate_in(ctx)?)?,
            Self::Remainder(lhs, rhs) => {
                lhs.evaluate_in(ctx)?.checked_mod(&rhs.evaluate_in(ctx)?)?
            }
            Self::Exponentiate(lhs, rhs) => {
                lhs.evaluate_in(ctx)?.checked_pow(&rhs.evaluate_in(ctx)?)?
            }
            Self::Negate(expr) => match expr.evaluate_in(ctx)? {
                Integer(i) => Integer(i.checked_neg().ok_or(Error::OverflowError)?),
                Float(f) => Float(-f),
                Null => Null,
                value => return errinput!("can't negate {value}"),
            },
            Self::Like(lhs, rhs) => match (lhs.evaluate_in(ctx)?, rhs.evaluate_in(ctx)?) {
                (String(lhs), String(rhs)) => Boolean(like_regex(&rhs)?.is_match(&lhs)),
                (String(_) | Null, Null) | (Null, String(_)) => Null,
                (lhs, rhs) => return errinput!("can't LIKE {lhs} and {rhs}"),
            },

            Self::Function { name, args } => {
                let args: Vec<Field> = args
                    .iter()
                    .map(|arg| arg.evaluate_in(ctx))
                    .collect::<Result<_>>()?;
                functions::call(name, &args)?
            }
            Self::Case {
                operand,
                branches,
                otherwise,
            } => {
                let operand = match operand {
                    Some(operand) => Some(operand.evaluate_in(ctx)?),
                    None => None,
                };
                match ctx.slots {
                    Some(slots) => {
                        slots.enter_branch();
                        let result = evaluate_case(operand, branches, otherwise, ctx);
                        slots.exit_branch();
                        result?
                    }
                    None => evaluate_case(operand, branches, otherwise, ctx)?,
                }
            }
            Self::Try(expr) => match expr.evaluate_in(ctx) {
                Ok(value) => value,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => Null,
            },
            Self::Cached { slot, expr } => match ctx.slots {
                Some(slots) => slots.get_or_compute(*slot, || expr.evaluate_in(ctx))?,
                None => expr.evaluate_in(ctx)?,
            },
        })
    }

    /// Returns the direct children of the expression.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Self::Constant(_) | Self::Column(_) => vec![],
            Self::Not(expr)
            | Self::IsNull(expr)
            | Self::Negate(expr)
            | Self::Try(expr)
            | Self::Cached { expr, .. } => vec![&**expr],
            Self::And(lhs, rhs)
            | Self::Or(lhs, rhs)
            | Self::Equal(lhs, rhs)
            | Self::NotEqual(lhs, rhs)
            | Self::GreaterThan(lhs, rhs)
            | Self::GreaterThanOrEqual(lhs, rhs)
            | Self::LessThan(lhs, rhs)
            | Self::LessThanOrEqual(lhs, rhs)
            | Self::Add(lhs, rhs)
            | Self::Subtract(lhs, rhs)
            | Self::Multiply(lhs, rhs)
            | Self::Divide(lhs, rhs)
            | Self::Remainder(lhs, rhs)
            | Self::Exponentiate(lhs, rhs)
            | Self::Like(lhs, rhs) => vec![&**lhs, &**rhs],
            Self::Function { args, .. } => args.iter().collect(),
            Self::Case {
                operand,
                branches,
                otherwise,
            } => operand
                .iter()
                .map(|e| e.as_ref())
                .chain(branches.iter().flat_map(|(when, then)| [when, then]))
                .chain(otherwise.iter().map(|e| e.as_ref()))
                .collect(),
        }
    }

    /// Walks the expression tree depth-first, calling the visitor on each
    /// node before its children. Halts and returns false if the visitor
    /// returns false.
    pub fn walk(&self, visitor: &mut impl FnMut(&Expression) -> bool) -> bool {
        visitor(self) && self.children().into_iter().all(|child| child.walk(visitor))
    }

    /// Returns true if any node in the expression tree satisfies the
    /// predicate.
    pub fn contains(&self, predicate: &impl Fn(&Expression) -> bool) -> bool {
        !self.walk(&mut |expr| !predicate(expr))
    }

    /// Recursively transforms the expression tree by applying the given
    /// closures before and after descending.
    pub fn transform(
        mut self,
        before: &impl Fn(Self) -> Result<Self>,
        after: &impl Fn(Self) -> Result<Self>,
    ) -> Result<Self> {
        // Helper for transforming boxed expressions.
        let xform = |mut expr: Box<Expression>| -> Result<Box<Expression>> {
            *expr = expr.transform(before, after)?;
            Ok(expr)
        };

        self = before(self)?;
        self = match self {
            Self::And(lhs, rhs) => Self::And(xform(lhs)?, xform(rhs)?),
            Self::Or(lhs, rhs) => Self::Or(xform(lhs)?, xform(rhs)?),
            Self::Equal(lhs, rhs) => Self::Equal(xform(lhs)?, xform(rhs)?),
            Self::NotEqual(lhs, rhs) => Self::NotEqual(xform(lhs)?, xform(rhs)?),
            Self::GreaterThan(lhs, rhs) => Self::GreaterThan(xform(lhs)?, xform(rhs)?),
            Self::GreaterThanOrEqual(lhs, rhs) => {
                Self::GreaterThanOrEqual(xform(lhs)?, xform(rhs)?)
            }
            Self::LessThan(lhs, rhs) => Self::LessThan(xform(lhs)?, xform(rhs)?),
            Self::LessThanOrEqual(lhs, rhs) => Self::LessThanOrEqual(xform(lhs)?, xform(rhs)?),
            Self::Add(lhs, rhs) => Self::Add(xform(lhs)?, xform(rhs)?),
            Self::Subtract(lhs, rhs) => Self::Subtract(xform(lhs)?, xform(rhs)?),
            Self::Multiply(lhs, rhs) => Self::Multiply(xform(lhs)?, xform(rhs)?),
            Self::Divide(lhs, rhs) => Self::Divide(xform(lhs)?, xform(rhs)?),
            Self::Remainder(lhs, rhs) => Self::Remainder(xform(lhs)?, xform(rhs)?),
            Self::Exponentiate(lhs, rhs) => Self::Exponentiate(xform(lhs)?, xform(rhs)?),
            Self::Like(lhs, rhs) => Self::Like(xform(lhs)?, xform(rhs)?),

            Self::Not(expr) => Self::Not(xform(expr)?),
            Self::IsNull(expr) => Self::IsNull(xform(expr)?),
            Self::Negate(expr) => Self::Negate(xform(expr)?),
            Self::Try(expr) => Self::Try(xform(expr)?),
            Self::Cached { slot, expr } => Self::Cached {
                slot,
                expr: xform(expr)?,
            },

            Self::Function { name, args } => Self::Function {
                name,
                args: args
                    .into_iter()
                    .map(|arg| arg.transform(before, after))
                    .collect::<Result<_>>()?,
            },
            Self::Case {
                operand,
                branches,
                otherwise,
            } => Self::Case {
                operand: operand.map(xform).transpose()?,
                branches: branches
                    .into_iter()
                    .map(|(when, then)| {
                        Ok((when.transform(before, after)?, then.transform(before, after)?))
                    })
                    .collect::<Result<_>>()?,
                otherwise: otherwise.map(xform).transpose()?,
            },

            Self::Constant(_) | Self::Column(_) => self,
        };
        self = after(self)?;
        Ok(self)
    }

    /// Returns the number of cache slots referenced by the expressions,
    /// i.e. the highest slot number plus one.
    pub fn slot_count<'a>(exprs: impl IntoIterator<Item = &'a Expression>) -> usize {
        let mut count = 0;
        for expr in exprs {
            expr.walk(&mut |e| {
                if let Self::Cached { slot, .. } = e {
                    count = count.max(slot + 1);
                }
                true
            });
        }
        count
    }

    /// Returns the static result type, given the types of the input columns.
    pub fn data_type(&self, inputs: &[DataType]) -> DataType {
        match self {
            Self::Constant(value) => value.get_type(),
            Self::Column(index) => inputs.get(*index).copied().unwrap_or(DataType::Null),
            Self::And(..)
            | Self::Or(..)
            | Self::Not(_)
            | Self::Equal(..)
            | Self::NotEqual(..)
            | Self::GreaterThan(..)
            | Self::GreaterThanOrEqual(..)
            | Self::LessThan(..)
            | Self::LessThanOrEqual(..)
            | Self::IsNull(_)
            | Self::Like(..) => DataType::Bool,
            Self::Add(lhs, rhs)
            | Self::Subtract(lhs, rhs)
            | Self::Multiply(lhs, rhs)
            | Self::Divide(lhs, rhs)
            | Self::Remainder(lhs, rhs)
            | Self::Exponentiate(lhs, rhs) => {
                match (lhs.data_type(inputs), rhs.data_type(inputs)) {
                    (DataType::Int, DataType::Int) => DataType::Int,
                    (DataType::Null, other) | (other, DataType::Null) => other,
                    _ => DataType::Float,
                }
            }
            Self::Negate(expr) | Self::Try(expr) | Self::Cached { expr, .. } => {
                expr.data_type(inputs)
            }
            Self::Function { name, args } => {
                let types: Vec<DataType> = args.iter().map(|a| a.data_type(inputs)).collect();
                functions::return_type(name, &types)
            }
            Self::Case {
                branches,
                otherwise,
                ..
            } => branches
                .iter()
                .map(|(_, then)| then)
                .chain(otherwise.iter().map(|e| e.as_ref()))
                .map(|e| e.data_type(inputs))
                .find(|t| *t != DataType::Null)
                .unwrap_or(DataType::Null),
        }
    }

    /// Formats the expression, using the given plan node to look up labels
    /// for column references.
    pub fn format(&self, node: &Node) -> String {
        use Expression::*;

        // Precedence levels, for parenthesizing. Lower binds looser.
        fn precedence(expr: &Expression) -> u8 {
            match expr {
                Column(_) | Constant(_) | Function { .. } | Case { .. } | Try(_) => 11,
                Cached { expr, .. } => precedence(expr),
                IsNull(_) => 10,
                Negate(_) => 9,
                Exponentiate(..) => 8,
                Multiply(..) | Divide(..) | Remainder(..) => 7,
                Add(..) | Subtract(..) => 6,
                GreaterThan(..) | LessThan(..) | GreaterThanOrEqual(..) | LessThanOrEqual(..) => 5,
                Equal(..) | NotEqual(..) | Like(..) => 4,
                Not(_) => 3,
                And(..) => 2,
                Or(..) => 1,
            }
        }

        // Helper to format a boxed expression, grouping it with () if needed.
        let format = |expr: &Expression| {
            let mut string = expr.format(node);
            if precedence(expr) < precedence(self) {
                string = format!("({string})");
            }
            string
        };

        match self {
            Constant(value) => format!("{value}"),
            Column(index) => match node.column_label(*index).to_string() {
                label if label.is_empty() => format!("#{index}"),
                label => label,
            },

            And(lhs, rhs) => format!("{} AND {}", format(lhs), format(rhs)),
            Or(lhs, rhs) => format!("{} OR {}", format(lhs), format(rhs)),
            Not(expr) => format!("NOT {}", format(expr)),

            Equal(lhs, rhs) => format!("{} = {}", format(lhs), format(rhs)),
            NotEqual(lhs, rhs) => format!("{} != {}", format(lhs), format(rhs)),
            GreaterThan(lhs, rhs) => format!("{} > {}", format(lhs), format(rhs)),
            GreaterThanOrEqual(lhs, rhs) => format!("{} >= {}", format(lhs), format(rhs)),
            LessThan(lhs, rhs) => format!("{} < {}", format(lhs), format(rhs)),
            LessThanOrEqual(lhs, rhs) => format!("{} <= {}", format(lhs), format(rhs)),
            IsNull(expr) => format!("{} IS NULL", format(expr)),

            Add(lhs, rhs) => format!("{} + {}", format(lhs), format(rhs)),
            Subtract(lhs, rhs) => format!("{} - {}", format(lhs), format(rhs)),
            Multiply(lhs, rhs) => format!("{} * {}", format(lhs), format(rhs)),
            Divide(lhs, rhs) => format!("{} / {}", format(lhs), format(rhs)),
            Remainder(lhs, rhs) => format!("{} % {}", format(lhs), format(rhs)),
            Exponentiate(lhs, rhs) => format!("{} ^ {}", format(lhs), format(rhs)),
            Negate(expr) => format!("-{}", format(expr)),
            Like(lhs, rhs) => format!("{} LIKE {}", format(lhs), format(rhs)),

            Function { name, args } => format!(
                "{name}({})",
                args.iter()
                    .map(|arg| arg.format(node))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Case {
                operand,
                branches,
                otherwise,
            } => {
                let mut string = "CASE".to_string();
                if let Some(operand) = operand {
                    string += &format!(" {}", operand.format(node));
                }
                for (when, then) in branches {
                    string += &format!(" WHEN {} THEN {}", when.format(node), then.format(node));
                }
                if let Some(otherwise) = otherwise {
                    string += &format!(" ELSE {}", otherwise.format(node));
                }
                string + " END"
            }
            Try(expr) => format!("TRY({})", expr.format(node)),
            Cached { expr, .. } => expr.format(node),
        }
    }
}

/// Evaluates a comparison, yielding NULL if either side is undefined.
fn compare(
    lhs: &Expression,
    rhs: &Expression,
    ctx: &RowContext,
    matches: impl Fn(Ordering) -> bool,
) -> Result<Field> {
    let lhs = lhs.evaluate_in(ctx)?;
    let rhs = rhs.evaluate_in(ctx)?;
    Ok(match lhs.sql_cmp(&rhs)? {
        Some(ordering) => Field::Boolean(matches(ordering)),
        None => Field::Null,
    })
}

/// Evaluates the WHEN/THEN branches of a CASE expression in order.
fn evaluate_case(
    operand: Option<Field>,
    branches: &[(Expression, Expression)],
    otherwise: &Option<Box<Expression>>,
    ctx: &RowContext,
) -> Result<Field> {
    for (when, then) in branches {
        let when = when.evaluate_in(ctx)?;
        let taken = match &operand {
            Some(operand) => operand.sql_cmp(&when)? == Some(Ordering::Equal),
            None => match when {
                Field::Boolean(b) => b,
                Field::Null => false,
                value => return errinput!("CASE condition returned {value}, expected boolean"),
            },
        };
        if taken {
            return then.evaluate_in(ctx);
        }
    }
    match otherwise {
        Some(otherwise) => otherwise.evaluate_in(ctx),
        None => Ok(Field::Null),
    }
}

/// Converts a SQL LIKE pattern into an anchored regex.
fn like_regex(pattern: &str) -> Result<regex::Regex> {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    Ok(regex::Regex::new(&regex)?)
}

impl From<Field> for Expression {
    fn from(value: Field) -> Self {
        Expression::Constant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Expression::*;

    fn col(index: usize) -> Box<Expression> {
        Box::new(Column(index))
    }

    fn lit(value: impl Into<Field>) -> Box<Expression> {
        Box::new(Constant(value.into()))
    }

    #[test]
    fn test_three_valued_logic() {
        let null = || lit(Field::Null);
        assert_eq!(And(lit(false), null()).evaluate(None), Ok(Field::Boolean(false)));
        assert_eq!(And(lit(true), null()).evaluate(None), Ok(Field::Null));
        assert_eq!(Or(null(), lit(true)).evaluate(None), Ok(Field::Boolean(true)));
        assert_eq!(Or(lit(false), null()).evaluate(None), Ok(Field::Null));
        assert_eq!(Not(null()).evaluate(None), Ok(Field::Null));
        assert!(And(lit(1), lit(true)).evaluate(None).is_err());
    }

    #[test]
    fn test_comparisons_and_columns() {
        let row = Row::from(vec![Field::Integer(2), Field::Float(2.0), Field::Null]);
        let eval = |e: Expression| e.evaluate(Some(&row)).unwrap();

        assert_eq!(eval(Equal(col(0), col(1))), Field::Boolean(true));
        assert_eq!(eval(Equal(col(0), col(2))), Field::Null);
        assert_eq!(eval(LessThan(col(0), lit(3))), Field::Boolean(true));
        assert_eq!(eval(IsNull(col(2))), Field::Boolean(true));
        assert_eq!(eval(Add(col(0), lit(3))), Field::Integer(5));
        assert!(Column(7).evaluate(Some(&row)).is_err());
        assert!(Column(0).evaluate(None).is_err());
    }

    #[test]
    fn test_like() {
        let like = |value: &str, pattern: &str| {
            Like(lit(value), lit(pattern)).evaluate(None).unwrap()
        };
        assert_eq!(like("hello", "h%o"), Field::Boolean(true));
        assert_eq!(like("hello", "h_llo"), Field::Boolean(true));
        assert_eq!(like("h.llo", "h.llo"), Field::Boolean(true));
        assert_eq!(like("hallo", "h.llo"), Field::Boolean(false));
    }

    #[test]
    fn test_case_and_try() {
        let case = Case {
            operand: Some(col(0)),
            branches: vec![(Constant(1.into()), Constant("one".into()))],
            otherwise: Some(lit("other")),
        };
        let one = Row::from(vec![Field::Integer(1)]);
        let two = Row::from(vec![Field::Integer(2)]);
        assert_eq!(case.evaluate(Some(&one)), Ok(Field::from("one")));
        assert_eq!(case.evaluate(Some(&two)), Ok(Field::from("other")));

        // Only the taken branch runs, so the division by zero is never hit.
        let guarded = Case {
            operand: None,
            branches: vec![(*lit(true), Constant(1.into()))],
            otherwise: Some(Box::new(Divide(lit(1), lit(0)))),
        };
        assert_eq!(guarded.evaluate(None), Ok(Field::Integer(1)));

        assert!(Divide(lit(1), lit(0)).evaluate(None).is_err());
        assert_eq!(Try(Box::new(Divide(lit(1), lit(0)))).evaluate(None), Ok(Field::Null));
    }

    #[test]
    fn test_slot_cache_marks_reset_per_row() {
        let cached = Cached {
            slot: 0,
            expr: Box::new(Multiply(col(0), lit(10))),
        };
        let slots = SlotCache::for_expressions([&cached]);
        assert_eq!(slots.len(), 1);

        let first = Row::from(vec![Field::Integer(1)]);
        let second = Row::from(vec![Field::Integer(2)]);

        slots.next_row();
        let ctx = RowContext::with_slots(Some(&first), &slots);
        assert_eq!(cached.evaluate_in(&ctx), Ok(Field::Integer(10)));
        assert!(slots.is_computed(0));

        slots.next_row();
        assert!(!slots.is_computed(0));
        let ctx = RowContext::with_slots(Some(&second), &slots);
        assert_eq!(cached.evaluate_in(&ctx), Ok(Field::Integer(20)));
    }

    #[test]
    fn test_case_branch_slots_do_not_leak() {
        let cached = Cached {
            slot: 0,
            expr: Box::new(Add(col(0), lit(1))),
        };
        let case = Case {
            operand: None,
            branches: vec![(*lit(true), cached.clone())],
            otherwise: None,
        };
        let slots = SlotCache::new(1);
        let row = Row::from(vec![Field::Integer(4)]);
        let ctx = RowContext::with_slots(Some(&row), &slots);

        slots.next_row();
        assert_eq!(case.evaluate_in(&ctx), Ok(Field::Integer(5)));
        assert!(!slots.is_computed(0));

        // A slot computed outside the CASE stays visible inside it.
        assert_eq!(cached.evaluate_in(&ctx), Ok(Field::Integer(5)));
        assert_eq!(case.evaluate_in(&ctx), Ok(Field::Integer(5)));
        assert!(slots.is_computed(0));
    }

    #[test]
    fn test_data_type() {
        let inputs = [DataType::Int, DataType::Float, DataType::Text];
        assert_eq!(Add(col(0), col(0)).data_type(&inputs), DataType::Int);
        assert_eq!(Add(col(0), col(1)).data_type(&inputs), DataType::Float);
        assert_eq!(Equal(col(2), col(2)).data_type(&inputs), DataType::Bool);
        assert_eq!(Column(9).data_type(&inputs), DataType::Null);
    }
}
