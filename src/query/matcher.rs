use std::cmp::Ordering;
use crate::core::types::FieldValue;
use crate::query::ast::{BoundConstraint, BoundOperand, BoundTerm, Operator};
use crate::schema::record::Record;

/// Constraint evaluation over a partially built join tuple.
///
/// Constraints are grouped by the highest table index they mention, so a
/// tuple of `level + 1` records can be checked as soon as the record for
/// `level` is chosen and rejected before deeper tables are scanned.
#[derive(Debug, Clone)]
pub struct TupleMatcher {
    levels: Vec<Vec<BoundConstraint>>,
}

impl TupleMatcher {
    pub fn new(constraints: &[BoundConstraint], table_count: usize) -> Self {
        let mut levels = vec![Vec::new(); table_count.max(1)];
        for constraint in constraints {
            let level = constraint.tables().into_iter().next_back().unwrap_or(0);
            levels[level.min(table_count.saturating_sub(1))].push(constraint.clone());
        }
        TupleMatcher { levels }
    }

    pub fn constraints_at(&self, level: usize) -> &[BoundConstraint] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if every constraint whose last table is `level` holds for `tuple`.
    pub fn accepts(&self, level: usize, tuple: &[&Record]) -> bool {
        self.constraints_at(level).iter().all(|c| matches(c, tuple))
    }

    /// Constraints that only mention `table`, used to pre-filter its records.
    pub fn local_to(constraints: &[BoundConstraint], table: usize) -> Vec<BoundConstraint> {
        constraints
            .iter()
            .filter(|c| c.tables().contains(&table) && c.is_local_to(table))
            .cloned()
            .collect()
    }
}

/// Evaluate one constraint with `tuple[i]` standing for table `i`.
/// A term naming a table outside the tuple makes the constraint fail.
pub fn matches(constraint: &BoundConstraint, tuple: &[&Record]) -> bool {
    evaluate(constraint, &|table| tuple.get(table).copied())
}

/// Evaluate a constraint that only mentions `table` against one record.
pub fn matches_single(constraint: &BoundConstraint, table: usize, record: &Record) -> bool {
    evaluate(constraint, &|t| (t == table).then_some(record))
}

fn evaluate<'r>(constraint: &BoundConstraint, lookup: &dyn Fn(usize) -> Option<&'r Record>) -> bool {
    let Some(left) = term_value(&constraint.left, lookup) else {
        return false;
    };

    match (&constraint.op, &constraint.right) {
        (Operator::Like, BoundOperand::Pattern { text, prefix }) => {
            let value = left.to_string();
            if *prefix {
                value
                    .get(..text.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(text))
            } else {
                value.eq_ignore_ascii_case(text)
            }
        }
        (Operator::In, BoundOperand::List { values, integers }) => match &left {
            FieldValue::Text(s) => values.iter().any(|v| v.eq_ignore_ascii_case(s)),
            other => {
                let Some(v) = other.as_f64() else { return false };
                integers.iter().any(|&i| i as f64 == v)
                    || values.iter().filter_map(|s| s.parse::<f64>().ok()).any(|x| x == v)
            }
        },
        (op, BoundOperand::Sum(terms)) => {
            let Some(right) = sum_value(terms, lookup) else {
                return false;
            };
            let Some(ordering) = left.compare(&right) else {
                return false;
            };
            match op {
                Operator::Eq => ordering == Ordering::Equal,
                Operator::Lt => ordering == Ordering::Less,
                Operator::Le => ordering != Ordering::Greater,
                Operator::Gt => ordering == Ordering::Greater,
                Operator::Ge => ordering != Ordering::Less,
                Operator::Like | Operator::In => false,
            }
        }
        _ => false,
    }
}

fn term_value<'r>(term: &BoundTerm, lookup: &dyn Fn(usize) -> Option<&'r Record>) -> Option<FieldValue> {
    match term {
        BoundTerm::Number(v) => Some(FieldValue::Number(*v)),
        BoundTerm::Text(s) => Some(FieldValue::Text(s.clone())),
        BoundTerm::Column(b) => lookup(b.table)?.get(b.column).cloned(),
    }
}

/// A lone term keeps its own type; anything longer is summed as doubles.
fn sum_value<'r>(terms: &[(bool, BoundTerm)], lookup: &dyn Fn(usize) -> Option<&'r Record>) -> Option<FieldValue> {
    if let [(false, term)] = terms {
        return term_value(term, lookup);
    }
    let mut total = 0.0;
    for (negative, term) in terms {
        let v = term_value(term, lookup)?.as_f64()?;
        if *negative {
            total -= v;
        } else {
            total += v;
        }
    }
    Some(FieldValue::Number(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::ColumnBinding;
    use crate::schema::schema::SchemaRegistry;

    fn arrival(sta: &str, time: f64) -> Record {
        let mut r = Record::new(SchemaRegistry::builtin().get("arrival").unwrap());
        r.set_by_name("sta", FieldValue::Text(sta.into())).unwrap();
        r.set_by_name("time", FieldValue::Time(time)).unwrap();
        r.set_by_name("arid", FieldValue::Integer(7)).unwrap();
        r
    }

    fn col(table: usize, column: usize) -> BoundTerm {
        BoundTerm::Column(ColumnBinding { table, column })
    }

    #[test]
    fn like_prefix_is_anchored_and_case_insensitive() {
        let like = BoundConstraint {
            op: Operator::Like,
            left: col(0, 0),
            right: BoundOperand::Pattern { text: "FIA".into(), prefix: true },
        };
        assert!(matches(&like, &[&arrival("FIA0", 0.0)]));
        assert!(matches(&like, &[&arrival("fiax", 0.0)]));
        assert!(!matches(&like, &[&arrival("XFIA", 0.0)]));
        assert!(!matches(&like, &[&arrival("FI", 0.0)]));
    }

    #[test]
    fn in_list_handles_text_and_integers() {
        let text = BoundConstraint {
            op: Operator::In,
            left: col(0, 0),
            right: BoundOperand::List { values: vec!["ANMO".into(), "KONO".into()], integers: vec![] },
        };
        assert!(matches(&text, &[&arrival("kono", 0.0)]));
        assert!(!matches(&text, &[&arrival("COLA", 0.0)]));

        let ints = BoundConstraint {
            op: Operator::In,
            left: col(0, 2),
            right: BoundOperand::List { values: vec!["3".into(), "7".into()], integers: vec![3, 7] },
        };
        assert!(matches(&ints, &[&arrival("X", 0.0)]));
    }

    #[test]
    fn sums_compare_across_tables() {
        // a.time >= o.time - 600
        let c = BoundConstraint {
            op: Operator::Ge,
            left: col(1, 1),
            right: BoundOperand::Sum(vec![(false, col(0, 1)), (true, BoundTerm::Number(600.0))]),
        };
        let o = arrival("A", 1000.0);
        assert!(matches(&c, &[&o, &arrival("B", 400.0)]));
        assert!(!matches(&c, &[&o, &arrival("B", 399.0)]));
        assert!(!matches(&c, &[&o]));
    }

    #[test]
    fn single_record_check_ignores_other_tables() {
        let c = BoundConstraint {
            op: Operator::Eq,
            left: col(2, 0),
            right: BoundOperand::Sum(vec![(false, BoundTerm::Text("ANMO".into()))]),
        };
        assert!(matches_single(&c, 2, &arrival("anmo", 0.0)));
        assert!(!matches_single(&c, 1, &arrival("anmo", 0.0)));
    }

    #[test]
    fn constraints_group_by_last_table() {
        let local = BoundConstraint {
            op: Operator::Eq,
            left: col(0, 0),
            right: BoundOperand::Sum(vec![(false, BoundTerm::Text("A".into()))]),
        };
        let join = BoundConstraint {
            op: Operator::Eq,
            left: col(0, 2),
            right: BoundOperand::Sum(vec![(false, col(2, 2))]),
        };
        let matcher = TupleMatcher::new(&[local.clone(), join.clone()], 3);
        assert_eq!(matcher.constraints_at(0), &[local.clone()]);
        assert!(matcher.constraints_at(1).is_empty());
        assert_eq!(matcher.constraints_at(2), &[join]);
        assert_eq!(TupleMatcher::local_to(&[local.clone()], 0), vec![local]);
    }
}
