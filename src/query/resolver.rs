use std::collections::BTreeSet;
use std::sync::Arc;
use log::debug;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::time::parse_time_expression;
use crate::core::types::{FieldValue, TimeWindow};
use crate::query::ast::{
    BoundConstraint, BoundOperand, BoundTable, BoundTerm, ColumnBinding, ColumnRef, Constraint,
    Operand, Operator, ParsedQuery, ResolvedQuery, Selection, Term,
};
use crate::schema::record::Record;
use crate::schema::schema::SchemaRegistry;

/// Binds a parsed query against the schema registry.
pub struct Resolver<'a> {
    registry: &'a SchemaRegistry,
    default_author: &'a str,
    max_tables: usize,
    equality_window: f64,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &'a Config) -> Self {
        Resolver {
            registry,
            default_author: &config.default_author,
            max_tables: config.max_tables,
            equality_window: config.time_equality_window,
        }
    }

    pub fn resolve(&self, parsed: ParsedQuery) -> Result<ResolvedQuery> {
        if parsed.tables.is_empty() {
            return Err(Error::resolve("query names no tables"));
        }
        if parsed.tables.len() > self.max_tables {
            return Err(Error::resolve(format!(
                "{} tables named, at most {} allowed",
                parsed.tables.len(),
                self.max_tables
            )));
        }

        let mut tables: Vec<BoundTable> = Vec::with_capacity(parsed.tables.len());
        for (index, reference) in parsed.tables.iter().enumerate() {
            let schema = self.registry.require(&reference.table)?;
            if index > 0 && reference.alias.is_none() {
                return Err(Error::resolve(format!("no reference after table {}", reference.table)));
            }
            let name = reference.reference_name();
            if tables.iter().any(|t| t.reference.reference_name().eq_ignore_ascii_case(name)) {
                return Err(Error::resolve(format!("ambiguous table reference '{}'", name)));
            }
            tables.push(BoundTable {
                reference: reference.clone(),
                author: reference.author.clone().unwrap_or_else(|| self.default_author.to_string()),
                schema,
                window: TimeWindow::unbounded(),
            });
        }

        let constraints = parsed
            .constraints
            .iter()
            .map(|c| self.bind_constraint(&tables, c))
            .collect::<Result<Vec<_>>>()?;

        for (index, table) in tables.iter_mut().enumerate() {
            table.window = self.scan_window(index, table, &constraints);
            if !table.window.is_unbounded() {
                debug!("{} scan window [{}, {}]", table.name(), table.window.tmin, table.window.tmax);
            }
        }

        let projection = match &parsed.selection {
            Selection::All | Selection::Table(_) => (0..tables[0].schema.member_count())
                .map(|column| ColumnBinding { table: 0, column })
                .collect(),
            Selection::Columns(columns) => columns
                .iter()
                .map(|c| bind_column(&tables, c, true))
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(ResolvedQuery { parsed, tables, constraints, projection })
    }

    fn bind_constraint(&self, tables: &[BoundTable], constraint: &Constraint) -> Result<BoundConstraint> {
        let left = bind_term(tables, &constraint.left)?;
        let right = match &constraint.right {
            Operand::Sum(terms) => BoundOperand::Sum(
                terms
                    .iter()
                    .map(|t| Ok((t.negative, bind_term(tables, &t.term)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Operand::Pattern(pattern) => match pattern.strip_suffix('%') {
                Some(prefix) => BoundOperand::Pattern { text: prefix.to_string(), prefix: true },
                None => BoundOperand::Pattern { text: pattern.clone(), prefix: false },
            },
            Operand::List { values, integers } => BoundOperand::List {
                values: values.clone(),
                integers: integers.clone(),
            },
        };

        if matches!(constraint.op, Operator::Like | Operator::In) && left.column().is_none() {
            return Err(Error::resolve(format!("'{}' needs a column on its left", constraint.op)));
        }

        let mut bound = BoundConstraint { op: constraint.op, left, right };
        coerce_time_literals(tables, &mut bound)?;
        Ok(bound)
    }

    /// `(tmin, tmax)` implied by constant constraints on the table's time column.
    fn scan_window(&self, index: usize, table: &BoundTable, constraints: &[BoundConstraint]) -> TimeWindow {
        let mut window = TimeWindow::unbounded();
        let Some(time_column) = table.schema.time_column else {
            return window;
        };
        let target = ColumnBinding { table: index, column: time_column };
        for constraint in constraints {
            if constraint.left.column() != Some(target) {
                continue;
            }
            let Some(value) = constraint.constant_sum() else {
                continue;
            };
            match constraint.op {
                Operator::Gt | Operator::Ge => window.raise_min(value),
                Operator::Lt | Operator::Le => window.lower_max(value),
                Operator::Eq => {
                    window.raise_min(value - self.equality_window);
                    window.lower_max(value + self.equality_window);
                }
                Operator::Like | Operator::In => {}
            }
        }
        window
    }
}

/// Explicit qualifiers bind to that table; bare names try the secondary
/// tables first and then the primary, unless `primary_first` is set.
fn bind_column(tables: &[BoundTable], column: &ColumnRef, primary_first: bool) -> Result<ColumnBinding> {
    if let Some(qualifier) = &column.qualifier {
        let table = tables
            .iter()
            .position(|t| t.reference.answers_to(qualifier))
            .ok_or_else(|| Error::resolve(format!("unknown table reference '{}'", qualifier)))?;
        let index = tables[table].schema.column_index(&column.column).ok_or_else(|| {
            Error::resolve(format!("{} has no column '{}'", tables[table].name(), column.column))
        })?;
        return Ok(ColumnBinding { table, column: index });
    }

    let mut order: Vec<usize> = (1..tables.len()).collect();
    if primary_first {
        order.insert(0, 0);
    } else {
        order.push(0);
    }
    order
        .into_iter()
        .find_map(|table| {
            tables[table]
                .schema
                .column_index(&column.column)
                .map(|index| ColumnBinding { table, column: index })
        })
        .ok_or_else(|| Error::resolve(format!("unknown column '{}'", column.column)))
}

fn bind_term(tables: &[BoundTable], term: &Term) -> Result<BoundTerm> {
    Ok(match term {
        Term::Number(v) => BoundTerm::Number(*v),
        Term::Text(s) => BoundTerm::Text(s.clone()),
        Term::Column(c) => BoundTerm::Column(bind_column(tables, c, false)?),
    })
}

fn is_numeric_column(tables: &[BoundTable], term: &BoundTerm) -> bool {
    term.column()
        .map(|b| tables[b.table].schema.columns[b.column].column_type.is_numeric())
        .unwrap_or(false)
}

/// String constants compared against numbers are read as time expressions,
/// so `time >= '2004/01/05 12:00:00'` works.
fn coerce_time_literals(tables: &[BoundTable], constraint: &mut BoundConstraint) -> Result<()> {
    let BoundOperand::Sum(terms) = &mut constraint.right else {
        return Ok(());
    };
    let numeric = is_numeric_column(tables, &constraint.left)
        || matches!(constraint.left, BoundTerm::Number(_))
        || terms.len() > 1
        || terms.iter().any(|(_, t)| matches!(t, BoundTerm::Number(_)) || is_numeric_column(tables, t));
    if !numeric {
        return Ok(());
    }
    let to_time = |term: &mut BoundTerm| -> Result<()> {
        if let BoundTerm::Text(s) = term {
            let epoch = parse_time_expression(s).ok_or_else(|| {
                Error::resolve(format!("'{}' is neither a number nor a time", s))
            })?;
            *term = BoundTerm::Number(epoch);
        }
        Ok(())
    };
    to_time(&mut constraint.left)?;
    for (_, term) in terms.iter_mut() {
        to_time(term)?;
    }
    Ok(())
}

/// Stations a row-table scan can restrict itself to.
#[derive(Debug, Clone, PartialEq)]
pub enum StationFilter {
    Exact(BTreeSet<String>),
    Prefix(String),
}

impl StationFilter {
    pub fn admits(&self, station: &str) -> bool {
        match self {
            StationFilter::Exact(names) => names.contains(&station.to_ascii_uppercase()),
            StationFilter::Prefix(prefix) => station
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        }
    }
}

/// Decide whether the primary table's station column is pinned down by the
/// constraints: `sta = 'X'`, `sta in (...)`, `sta like 'AB%'`, or a join
/// `sta = t.col` against a pre-filtered secondary table. Anything else
/// returns `None` and the scan reads every station directory.
pub fn station_filter(query: &ResolvedQuery, secondary: &[Arc<Vec<Arc<Record>>>]) -> Option<StationFilter> {
    let sta = query.primary().schema.column_index("sta")?;
    let target = ColumnBinding { table: 0, column: sta };
    let mut exact: Option<BTreeSet<String>> = None;
    let mut prefix: Option<String> = None;

    let mut narrow = |names: BTreeSet<String>| {
        exact = Some(match exact.take() {
            Some(current) => current.intersection(&names).cloned().collect(),
            None => names,
        });
    };

    for constraint in &query.constraints {
        if constraint.left.column() != Some(target) {
            continue;
        }
        match (&constraint.op, &constraint.right) {
            (Operator::Eq, BoundOperand::Sum(terms)) if terms.len() == 1 && !terms[0].0 => match &terms[0].1 {
                BoundTerm::Text(name) => narrow(BTreeSet::from([name.to_ascii_uppercase()])),
                BoundTerm::Column(b) if b.table > 0 => {
                    let records = secondary.get(b.table - 1)?;
                    let names = records
                        .iter()
                        .filter_map(|r| match r.get(b.column) {
                            Some(FieldValue::Text(s)) => Some(s.to_ascii_uppercase()),
                            _ => None,
                        })
                        .collect();
                    narrow(names);
                }
                _ => {}
            },
            (Operator::In, BoundOperand::List { values, .. }) => {
                narrow(values.iter().map(|v| v.to_ascii_uppercase()).collect());
            }
            (Operator::Like, BoundOperand::Pattern { text, prefix: is_prefix }) if !text.contains('%') => {
                if *is_prefix {
                    prefix.get_or_insert_with(|| text.clone());
                } else {
                    narrow(BTreeSet::from([text.to_ascii_uppercase()]));
                }
            }
            _ => {}
        }
    }

    exact.map(StationFilter::Exact).or(prefix.map(StationFilter::Prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::query::parser::QueryParser;

    fn resolve(q: &str) -> Result<ResolvedQuery> {
        let registry = SchemaRegistry::builtin();
        let config = Config::default().with_author("idc");
        let parsed = QueryParser::new(&registry, config.max_tables).parse(q)?;
        Resolver::new(&registry, &config).resolve(parsed)
    }

    #[test]
    fn time_constraints_set_scan_window() {
        let q = resolve("select * from origin where time >= 123.0 and time <= 456.0").unwrap();
        assert_eq!(q.primary().window, TimeWindow::new(123.0, 456.0));
        assert_eq!(q.primary().author, "idc");
        assert_eq!(q.projection.len(), q.primary().schema.member_count());
    }

    #[test]
    fn equality_on_time_opens_a_minute_each_way() {
        let q = resolve("select * from origin where time = 1000").unwrap();
        assert_eq!(q.primary().window, TimeWindow::new(940.0, 1060.0));
    }

    #[test]
    fn cross_table_terms_do_not_narrow_window() {
        let q = resolve("select o.* from origin o, arrival a where o.time >= a.time - 600").unwrap();
        assert!(q.primary().window.is_unbounded());
        assert_eq!(q.constraints[0].tables(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn time_strings_become_epochs() {
        let q = resolve("select * from origin where time >= '2004/01/06 00:00:00' and time < '2004/01/07'").unwrap();
        assert_eq!(q.primary().window, TimeWindow::new(1073347200.0, 1073433600.0));
        assert!(resolve("select * from origin where time > 'yesterday'").is_err());
    }

    #[test]
    fn bare_columns_prefer_secondary_tables() {
        let q = resolve("select w.* from wfdisc w, affiliation a where sta = 'ANMO'").unwrap();
        assert_eq!(q.constraints[0].left, BoundTerm::Column(ColumnBinding { table: 1, column: 1 }));
    }

    #[test]
    fn secondary_table_needs_alias() {
        let err = resolve("select * from origin o, arrival").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Resolve);
        let err = resolve("select * from origin o, arrival o").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Resolve);
        let err = resolve("select * from origin where nosuch = 3").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Resolve);
    }

    #[test]
    fn station_filter_shapes() {
        let q = resolve("select * from wfdisc where sta = 'anmo'").unwrap();
        assert_eq!(station_filter(&q, &[]), Some(StationFilter::Exact(BTreeSet::from(["ANMO".to_string()]))));

        let q = resolve("select * from wfdisc where sta like 'FI%'").unwrap();
        let filter = station_filter(&q, &[]).unwrap();
        assert!(filter.admits("FIA0"));
        assert!(!filter.admits("XFIA"));

        let q = resolve("select * from wfdisc where sta in ('A1', 'B2') and sta = 'B2'").unwrap();
        assert_eq!(station_filter(&q, &[]), Some(StationFilter::Exact(BTreeSet::from(["B2".to_string()]))));

        let q = resolve("select * from wfdisc where chan = 'BHZ'").unwrap();
        assert_eq!(station_filter(&q, &[]), None);
    }
}
