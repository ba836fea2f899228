use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use crate::core::types::TimeWindow;
use crate::schema::schema::TableSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Operator> {
        match token.to_ascii_lowercase().as_str() {
            "=" => Some(Operator::Eq),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "like" => Some(Operator::Like),
            "in" => Some(Operator::In),
            _ => None,
        }
    }

    /// The operator that keeps the meaning when both sides swap.
    pub fn flipped(self) -> Operator {
        match self {
            Operator::Lt => Operator::Gt,
            Operator::Le => Operator::Ge,
            Operator::Gt => Operator::Lt,
            Operator::Ge => Operator::Le,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::In => "in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `from` clause item: `[author.]table [alias]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub author: Option<String>,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// Name used to qualify columns: the alias if there is one.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn answers_to(&self, qualifier: &str) -> bool {
        match &self.alias {
            Some(alias) => alias.eq_ignore_ascii_case(qualifier),
            None => self.table.eq_ignore_ascii_case(qualifier),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Number(f64),
    Text(String),
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedTerm {
    pub negative: bool,
    pub term: Term,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Signed sum of terms, e.g. `o.time - 600`.
    Sum(Vec<SignedTerm>),
    /// `like` pattern as written.
    Pattern(String),
    /// `in` list; numeric members are also kept as integers.
    List { values: Vec<String>, integers: Vec<i64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub op: Operator,
    pub left: Term,
    pub right: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    Table(String),
    Columns(Vec<ColumnRef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub text: String,
    pub distinct: bool,
    pub selection: Selection,
    pub tables: Vec<TableRef>,   // tables[0] is the primary table
    pub constraints: Vec<Constraint>,
}

// Bound forms, produced by the resolver

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub table: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundTerm {
    Number(f64),
    Text(String),
    Column(ColumnBinding),
}

impl BoundTerm {
    pub fn column(&self) -> Option<ColumnBinding> {
        match self {
            BoundTerm::Column(binding) => Some(*binding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundOperand {
    Sum(Vec<(bool, BoundTerm)>),
    Pattern { text: String, prefix: bool },
    List { values: Vec<String>, integers: Vec<i64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundConstraint {
    pub op: Operator,
    pub left: BoundTerm,
    pub right: BoundOperand,
}

impl BoundConstraint {
    /// Indices of every table a term of this constraint refers to.
    pub fn tables(&self) -> BTreeSet<usize> {
        let mut tables = BTreeSet::new();
        if let Some(binding) = self.left.column() {
            tables.insert(binding.table);
        }
        if let BoundOperand::Sum(terms) = &self.right {
            for (_, term) in terms {
                if let Some(binding) = term.column() {
                    tables.insert(binding.table);
                }
            }
        }
        tables
    }

    /// True when every term is a constant or a column of `table`.
    pub fn is_local_to(&self, table: usize) -> bool {
        self.tables().iter().all(|&t| t == table)
    }

    /// Constant value of the right-hand side, if it has no column terms.
    pub fn constant_sum(&self) -> Option<f64> {
        match &self.right {
            BoundOperand::Sum(terms) => terms.iter().try_fold(0.0, |acc, (negative, term)| {
                match term {
                    BoundTerm::Number(v) => Some(if *negative { acc - v } else { acc + v }),
                    _ => None,
                }
            }),
            _ => None,
        }
    }
}

/// A `from` table after schema lookup.
#[derive(Debug, Clone)]
pub struct BoundTable {
    pub reference: TableRef,
    pub author: String,
    pub schema: Arc<TableSchema>,
    pub window: TimeWindow,
}

impl BoundTable {
    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub parsed: ParsedQuery,
    pub tables: Vec<BoundTable>,
    pub constraints: Vec<BoundConstraint>,
    pub projection: Vec<ColumnBinding>,
}

impl ResolvedQuery {
    pub fn primary(&self) -> &BoundTable {
        &self.tables[0]
    }

    pub fn secondaries(&self) -> &[BoundTable] {
        &self.tables[1..]
    }

    pub fn column_names(&self) -> Vec<String> {
        self.projection
            .iter()
            .map(|b| {
                let table = &self.tables[b.table];
                format!("{}.{}", table.reference.reference_name(), table.schema.columns[b.column].name)
            })
            .collect()
    }
}
