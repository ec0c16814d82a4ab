// query/mod.rs
//
// Component H: the query engine. `Query` is a postfix (RPN) sequence of
// constraint and operator terms, per spec §4.H; `Database` catalogs
// variables to their dataset/index files (§6); `QueryEngine` opens a
// `Database` and lowers a `Query` into per-partition region-math plans;
// `QueryCursor` streams the results. Grounded on
// original_source/include/pique/query/query.hpp,
// basic-query-engine.hpp, simple-query-engine.hpp, and io/database.hpp.

pub mod cursor;
pub mod database;
pub mod engine;
pub mod plan;

pub use cursor::{PartitionResult, QueryCursor};
pub use database::{DataVariable, Database};
pub use engine::QueryEngine;

use crate::region::SetOp;

/// One term of a postfix query expression. Unlike the original's class
/// hierarchy of `QueryTerm` subclasses, this is one tagged enum — the
/// evaluator is a single match, per spec §9.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTerm {
    Constraint(ConstraintTerm),
    UnaryNot,
    NAry(SetOp, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintTerm {
    pub varname: String,
    /// `None` means an open `-inf` bound.
    pub lower_bound: Option<f64>,
    /// `None` means an open `+inf` bound.
    pub upper_bound: Option<f64>,
}

pub type Query = Vec<QueryTerm>;

pub fn constraint(varname: impl Into<String>, lower_bound: Option<f64>, upper_bound: Option<f64>) -> Query {
    vec![QueryTerm::Constraint(ConstraintTerm {
        varname: varname.into(),
        lower_bound,
        upper_bound,
    })]
}

fn nary_query(op: SetOp, arity: usize, parts: Vec<Query>) -> Query {
    let mut out = Vec::new();
    for p in parts {
        out.extend(p);
    }
    out.push(QueryTerm::NAry(op, arity));
    out
}

pub fn and(left: Query, right: Query) -> Query {
    nary_query(SetOp::Intersection, 2, vec![left, right])
}

pub fn or(left: Query, right: Query) -> Query {
    nary_query(SetOp::Union, 2, vec![left, right])
}

pub fn and_not(left: Query, right: Query) -> Query {
    nary_query(SetOp::Difference, 2, vec![left, right])
}

pub fn xor(left: Query, right: Query) -> Query {
    nary_query(SetOp::SymmetricDifference, 2, vec![left, right])
}

pub fn not(mut inner: Query) -> Query {
    inner.push(QueryTerm::UnaryNot);
    inner
}

/// Every distinct variable name referenced by a query's constraint terms,
/// in first-occurrence order.
pub fn referenced_variables(query: &Query) -> Vec<String> {
    let mut seen = Vec::new();
    for term in query {
        if let QueryTerm::Constraint(c) = term {
            if !seen.contains(&c.varname) {
                seen.push(c.varname.clone());
            }
        }
    }
    seen
}
