// region_math.rs
//
// Postfix set-algebraic expressions over stored region IDs, and the stack
// evaluator that runs them against a lazy region source. Index-encoding
// schemes (src/index_encoding) build these; the query engine evaluates them.

use crate::error::PiqueError;
use crate::region::setops::SetOperations;
use crate::region::{RegionEncoding, SetOp};

#[derive(Debug, Clone, PartialEq)]
pub enum RegionMathTerm {
    RegionTerm(u32),
    UnaryNot,
    NAryOp(SetOp, usize),
}

pub type RegionMath = Vec<RegionMathTerm>;

pub fn region_term(id: u32) -> RegionMath {
    vec![RegionMathTerm::RegionTerm(id)]
}

/// Concatenates `terms` followed by an `arity`-ary op node; `terms.len()`
/// becomes the arity.
pub fn nary(op: SetOp, terms: Vec<RegionMath>) -> RegionMath {
    let arity = terms.len();
    let mut out = Vec::new();
    for t in terms {
        out.extend(t);
    }
    out.push(RegionMathTerm::NAryOp(op, arity));
    out
}

pub fn binary(op: SetOp, a: RegionMath, b: RegionMath) -> RegionMath {
    nary(op, vec![a, b])
}

pub fn complement(mut expr: RegionMath) -> RegionMath {
    expr.push(RegionMathTerm::UnaryNot);
    expr
}

/// Supplies region data by stored region ID. The evaluator calls this only
/// when a `RegionTerm`'s turn comes, so subexpressions pruned by cost
/// analysis before evaluation never trigger I/O.
pub trait RegionSource {
    fn read_region(&self, region_id: u32) -> Result<RegionEncoding, PiqueError>;
}

/// Runs `math` on a stack, fetching each `RegionTerm` lazily from `source`
/// and dispatching unary/n-ary ops through `ops`. Operands popped off the
/// stack are owned outright (never aliased elsewhere), so they're always
/// eligible for `ops`'s in-place variants without changing semantics.
pub fn evaluate(
    math: &[RegionMathTerm],
    source: &dyn RegionSource,
    ops: &dyn SetOperations,
) -> Result<RegionEncoding, PiqueError> {
    let mut stack: Vec<RegionEncoding> = Vec::new();
    for term in math {
        match term {
            RegionMathTerm::RegionTerm(id) => {
                stack.push(source.read_region(*id)?);
            }
            RegionMathTerm::UnaryNot => {
                let top = pop(&mut stack, "UnaryOp(NOT)")?;
                stack.push(ops.inplace_unary_not(top)?);
            }
            RegionMathTerm::NAryOp(op, arity) => {
                if stack.len() < *arity {
                    return Err(PiqueError::MalformedQuery(format!(
                        "NAryOp({op:?}, {arity}) needs {arity} operands, stack has {}",
                        stack.len()
                    )));
                }
                let operands = stack.split_off(stack.len() - arity);
                stack.push(ops.inplace_nary(operands, *op)?);
            }
        }
    }
    if stack.len() != 1 {
        return Err(PiqueError::MalformedQuery(format!(
            "RegionMath left {} values on the stack, expected exactly 1",
            stack.len()
        )));
    }
    Ok(stack.pop().unwrap())
}

fn pop(stack: &mut Vec<RegionEncoding>, ctx: &str) -> Result<RegionEncoding, PiqueError> {
    stack
        .pop()
        .ok_or_else(|| PiqueError::MalformedQuery(format!("{ctx}: empty stack")))
}
