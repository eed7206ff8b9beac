//! Constant folding over the AST.
//!
//! Folding works bottom-up, so a literal produced by folding a child can be
//! folded again by its parent in the same pass. Operators are evaluated
//! through [`BinaryOp::apply`] / [`UnaryOp::apply`], the same code the VM
//! runs, and a division or remainder by a literal zero is left in place so
//! the error still happens at runtime.

use tracing::debug;

use crate::parser::AstNode;

/// Fold every constant subexpression of `ast`.
pub fn optimize(ast: AstNode) -> AstNode {
  let mut folds = 0;
  let ast = fold(ast, &mut folds);
  debug!(folds, "constant folding pass finished");
  ast
}

fn fold(node: AstNode, folds: &mut usize) -> AstNode {
  match node {
    AstNode::Unary { op, operand } => match fold(*operand, folds) {
      AstNode::Integer { value } => {
        *folds += 1;
        AstNode::number(op.apply(value))
      }
      operand => AstNode::unary(op, operand),
    },
    AstNode::Binary { op, lhs, rhs } => {
      let lhs = fold(*lhs, folds);
      let rhs = fold(*rhs, folds);
      if let (AstNode::Integer { value: l }, AstNode::Integer { value: r }) = (&lhs, &rhs)
        && let Some(value) = op.apply(*l, *r)
      {
        *folds += 1;
        return AstNode::number(value);
      }
      AstNode::binary(op, lhs, rhs)
    }
    AstNode::Assign { slot, value } => AstNode::assign(slot, fold(*value, folds)),
    AstNode::If {
      cond,
      then_branch,
      else_branch,
    } => AstNode::If {
      cond: Box::new(fold(*cond, folds)),
      then_branch: Box::new(fold(*then_branch, folds)),
      else_branch: else_branch.map(|branch| Box::new(fold(*branch, folds))),
    },
    AstNode::While { cond, body } => AstNode::While {
      cond: Box::new(fold(*cond, folds)),
      body: Box::new(fold(*body, folds)),
    },
    AstNode::PrintInt { value } => AstNode::PrintInt {
      value: Box::new(fold(*value, folds)),
    },
    AstNode::PrintStr { value } => AstNode::PrintStr {
      value: Box::new(fold(*value, folds)),
    },
    AstNode::Sequence { body } => AstNode::Sequence {
      body: body.into_iter().map(|child| fold(child, folds)).collect(),
    },
    leaf => leaf,
  }
}
