//! ProcessClassifier (spec §4.1): inspects a procedural block's sensitivity
//! list (and, for `initial` blocks, its body shape) and decides which
//! lowering component should handle it.

use crate::hdl::{BlockKeyword, Edge, ProceduralBlock, SensItem, Stmt};
use crate::ProcessKind;

/// ProcessClassifier's output: a [`ProcessKind`] plus, where applicable, the
/// extracted clock and reset edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// the chosen lowering strategy
    pub kind: ProcessKind,
    /// the clock edge, for FF/AsyncResetFF/SrFF
    pub clock: Option<SensItem>,
    /// the primary (first) reset edge, for AsyncResetFF/SrFF
    pub reset: Option<SensItem>,
    /// every edge-triggered sensitivity item, in source order (used by SR-FF
    /// lowering, which needs one sync rule per edge).
    pub edges: Vec<SensItem>,
    /// `has_async_reset` attribute
    pub has_async_reset: bool,
    /// `is_sr_ff` attribute (3+ edges in the sensitivity list)
    pub is_sr_ff: bool,
}

/// Classify a procedural block per spec §4.1's algorithm.
pub fn classify(block: &ProceduralBlock) -> Classification {
    match &block.sensitivity {
        None => {
            if block.keyword == BlockKeyword::Initial {
                classify_initial(&block.body)
            } else {
                // always_comb with no explicit list: level-sensitive comb.
                Classification {
                    kind: ProcessKind::Comb,
                    clock: None,
                    reset: None,
                    edges: Vec::new(),
                    has_async_reset: false,
                    is_sr_ff: false,
                }
            }
        }
        Some(items) => {
            let flat = crate::hdl::flatten_sensitivity(items);
            let edges: Vec<SensItem> = flat.iter().filter(|i| i.edge.is_some()).cloned().collect();
            match edges.len() {
                0 => Classification {
                    kind: ProcessKind::Comb,
                    clock: None,
                    reset: None,
                    edges,
                    has_async_reset: false,
                    is_sr_ff: false,
                },
                1 => Classification {
                    kind: ProcessKind::Ff,
                    clock: edges.first().cloned(),
                    reset: None,
                    edges,
                    has_async_reset: false,
                    is_sr_ff: false,
                },
                n => Classification {
                    kind: ProcessKind::AsyncResetFf,
                    clock: edges.first().cloned(),
                    reset: edges.get(1).cloned(),
                    is_sr_ff: n >= 3,
                    edges,
                    has_async_reset: true,
                },
            }
        }
    }
}

fn classify_initial(body: &Stmt) -> Classification {
    let kind = if contains_interpreted_shape(body) {
        ProcessKind::InitialInterpreted
    } else if contains_if_or_case(body) {
        ProcessKind::InitialComb
    } else {
        ProcessKind::InitialSync
    };
    Classification {
        kind,
        clock: None,
        reset: None,
        edges: Vec::new(),
        has_async_reset: false,
        is_sr_ff: false,
    }
}

/// true if the body needs the compile-time interpreter: a for-loop whose
/// initializer declares a new variable, a named-begin with local variable
/// declarations, or a for-loop with control flow in its body assigning to
/// scalars.
fn contains_interpreted_shape(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::For { new_var, body, .. } => *new_var || for_body_has_control_flow_and_scalar_assign(body),
        Stmt::NamedBegin { locals, body, .. } => {
            !locals.is_empty() || body.iter().any(contains_interpreted_shape)
        }
        Stmt::Begin(body) => body.iter().any(contains_interpreted_shape),
        Stmt::If { then, els, .. } => {
            contains_interpreted_shape(then) || els.as_deref().is_some_and(contains_interpreted_shape)
        }
        Stmt::Case { items, default, .. } => {
            items.iter().any(|(_, s)| contains_interpreted_shape(s))
                || default.as_deref().is_some_and(contains_interpreted_shape)
        }
        Stmt::Repeat { body, .. } => contains_interpreted_shape(body),
        _ => false,
    }
}

fn for_body_has_control_flow_and_scalar_assign(body: &Stmt) -> bool {
    let has_control_flow = matches!(body, Stmt::If { .. } | Stmt::Case { .. });
    let has_scalar_assign = matches!(
        body,
        Stmt::Assign {
            lhs: crate::hdl::Expr::Ref(_),
            ..
        }
    ) || matches!(body, Stmt::Begin(stmts) | Stmt::NamedBegin { body: stmts, .. } if stmts.iter().any(|s| matches!(s, Stmt::Assign { lhs: crate::hdl::Expr::Ref(_), .. })));
    has_control_flow && has_scalar_assign
}

/// true if an if/case appears anywhere in the body, at any depth.
fn contains_if_or_case(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::If { .. } | Stmt::Case { .. } => true,
        Stmt::Begin(body) => body.iter().any(contains_if_or_case),
        Stmt::NamedBegin { body, .. } => body.iter().any(contains_if_or_case),
        Stmt::For { body, .. } => contains_if_or_case(body),
        Stmt::Repeat { body, .. } => contains_if_or_case(body),
        _ => false,
    }
}
