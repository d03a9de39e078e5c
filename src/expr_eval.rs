//! ExprEval: the pure expression-lowering primitive `import_expression`
//! (spec §6). Folds constants where possible and otherwise emits operator
//! cells into the module under construction.

use std::collections::HashMap;

use crate::error::{DiagnosticKind, Severity, SourceLoc};
use crate::hdl::{BinOp, Expr, UnOp};
use crate::xlate::Translator;
use crate::{Cell, Constant, Module, SigSpec, Wire};

/// width inference result alongside the lowered signal: `import_expression`'s
/// contract is "a SigSpec of width equal to the expression's elaborated
/// width", so every recursive call returns a `(SigSpec, width)` pair and the
/// width is what drives cell-port sizing.
pub fn import_expression(
    expr: &Expr,
    env: Option<&HashMap<String, SigSpec>>,
    module: &mut Module,
    translator: &mut Translator,
) -> SigSpec {
    match expr {
        Expr::Const(value, width) => SigSpec::const_uint(*value as u64, *width),
        Expr::Ref(name) => resolve_ref(name, env, module, translator),
        Expr::BitSelect(base, index) => {
            let base_sig = import_expression(base, env, module, translator);
            match index.as_ref() {
                Expr::Const(idx, _) => base_sig.extract(*idx as usize, 1),
                other => {
                    // non-constant index: best-effort, fold what we can and
                    // otherwise fall back to bit 0 with a diagnostic.
                    if let Some(idx) = const_fold(other) {
                        base_sig.extract(idx as usize, 1)
                    } else {
                        translator.report(
                            Severity::Warning,
                            DiagnosticKind::UnsupportedConstruct,
                            "non-constant bit-select index, using bit 0",
                            SourceLoc::default(),
                        );
                        base_sig.extract(0, 1)
                    }
                }
            }
        }
        Expr::PartSelect(base, msb, lsb) => {
            let base_sig = import_expression(base, env, module, translator);
            let width = msb.abs_diff(*lsb) + 1;
            base_sig.extract((*lsb).min(*msb), width)
        }
        Expr::Concat(parts) => {
            let mut sig = SigSpec::Concat(Vec::new());
            for part in parts {
                let part_sig = import_expression(part, env, module, translator);
                sig = sig.append(part_sig);
            }
            sig
        }
        Expr::Unary(op, inner) => import_unary(*op, inner, env, module, translator),
        Expr::Binary(op, lhs, rhs) => import_binary(*op, lhs, rhs, env, module, translator),
        Expr::Ternary(cond, then, els) => {
            let cond_sig = import_expression(cond, env, module, translator);
            let then_sig = import_expression(then, env, module, translator);
            let else_sig = import_expression(els, env, module, translator);
            if let (Some(c), Some(t), Some(e)) = (
                cond_sig.as_const_int(),
                then_sig.as_const_int(),
                else_sig.as_const_int(),
            ) {
                let width = then_sig.size().max(else_sig.size());
                return SigSpec::const_uint(if c != 0 { t as u64 } else { e as u64 }, width);
            }
            emit_mux(cond_sig, then_sig, else_sig, module, translator)
        }
        Expr::FuncCall(name, args) => {
            // Unlike task calls (inlined by `dispatch::lower_task_call`),
            // function calls can't be spliced into the surrounding statement:
            // the result has to flow back into whatever expression invoked
            // it, and this stand-in's statement tree has no `return`
            // statement or assign-to-function-name convention to carry that
            // value out of a lowered body. Until that representation exists,
            // an unresolved call becomes a 32-bit opaque operator cell so
            // callers still get a well-formed SigSpec.
            let arg_sigs: Vec<SigSpec> = args
                .iter()
                .map(|a| import_expression(a, env, module, translator))
                .collect();
            let id = translator.next_autoidx();
            let result = format!("$func${}${}_Y", name, id);
            let mut cell = Cell::new(format!("$func${}", name));
            for (i, sig) in arg_sigs.into_iter().enumerate() {
                cell = cell.with_connection(format!("ARG{}", i), sig);
            }
            cell = cell.with_connection("Y", SigSpec::wire(result.clone()));
            module.cells_mut().insert(format!("${}_{}", name, id), cell);
            module.wires_mut().entry(result.clone()).or_insert_with(|| Wire::with_width(32));
            SigSpec::wire(result)
        }
    }
}

fn resolve_ref(
    name: &str,
    env: Option<&HashMap<String, SigSpec>>,
    module: &Module,
    translator: &Translator,
) -> SigSpec {
    let resolved = translator.resolve_name(name);
    if let Some(value) = translator.tracked_value(&resolved) {
        return value.clone();
    }
    if let Some(env) = env {
        if let Some(sig) = env.get(&resolved) {
            return sig.clone();
        }
        if let Some(sig) = env.get(name) {
            return sig.clone();
        }
    }
    if let Some(l) = translator.loop_var(name) {
        let width = module.wire_width(&resolved).unwrap_or(32);
        return SigSpec::const_uint(l as u64, width);
    }
    SigSpec::wire(resolved)
}

fn const_fold(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Const(v, _) => Some(*v),
        Expr::Unary(UnOp::Neg, inner) => const_fold(inner).map(|v| -v),
        Expr::Unary(UnOp::BitNot, inner) => const_fold(inner).map(|v| !v),
        Expr::Unary(UnOp::LogNot, inner) => const_fold(inner).map(|v| if v == 0 { 1 } else { 0 }),
        Expr::Binary(op, lhs, rhs) => {
            let l = const_fold(lhs)?;
            let r = const_fold(rhs)?;
            Some(apply_binop(*op, l, r))
        }
        Expr::Ternary(cond, then, els) => {
            if const_fold(cond)? != 0 {
                const_fold(then)
            } else {
                const_fold(els)
            }
        }
        _ => None,
    }
}

pub(crate) fn apply_binop(op: BinOp, l: i64, r: i64) -> i64 {
    match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::Div => {
            if r == 0 {
                0
            } else {
                l / r
            }
        }
        BinOp::Mod => {
            if r == 0 {
                0
            } else {
                l % r
            }
        }
        BinOp::And => l & r,
        BinOp::Or => l | r,
        BinOp::Xor => l ^ r,
        BinOp::Shl | BinOp::SShl => l << r,
        BinOp::Shr | BinOp::SShr => l >> r,
        BinOp::Eq => (l == r) as i64,
        BinOp::Ne => (l != r) as i64,
        BinOp::Lt => (l < r) as i64,
        BinOp::Le => (l <= r) as i64,
        BinOp::Gt => (l > r) as i64,
        BinOp::Ge => (l >= r) as i64,
        BinOp::LogAnd => ((l != 0) && (r != 0)) as i64,
        BinOp::LogOr => ((l != 0) || (r != 0)) as i64,
    }
}

/// cell type + output-width for a binary operator, per spec §6's cell-kind list.
fn cell_kind(op: BinOp) -> (&'static str, bool) {
    match op {
        BinOp::Add => ("$add", false),
        BinOp::Sub => ("$sub", false),
        BinOp::Mul => ("$mul", false),
        BinOp::Div => ("$div", false),
        BinOp::Mod => ("$mod", false),
        BinOp::And => ("$and", false),
        BinOp::Or => ("$or", false),
        BinOp::Xor => ("$xor", false),
        BinOp::Shl | BinOp::SShl => ("$shl", false),
        BinOp::Shr => ("$shr", false),
        BinOp::SShr => ("$sshr", false),
        BinOp::Eq => ("$eq", true),
        BinOp::Ne => ("$ne", true),
        BinOp::Lt => ("$lt", true),
        BinOp::Le => ("$le", true),
        BinOp::Gt => ("$gt", true),
        BinOp::Ge => ("$ge", true),
        BinOp::LogAnd => ("$logic_and", true),
        BinOp::LogOr => ("$logic_or", true),
    }
}

fn import_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    env: Option<&HashMap<String, SigSpec>>,
    module: &mut Module,
    translator: &mut Translator,
) -> SigSpec {
    let lhs_sig = import_expression(lhs, env, module, translator);
    let rhs_sig = import_expression(rhs, env, module, translator);
    if let (Some(l), Some(r)) = (lhs_sig.as_const_int(), rhs_sig.as_const_int()) {
        let (_, is_bool) = cell_kind(op);
        let width = if is_bool { 1 } else { lhs_sig.size().max(rhs_sig.size()) };
        return SigSpec::const_uint(apply_binop(op, l, r) as u64, width);
    }
    let (kind, is_bool) = cell_kind(op);
    let width = if is_bool { 1 } else { lhs_sig.size().max(rhs_sig.size()) };
    let id = translator.next_autoidx();
    let result = format!("{}${}_Y", kind, id);
    let cell = Cell::new(kind)
        .with_param("A_WIDTH", Constant::Integer(lhs_sig.size() as i32))
        .with_param("B_WIDTH", Constant::Integer(rhs_sig.size() as i32))
        .with_param("Y_WIDTH", Constant::Integer(width as i32))
        .with_connection("A", lhs_sig)
        .with_connection("B", rhs_sig)
        .with_connection("Y", SigSpec::wire(result.clone()));
    module.cells_mut().insert(format!("{}_{}", kind, id), cell);
    SigSpec::wire(result)
}

fn import_unary(
    op: UnOp,
    inner: &Expr,
    env: Option<&HashMap<String, SigSpec>>,
    module: &mut Module,
    translator: &mut Translator,
) -> SigSpec {
    let inner_sig = import_expression(inner, env, module, translator);
    if let Some(v) = inner_sig.as_const_int() {
        let result = match op {
            UnOp::Neg => -v,
            UnOp::LogNot | UnOp::ReduceOr => {
                if (op == UnOp::ReduceOr) == (v != 0) {
                    1
                } else {
                    0
                }
            }
            UnOp::BitNot => !v,
        };
        let width = match op {
            UnOp::LogNot | UnOp::ReduceOr => 1,
            _ => inner_sig.size(),
        };
        return SigSpec::const_uint(result as u64, width);
    }
    let (kind, width) = match op {
        UnOp::Neg => ("$neg", inner_sig.size()),
        UnOp::BitNot => ("$not", inner_sig.size()),
        UnOp::LogNot => ("$logic_not", 1),
        UnOp::ReduceOr => ("$reduce_bool", 1),
    };
    let id = translator.next_autoidx();
    let result = format!("{}${}_Y", kind, id);
    let cell = Cell::new(kind)
        .with_param("A_WIDTH", Constant::Integer(inner_sig.size() as i32))
        .with_param("Y_WIDTH", Constant::Integer(width as i32))
        .with_connection("A", inner_sig)
        .with_connection("Y", SigSpec::wire(result.clone()));
    module.cells_mut().insert(format!("{}_{}", kind, id), cell);
    SigSpec::wire(result)
}

fn emit_mux(cond: SigSpec, then_sig: SigSpec, else_sig: SigSpec, module: &mut Module, translator: &mut Translator) -> SigSpec {
    let width = then_sig.size().max(else_sig.size());
    let id = translator.next_autoidx();
    let result = format!("$mux${}_Y", id);
    let cell = Cell::new("$mux")
        .with_param("WIDTH", Constant::Integer(width as i32))
        .with_connection("A", else_sig)
        .with_connection("B", then_sig)
        .with_connection("S", cond)
        .with_connection("Y", SigSpec::wire(result.clone()));
    module.cells_mut().insert(format!("$mux_{}", id), cell);
    SigSpec::wire(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingHandler;
    use crate::xlate::Config;

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn constant_folds_without_emitting_cells() {
        let mut module = Module::empty();
        let mut t = translator();
        let expr = Expr::Binary(BinOp::Add, Box::new(Expr::Const(1, 8)), Box::new(Expr::Const(2, 8)));
        let sig = import_expression(&expr, None, &mut module, &mut t);
        assert_eq!(sig.as_const_int(), Some(3));
        assert!(module.cells().is_empty());
    }

    #[test]
    fn non_foldable_binary_emits_operator_cell() {
        let mut module = Module::empty();
        let mut t = translator();
        let expr = Expr::Binary(BinOp::Add, Box::new(Expr::Ref("a".into())), Box::new(Expr::Ref("b".into())));
        let sig = import_expression(&expr, None, &mut module, &mut t);
        assert!(sig.is_wire());
        assert_eq!(module.cells().len(), 1);
        assert!(module.cells().values().next().unwrap().cell_type() == "$add");
    }

    #[test]
    fn reads_env_before_wire_map() {
        let mut module = Module::empty();
        let mut t = translator();
        let mut env = HashMap::new();
        env.insert("a".to_string(), SigSpec::const_uint(7, 8));
        let sig = import_expression(&Expr::Ref("a".into()), Some(&env), &mut module, &mut t);
        assert_eq!(sig.as_const_int(), Some(7));
    }
}
