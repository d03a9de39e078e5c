//! The shared statement dispatcher CombLowering and InitialLowering recurse
//! into (spec §2: "CombLowering and InitialLowering recursively invoke a
//! shared statement dispatcher that handles begin/assignment/if/case/for/
//! repeat/assert/task-call"). AsyncResetLowering and SimpleFFLowering reuse
//! the same tree-building (§4.2-§4.3 describe the same temp-wire + switch
//! pattern), so this module is the one place that actually walks an
//! `hdl::Stmt` tree and emits into a `Case`.

use std::collections::HashMap;

use crate::error::{DiagnosticKind, Severity, SourceLoc};
use crate::hdl::{Expr, Stmt};
use crate::xlate::Translator;
use crate::{Case, Memory, Module, SigSpec, Wire};

/// Control-flow outcome of lowering one statement. Only meaningful inside a
/// for/repeat unroll: `Break` stops unrolling further iterations, `Continue`
/// stops lowering the remaining statements of the current iteration's body.
/// If/case branches are lowered independently of which one will actually
/// execute at runtime, so break/continue reaching into them from a loop body
/// is not modeled — the concrete scenarios this engine targets never nest
/// break/continue under a runtime-conditional inside a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
}

/// The `$0\name` (or `$0\name[msb:lsb]`) next-value temp wire for `name`,
/// allocated once per unique LHS signal per process (spec §3 invariant).
pub(crate) fn temp_wire_for(
    name: &str,
    width: usize,
    module: &mut Module,
    translator: &mut Translator,
) -> SigSpec {
    if let Some(existing) = translator.temp_wire(name) {
        return existing.clone();
    }
    let wire_name = format!("$0\\{}", name);
    module
        .wires_mut()
        .entry(wire_name.clone())
        .or_insert_with(|| Wire::with_width(width));
    let sig = SigSpec::wire(wire_name);
    translator.set_temp_wire(name, sig.clone());
    sig
}

/// A bit/part-slice temp, distinguished by wire-name + `[msb:lsb]` (§4.5):
/// slice temps and full temps for the same signal may coexist.
pub(crate) fn slice_temp_wire_for(
    name: &str,
    msb: usize,
    lsb: usize,
    module: &mut Module,
    translator: &mut Translator,
) -> SigSpec {
    let key = format!("{}[{}:{}]", name, msb, lsb);
    if let Some(existing) = translator.temp_wire(&key) {
        return existing.clone();
    }
    let wire_name = format!("$0\\{}", key);
    let width = msb.abs_diff(lsb) + 1;
    module
        .wires_mut()
        .entry(wire_name.clone())
        .or_insert_with(|| Wire::with_width(width));
    let sig = SigSpec::wire(wire_name);
    translator.set_temp_wire(&key, sig.clone());
    sig
}

/// Seed a temp wire with the signal's current value (used by AsyncReset/FF
/// root-case initialization so "no assignment this cycle" preserves the
/// prior value, spec §4.2 step 2).
pub(crate) fn init_temp_from_signal(name: &str, width: usize, case: &mut Case, module: &mut Module, translator: &mut Translator) {
    let temp = temp_wire_for(name, width, module, translator);
    case.push_assign(temp, SigSpec::wire(name.to_string()));
}

fn memwr_addr_key(mem: &str) -> String {
    format!("$memwr${}$addr", mem)
}
fn memwr_data_key(mem: &str) -> String {
    format!("$memwr${}$data", mem)
}
fn memwr_en_key(mem: &str) -> String {
    format!("$memwr${}$en", mem)
}

/// Allocate (if not already present) the address/data/enable temp wires for
/// a memory write into `mem`, and initialize the enable wire to 0 in `case`
/// (spec §4.4: "Initialize the enable wire to 0 in the root case").
pub(crate) fn alloc_memwrite_temps(
    mem: &str,
    memory: &Memory,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
) -> (SigSpec, SigSpec, SigSpec) {
    let addr_key = memwr_addr_key(mem);
    let data_key = memwr_data_key(mem);
    let en_key = memwr_en_key(mem);
    let already = translator.temp_wire(&en_key).is_some();
    let addr = temp_wire_for(&addr_key, memory.address_width(), module, translator);
    let data = temp_wire_for(&data_key, *memory.width(), module, translator);
    let en = temp_wire_for(&en_key, 1, module, translator);
    if !already {
        case.push_assign(en.clone(), SigSpec::const_uint(0, 1));
    }
    (addr, data, en)
}

/// Resolve the previously allocated address/data/enable temps for `mem`, if
/// any writes to it were recorded during this process's lowering.
pub(crate) fn memwrite_temps(mem: &str, translator: &Translator) -> Option<(SigSpec, SigSpec, SigSpec)> {
    let addr = translator.temp_wire(&memwr_addr_key(mem))?.clone();
    let data = translator.temp_wire(&memwr_data_key(mem))?.clone();
    let en = translator.temp_wire(&memwr_en_key(mem))?.clone();
    Some((addr, data, en))
}

/// Lower one statement into `case`, mutating `module`/`translator` as cells
/// and temp wires are allocated. `memories` is the set of names that should
/// be treated as memory-write targets rather than plain signals (spec §4.4).
pub(crate) fn lower_stmt(
    stmt: &Stmt,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) -> Flow {
    match stmt {
        Stmt::Assign { lhs, rhs, blocking } => {
            lower_assign(lhs, rhs, *blocking, case, module, translator, memories);
            Flow::Normal
        }
        Stmt::Begin(body) => {
            for s in body {
                let flow = lower_stmt(s, case, module, translator, memories);
                if flow != Flow::Normal {
                    return flow;
                }
            }
            Flow::Normal
        }
        Stmt::NamedBegin { name, locals, body } => {
            translator.push_scope();
            for (var, width) in locals {
                let hier = format!("{}.{}", name, var);
                module
                    .wires_mut()
                    .entry(hier.clone())
                    .or_insert_with(|| Wire::with_width(*width));
                translator.bind_local(var.clone(), hier);
            }
            let mut flow = Flow::Normal;
            for s in body {
                flow = lower_stmt(s, case, module, translator, memories);
                if flow != Flow::Normal {
                    break;
                }
            }
            translator.pop_scope();
            flow
        }
        Stmt::If { cond, then, els } => {
            lower_if(cond, then, els.as_deref(), case, module, translator, memories);
            Flow::Normal
        }
        Stmt::Case { selector, items, default } => {
            lower_case(selector, items, default.as_deref(), case, module, translator, memories);
            Flow::Normal
        }
        Stmt::For { var, init, cond, step, body, .. } => {
            lower_for(var, init, cond, step, body, case, module, translator, memories)
        }
        Stmt::Repeat { count, body } => lower_repeat(count, body, case, module, translator, memories),
        Stmt::Break => Flow::Break,
        Stmt::Continue => Flow::Continue,
        Stmt::Assert(cond) => {
            lower_assert(cond, module, translator);
            Flow::Normal
        }
        Stmt::TaskCall(name, args) => lower_task_call(name, args, case, module, translator, memories),
        Stmt::SysTaskCall(name, _) => {
            crate::audit::handle_sys_task_call(name, translator, SourceLoc::default());
            Flow::Normal
        }
        Stmt::Empty => Flow::Normal,
    }
}

fn lower_assign(
    lhs: &Expr,
    rhs: &Expr,
    blocking: bool,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) {
    if let Expr::BitSelect(base, index) = lhs {
        if let Expr::Ref(name) = base.as_ref() {
            if let Some(memory) = memories.get(name) {
                lower_memory_write(name, memory, index, rhs, case, module, translator);
                return;
            }
        }
    }

    match lhs {
        Expr::Ref(name) => {
            let resolved = translator.resolve_name(name);
            let width = module.wire_width(&resolved).unwrap_or(1);
            let rhs_sig = crate::expr_eval::import_expression(rhs, None, module, translator);
            let temp = temp_wire_for(&resolved, width, module, translator);
            case.push_assign(temp, rhs_sig.clone());
            if blocking {
                translator.track_value(resolved, rhs_sig);
            }
        }
        Expr::PartSelect(base, msb, lsb) => {
            if let Expr::Ref(name) = base.as_ref() {
                let resolved = translator.resolve_name(name);
                let rhs_sig = crate::expr_eval::import_expression(rhs, None, module, translator);
                let temp = slice_temp_wire_for(&resolved, *msb, *lsb, module, translator);
                case.push_assign(temp, rhs_sig.clone());
                if blocking {
                    translator.track_value(format!("{}[{}:{}]", resolved, msb, lsb), rhs_sig);
                }
            }
        }
        _ => {
            translator.report(
                Severity::Warning,
                DiagnosticKind::UnsupportedConstruct,
                "unsupported assignment target, skipped",
                SourceLoc::default(),
            );
        }
    }
}

fn lower_memory_write(
    mem: &str,
    memory: &Memory,
    index: &Expr,
    data_expr: &Expr,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
) {
    let (addr_temp, data_temp, en_temp) = alloc_memwrite_temps(mem, memory, case, module, translator);
    let addr_sig = crate::expr_eval::import_expression(index, None, module, translator);
    let data_sig = crate::expr_eval::import_expression(data_expr, None, module, translator);
    case.push_assign(addr_temp, addr_sig);
    case.push_assign(data_temp, data_sig);
    case.push_assign(en_temp, SigSpec::const_uint(1, 1));
}

/// Inline a user task call (§4.5): bind each formal parameter to a fresh
/// call-site-local wire seeded from the actual argument, push a name-shadow
/// scope so the body's references to the parameters resolve to those wires,
/// then lower the body in place of the call. Unknown tasks (no definition in
/// scope) are reported and skipped rather than silently dropped.
fn lower_task_call(
    name: &str,
    args: &[Expr],
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) -> Flow {
    let Some(task) = translator.task(name).cloned() else {
        translator.report(
            Severity::Warning,
            DiagnosticKind::UnsupportedConstruct,
            format!("task call to {} could not be inlined (no definition in scope), skipped", name),
            SourceLoc::default(),
        );
        return Flow::Normal;
    };

    translator.push_scope();
    for (param, arg) in task.params.iter().zip(args.iter()) {
        let hier = format!("{}${}", name, param);
        module.wires_mut().entry(hier.clone()).or_insert_with(|| Wire::with_width(32));
        let arg_sig = crate::expr_eval::import_expression(arg, None, module, translator);
        case.push_assign(SigSpec::wire(hier.clone()), arg_sig);
        translator.bind_local(param.clone(), hier);
    }
    let flow = lower_stmt(&task.body, case, module, translator, memories);
    translator.pop_scope();
    flow
}

fn lower_if(
    cond: &Expr,
    then: &Stmt,
    els: Option<&Stmt>,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) {
    let cond_sig = crate::expr_eval::import_expression(cond, None, module, translator);
    let mut switch = crate::Switch::new(cond_sig);

    let mut then_case = Case::matching(vec![SigSpec::const_uint(1, 1)]);
    lower_stmt(then, &mut then_case, module, translator, memories);
    switch.cases.push(then_case);

    let mut default_case = Case::default_case();
    if let Some(els) = els {
        lower_stmt(els, &mut default_case, module, translator, memories);
    }
    switch.cases.push(default_case);

    case.push_switch(switch);
}

fn lower_case(
    selector: &Expr,
    items: &[(Vec<Expr>, Stmt)],
    default: Option<&Stmt>,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) {
    let sel_sig = crate::expr_eval::import_expression(selector, None, module, translator);
    let mut switch = crate::Switch::new(sel_sig);

    for (compares, body) in items {
        let compare_sigs: Vec<SigSpec> = compares
            .iter()
            .map(|e| crate::expr_eval::import_expression(e, None, module, translator))
            .collect();
        let mut item_case = Case::matching(compare_sigs);
        lower_stmt(body, &mut item_case, module, translator, memories);
        switch.cases.push(item_case);
    }

    let mut default_case = Case::default_case();
    if let Some(default) = default {
        lower_stmt(default, &mut default_case, module, translator, memories);
    }
    switch.cases.push(default_case);

    case.push_switch(switch);
}

const MAX_UNROLL: i64 = 1 << 16;

fn lower_for(
    var: &str,
    init: &Expr,
    cond: &Expr,
    step: &Expr,
    body: &Stmt,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) -> Flow {
    let Some(mut value) = const_eval(init, translator) else {
        translator.report(
            Severity::Warning,
            DiagnosticKind::UnsupportedConstruct,
            "for-loop bound is not compile-time constant, unroll skipped",
            SourceLoc::default(),
        );
        return Flow::Normal;
    };
    let mut iterations = 0;
    loop {
        translator.bind_loop_var(var, value);
        let Some(keep_going) = const_eval(cond, translator) else {
            translator.unbind_loop_var(var);
            break;
        };
        if keep_going == 0 {
            translator.unbind_loop_var(var);
            break;
        }
        let flow = lower_stmt(body, case, module, translator, memories);
        translator.unbind_loop_var(var);
        if flow == Flow::Break {
            break;
        }
        let Some(next) = const_eval_with(step, translator, var, value) else {
            break;
        };
        value = next;
        iterations += 1;
        if iterations > MAX_UNROLL {
            translator.report(
                Severity::Warning,
                DiagnosticKind::UnsupportedConstruct,
                "for-loop exceeded unroll limit, truncated",
                SourceLoc::default(),
            );
            break;
        }
    }
    Flow::Normal
}

fn lower_repeat(
    count: &Expr,
    body: &Stmt,
    case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) -> Flow {
    let Some(n) = const_eval(count, translator) else {
        translator.report(
            Severity::Warning,
            DiagnosticKind::UnsupportedConstruct,
            "repeat count is not compile-time constant, skipped",
            SourceLoc::default(),
        );
        return Flow::Normal;
    };
    for _ in 0..n.max(0) {
        let flow = lower_stmt(body, case, module, translator, memories);
        if flow == Flow::Break {
            break;
        }
    }
    Flow::Normal
}

fn lower_assert(cond: &Expr, module: &mut Module, translator: &mut Translator) {
    let cond_sig = crate::expr_eval::import_expression(cond, None, module, translator);
    let id = translator.next_autoidx();
    let cell = crate::Cell::new("$check").with_connection("A", cond_sig);
    module.cells_mut().insert(format!("$check${}", id), cell);
}

/// Evaluate a compile-time-constant expression using the translator's
/// current loop-variable bindings. Returns `None` for anything not fully
/// foldable (constants, loop variables, and arithmetic over them).
pub(crate) fn const_eval(expr: &Expr, translator: &Translator) -> Option<i64> {
    match expr {
        Expr::Const(v, _) => Some(*v),
        Expr::Ref(name) => translator.loop_var(name),
        Expr::Unary(op, inner) => {
            let v = const_eval(inner, translator)?;
            Some(match op {
                crate::hdl::UnOp::Neg => -v,
                crate::hdl::UnOp::BitNot => !v,
                crate::hdl::UnOp::LogNot => (v == 0) as i64,
                crate::hdl::UnOp::ReduceOr => (v != 0) as i64,
            })
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = const_eval(lhs, translator)?;
            let r = const_eval(rhs, translator)?;
            Some(crate::expr_eval::apply_binop(*op, l, r))
        }
        Expr::Ternary(cond, then, els) => {
            if const_eval(cond, translator)? != 0 {
                const_eval(then, translator)
            } else {
                const_eval(els, translator)
            }
        }
        _ => None,
    }
}

fn const_eval_with(expr: &Expr, translator: &mut Translator, var: &str, current: i64) -> Option<i64> {
    translator.bind_loop_var(var, current);
    let result = const_eval(expr, translator);
    translator.unbind_loop_var(var);
    result
}

/// One pre-scanned write target (spec §3 `AssignedSignal`): a full-signal
/// name, or a part-select (name, msb, lsb) that AsyncResetLowering must
/// skip but CombLowering must not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AssignedSignal {
    Full(String),
    Slice(String, usize, usize),
}

impl AssignedSignal {
    fn key(&self) -> String {
        match self {
            AssignedSignal::Full(n) => n.clone(),
            AssignedSignal::Slice(n, msb, lsb) => format!("{}[{}:{}]", n, msb, lsb),
        }
    }
}

/// Pre-scan `stmt` for every signal written anywhere in its tree, in
/// first-occurrence source order, deduplicated by LHS key. Memory-write
/// targets (bit-selects into a name present in `memories`) are excluded —
/// those are handled by [`crate::memwrite`], not by the regular action list.
pub(crate) fn collect_assigned_signals(stmt: &Stmt, memories: &HashMap<String, Memory>) -> Vec<AssignedSignal> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    collect_assigned_signals_into(stmt, memories, &mut seen, &mut out);
    out
}

fn collect_assigned_signals_into(
    stmt: &Stmt,
    memories: &HashMap<String, Memory>,
    seen: &mut std::collections::HashSet<String>,
    out: &mut Vec<AssignedSignal>,
) {
    match stmt {
        Stmt::Assign { lhs, .. } => {
            let recorded = match lhs {
                Expr::Ref(name) => Some(AssignedSignal::Full(name.clone())),
                Expr::PartSelect(base, msb, lsb) => match base.as_ref() {
                    Expr::Ref(name) => Some(AssignedSignal::Slice(name.clone(), *msb, *lsb)),
                    _ => None,
                },
                Expr::BitSelect(base, _) => match base.as_ref() {
                    Expr::Ref(name) if memories.contains_key(name) => None,
                    _ => None,
                },
                _ => None,
            };
            if let Some(signal) = recorded {
                let key = signal.key();
                if seen.insert(key) {
                    out.push(signal);
                }
            }
        }
        Stmt::Begin(body) => {
            for s in body {
                collect_assigned_signals_into(s, memories, seen, out);
            }
        }
        Stmt::NamedBegin { body, .. } => {
            for s in body {
                collect_assigned_signals_into(s, memories, seen, out);
            }
        }
        Stmt::If { then, els, .. } => {
            collect_assigned_signals_into(then, memories, seen, out);
            if let Some(els) = els {
                collect_assigned_signals_into(els, memories, seen, out);
            }
        }
        Stmt::Case { items, default, .. } => {
            for (_, body) in items {
                collect_assigned_signals_into(body, memories, seen, out);
            }
            if let Some(default) = default {
                collect_assigned_signals_into(default, memories, seen, out);
            }
        }
        Stmt::For { body, .. } | Stmt::Repeat { body, .. } => {
            collect_assigned_signals_into(body, memories, seen, out);
        }
        _ => {}
    }
}

/// true if `stmt` contains a for-loop anywhere in its tree (used by
/// SimpleFFLowering's fast-path guard, spec §4.3).
pub(crate) fn contains_for_loop(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::For { .. } => true,
        Stmt::Begin(body) | Stmt::NamedBegin { body, .. } => body.iter().any(contains_for_loop),
        Stmt::If { then, els, .. } => contains_for_loop(then) || els.as_deref().is_some_and(contains_for_loop),
        Stmt::Case { items, default, .. } => {
            items.iter().any(|(_, s)| contains_for_loop(s)) || default.as_deref().is_some_and(contains_for_loop)
        }
        Stmt::Repeat { body, .. } => contains_for_loop(body),
        _ => false,
    }
}

/// true if `stmt` writes any memory in `memories` anywhere in its tree.
pub(crate) fn contains_memory_write(stmt: &Stmt, memories: &HashMap<String, Memory>) -> bool {
    match stmt {
        Stmt::Assign { lhs: Expr::BitSelect(base, _), .. } => {
            matches!(base.as_ref(), Expr::Ref(name) if memories.contains_key(name))
        }
        Stmt::Begin(body) | Stmt::NamedBegin { body, .. } => body.iter().any(|s| contains_memory_write(s, memories)),
        Stmt::If { then, els, .. } => {
            contains_memory_write(then, memories) || els.as_deref().is_some_and(|s| contains_memory_write(s, memories))
        }
        Stmt::Case { items, default, .. } => {
            items.iter().any(|(_, s)| contains_memory_write(s, memories))
                || default.as_deref().is_some_and(|s| contains_memory_write(s, memories))
        }
        Stmt::For { body, .. } | Stmt::Repeat { body, .. } => contains_memory_write(body, memories),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingHandler;
    use crate::hdl::{BinOp, UnOp};
    use crate::xlate::Config;

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn simple_assign_creates_temp_and_action() {
        let mut module = Module::empty();
        module.wires_mut().insert("q".to_string(), Wire::with_width(8));
        let mut t = translator();
        let mut case = Case::root();
        let memories = HashMap::new();
        lower_stmt(
            &Stmt::Assign {
                lhs: Expr::Ref("q".into()),
                rhs: Expr::Ref("d".into()),
                blocking: false,
            },
            &mut case,
            &mut module,
            &mut t,
            &memories,
        );
        assert_eq!(case.case_bodies().len(), 1);
        assert!(module.wires().contains_key("$0\\q"));
    }

    #[test]
    fn if_else_builds_two_case_switch() {
        let mut module = Module::empty();
        module.wires_mut().insert("q".to_string(), Wire::with_width(1));
        let mut t = translator();
        let mut case = Case::root();
        let memories = HashMap::new();
        lower_stmt(
            &Stmt::If {
                cond: Expr::Ref("sel".into()),
                then: Box::new(Stmt::Assign {
                    lhs: Expr::Ref("q".into()),
                    rhs: Expr::Const(1, 1),
                    blocking: false,
                }),
                els: Some(Box::new(Stmt::Assign {
                    lhs: Expr::Ref("q".into()),
                    rhs: Expr::Const(0, 1),
                    blocking: false,
                })),
            },
            &mut case,
            &mut module,
            &mut t,
            &memories,
        );
        assert_eq!(case.case_bodies().len(), 1);
        match &case.case_bodies()[0] {
            crate::CaseBody::Switch(sw) => assert_eq!(sw.cases().len(), 2),
            _ => panic!("expected a switch"),
        }
    }

    #[test]
    fn for_loop_unrolls_constant_bound() {
        let mut module = Module::empty();
        for i in 0..4 {
            module.wires_mut().insert(format!("m{}", i), Wire::with_width(8));
        }
        let mut t = translator();
        let mut case = Case::root();
        let memories = HashMap::new();
        let body = Stmt::Assign {
            lhs: Expr::Ref("acc".into()),
            rhs: Expr::Binary(BinOp::Add, Box::new(Expr::Ref("acc".into())), Box::new(Expr::Ref("i".into()))),
            blocking: true,
        };
        module.wires_mut().insert("acc".to_string(), Wire::with_width(8));
        lower_for(
            "i",
            &Expr::Const(0, 32),
            &Expr::Binary(BinOp::Lt, Box::new(Expr::Ref("i".into())), Box::new(Expr::Const(4, 32))),
            &Expr::Binary(BinOp::Add, Box::new(Expr::Ref("i".into())), Box::new(Expr::Const(1, 32))),
            &body,
            &mut case,
            &mut module,
            &mut t,
            &memories,
        );
        assert_eq!(case.case_bodies().len(), 4);
    }

    #[test]
    fn const_eval_folds_unary_not() {
        let t = translator();
        let v = const_eval(&Expr::Unary(UnOp::LogNot, Box::new(Expr::Const(0, 1))), &t);
        assert_eq!(v, Some(1));
    }
}
