//! SimpleFFLowering (spec §4.3): single-clock flop lowering. Tries, in
//! order, the simple if/else fast path, shift-register detection, the
//! memory-write path, and finally a generic default path through the shared
//! statement dispatcher.

use std::collections::HashMap;

use crate::classify::Classification;
use crate::dispatch::{self, AssignedSignal};
use crate::hdl::{Edge, Expr, ProceduralBlock, Stmt};
use crate::memwrite;
use crate::xlate::Translator;
use crate::{Case, Constant, Memory, Module, Process, SignalSync, SigSpec, Switch, Sync, SyncOn};

fn clock_sync(classification: &Classification, module: &mut Module, translator: &mut Translator) -> Sync {
    let clock = classification.clock.as_ref().expect("FF process must have a clock edge");
    let trigger = crate::expr_eval::import_expression(&clock.signal, None, module, translator);
    let sync_kind = match clock.edge {
        Some(Edge::Pos) | None => SignalSync::Posedge,
        Some(Edge::Neg) => SignalSync::Negedge,
    };
    Sync::new(SyncOn::Signal(sync_kind, trigger))
}

/// Lower an FF-classified procedural block into a [`Process`].
pub(crate) fn lower(block: &ProceduralBlock, classification: &Classification, module: &mut Module, translator: &mut Translator) -> Process {
    let mut process = Process::new();
    process.set_attr("src", Constant::String(block.src.to_string()));
    process.set_attr("always_ff", Constant::Integer(1));

    let memories = module.memories.clone();

    if let Some(p) = try_fast_path(&block.body, classification, module, translator, &memories) {
        merge_into(&mut process, p);
        return process;
    }
    if let Some(p) = try_shift_register(&block.body, classification, module, translator) {
        merge_into(&mut process, p);
        return process;
    }
    if memwrite::detect_memory_writes(&block.body, &memories).is_empty() {
        default_path(&block.body, classification, module, translator, &memories, &mut process);
    } else {
        memory_write_path(&block.body, classification, module, translator, &memories, &mut process);
    }
    process
}

fn merge_into(dst: &mut Process, src: Process) {
    *dst.root_case_mut() = src.root_case().clone();
    *dst.syncs_mut() = src.syncs().clone();
}

/// Fast path (spec §4.3): a single if or if/else whose both branches assign
/// the same set of signals, with no for-loops or memory writes in either
/// branch.
fn try_fast_path(
    body: &Stmt,
    classification: &Classification,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
) -> Option<Process> {
    let Stmt::If { cond, then, els: Some(els) } = body else {
        return None;
    };
    if dispatch::contains_for_loop(then) || dispatch::contains_for_loop(els) {
        return None;
    }
    if dispatch::contains_memory_write(then, memories) || dispatch::contains_memory_write(els, memories) {
        return None;
    }
    let then_signals = dispatch::collect_assigned_signals(then, memories);
    let else_signals = dispatch::collect_assigned_signals(els, memories);
    if then_signals != else_signals {
        return None;
    }

    let mut process = Process::new();
    let cond_sig = crate::expr_eval::import_expression(cond, None, module, translator);
    let mut switch = Switch::new(cond_sig);
    let mut then_case = Case::matching(vec![SigSpec::const_uint(1, 1)]);
    dispatch::lower_stmt(then, &mut then_case, module, translator, memories);
    switch.cases.push(then_case);
    let mut else_case = Case::default_case();
    dispatch::lower_stmt(els, &mut else_case, module, translator, memories);
    switch.cases.push(else_case);
    process.root_case_mut().push_switch(switch);

    let mut sync = clock_sync(classification, module, translator);
    for signal in &then_signals {
        if let AssignedSignal::Full(name) = signal {
            let temp = dispatch::temp_wire_for(name, module.wire_width(name).unwrap_or(1), module, translator);
            sync.push_update(SigSpec::wire(name.clone()), temp);
        }
    }
    process.syncs_mut().push(sync);
    Some(process)
}

/// The shift-register pattern generalized per the resolved Open Question 3:
/// any array appearing on both LHS and RHS of a bit-select assignment whose
/// indices differ by a constant, driven by a for-loop with a constant bound.
fn try_shift_register(
    body: &Stmt,
    classification: &Classification,
    module: &mut Module,
    translator: &mut Translator,
) -> Option<Process> {
    let stmts: &[Stmt] = match body {
        Stmt::Begin(b) => b,
        _ => return None,
    };

    let for_idx = stmts.iter().position(|s| matches!(s, Stmt::For { .. }))?;
    let Stmt::For { var, init, cond, step, body: for_body, .. } = &stmts[for_idx] else {
        return None;
    };
    let Stmt::Assign {
        lhs: Expr::BitSelect(lhs_base, lhs_idx),
        rhs: Expr::BitSelect(rhs_base, rhs_idx),
        blocking: false,
    } = for_body.as_ref()
    else {
        return None;
    };
    let (Expr::Ref(arr_lhs), Expr::Ref(arr_rhs)) = (lhs_base.as_ref(), rhs_base.as_ref()) else {
        return None;
    };
    if arr_lhs != arr_rhs {
        return None;
    }
    let arr = arr_lhs.clone();

    let mut process = Process::new();
    {
        let root_case = process.root_case_mut();
        // scalar assignments outside the for-loop (e.g. rA <= A; rB <= B;)
        for (i, s) in stmts.iter().enumerate() {
            if i == for_idx {
                continue;
            }
            let memories = HashMap::new();
            dispatch::lower_stmt(s, root_case, module, translator, &memories);
        }

        let Some(low) = dispatch::const_eval(init, translator) else { return None };
        let mut value = low;
        loop {
            translator.bind_loop_var(var, value);
            let Some(keep_going) = dispatch::const_eval(cond, translator) else {
                translator.unbind_loop_var(var);
                break;
            };
            if keep_going == 0 {
                translator.unbind_loop_var(var);
                break;
            }
            let Some(lhs_i) = dispatch::const_eval(lhs_idx, translator) else {
                translator.unbind_loop_var(var);
                break;
            };
            let Some(rhs_i) = dispatch::const_eval(rhs_idx, translator) else {
                translator.unbind_loop_var(var);
                break;
            };
            translator.unbind_loop_var(var);

            let lhs_name = format!("{}[{}]", arr, lhs_i);
            let rhs_name = format!("{}[{}]", arr, rhs_i);
            let width = module.wire_width(&rhs_name).or_else(|| module.wire_width(&arr)).unwrap_or(1);
            let lhs_temp = dispatch::temp_wire_for(&lhs_name, width, module, translator);
            let rhs_temp = dispatch::temp_wire_for(&rhs_name, width, module, translator);
            root_case.push_assign(lhs_temp, rhs_temp);

            let Some(next) = (
            {
                translator.bind_loop_var(var, value);
                let n = dispatch::const_eval(step, translator);
                translator.unbind_loop_var(var);
                n
            }) else {
                break;
            };
            value = next;
        }
    }

    let mut sync = clock_sync(classification, module, translator);
    let memories = HashMap::new();
    for (i, s) in stmts.iter().enumerate() {
        if i == for_idx {
            continue;
        }
        for signal in dispatch::collect_assigned_signals(s, &memories) {
            if let AssignedSignal::Full(name) = signal {
                let temp = dispatch::temp_wire_for(&name, module.wire_width(&name).unwrap_or(1), module, translator);
                sync.push_update(SigSpec::wire(name), temp);
            }
        }
    }
    for (name, temp) in translator_temp_wires_for_array(&arr, translator) {
        sync.push_update(SigSpec::wire(name), temp);
    }
    process.syncs_mut().push(sync);
    Some(process)
}

/// collect every `$0\arr[i]` temp already allocated for `arr`'s elements, in
/// ascending index order, so the closing sync rule can copy them all back.
fn translator_temp_wires_for_array(arr: &str, translator: &Translator) -> Vec<(String, SigSpec)> {
    let mut found = Vec::new();
    let mut i = 0usize;
    loop {
        let name = format!("{}[{}]", arr, i);
        match translator.temp_wire(&name) {
            Some(sig) => {
                found.push((name, sig.clone()));
                i += 1;
            }
            None => break,
        }
    }
    found
}

fn memory_write_path(
    body: &Stmt,
    classification: &Classification,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
    process: &mut Process,
) {
    let signals = dispatch::collect_assigned_signals(body, memories);
    dispatch::lower_stmt(body, process.root_case_mut(), module, translator, memories);
    let written = memwrite::detect_memory_writes(body, memories);
    let actions = memwrite::build_memwr_actions(&written, memories, translator);

    let mut sync = clock_sync(classification, module, translator);
    for signal in &signals {
        if let AssignedSignal::Full(name) = signal {
            let temp = dispatch::temp_wire_for(name, module.wire_width(name).unwrap_or(1), module, translator);
            sync.push_update(SigSpec::wire(name.clone()), temp);
        }
    }
    for (mem, memwr) in actions {
        sync.set_memwr(mem, memwr);
    }
    process.syncs_mut().push(sync);
}

fn default_path(
    body: &Stmt,
    classification: &Classification,
    module: &mut Module,
    translator: &mut Translator,
    memories: &HashMap<String, Memory>,
    process: &mut Process,
) {
    let signals = dispatch::collect_assigned_signals(body, memories);
    dispatch::lower_stmt(body, process.root_case_mut(), module, translator, memories);

    let mut sync = clock_sync(classification, module, translator);
    for signal in &signals {
        if let AssignedSignal::Full(name) = signal {
            let temp = dispatch::temp_wire_for(name, module.wire_width(name).unwrap_or(1), module, translator);
            sync.push_update(SigSpec::wire(name.clone()), temp);
        }
    }
    process.syncs_mut().push(sync);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::error::CollectingHandler;
    use crate::xlate::{import_ports, Config};

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn simple_dff_gets_one_sync_rule() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module dff;
            port input 8 d;
            port output 8 q;
            always @(posedge clk)
            begin
                q <= d;
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let classification = classify::classify(block);
        let mut t = translator();
        let process = lower(block, &classification, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert_eq!(process.syncs()[0].updates().len(), 1);
    }

    #[test]
    fn fast_path_if_else_both_branches_same_signal() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module dff;
            port input 1 en;
            port input 8 d;
            port output 8 q;
            always @(posedge clk)
            if (en)
                q <= d;
            else
                q <= q;
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let classification = classify::classify(block);
        let mut t = translator();
        let process = lower(block, &classification, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert_eq!(process.syncs()[0].updates().len(), 1);
    }

    #[test]
    fn shift_register_unrolls_into_one_sync_rule() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module sr;
            port input 8 din;
            port output 8 dout;
            memory 8x4 sr;
            always @(posedge clk)
            begin
                sr[0] <= din;
                for (int i = 3; i > 0; i = i - 1)
                    sr[i] <= sr[i - 1];
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let classification = classify::classify(block);
        let mut t = translator();
        let process = lower(block, &classification, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        // one update per shifted element plus the head assignment, all in a
        // single clocked rule rather than one switch branch per iteration
        assert!(process.syncs()[0].updates().len() >= 4);
    }

    #[test]
    fn memory_write_path_produces_memwr_action() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module ram;
            port input 1 we;
            port input 2 addr;
            port input 8 data;
            port output 8 q;
            memory 8x4 mem;
            always @(posedge clk)
            begin
                if (we)
                    mem[addr] <= data;
                q <= mem[addr];
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let classification = classify::classify(block);
        let mut t = translator();
        let process = lower(block, &classification, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert!(!process.syncs()[0].memwrs().is_empty());
    }
}
