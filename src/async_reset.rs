//! AsyncResetLowering (spec §4.2): a process with a switch on the reset
//! condition in its root case, plus one sync rule per edge in the
//! sensitivity list, each with an identical action list copying from
//! `$0\name` temp wires to their real wires.

use crate::classify::Classification;
use crate::dispatch::{self, AssignedSignal};
use crate::hdl::{Edge, ProceduralBlock, SensItem, Stmt};
use crate::xlate::Translator;
use crate::{Case, Constant, Module, Process, SignalSync, SigSpec, Switch, Sync, SyncOn};

fn signal_sync_for(edge: &SensItem) -> SignalSync {
    match edge.edge {
        Some(Edge::Pos) => SignalSync::Posedge,
        Some(Edge::Neg) => SignalSync::Negedge,
        None => SignalSync::Edge,
    }
}

/// Lower an `always @(posedge clk or negedge rst_n) ...`-shaped block
/// already classified as `AsyncResetFf` (or `SrFf`) into a [`Process`].
pub(crate) fn lower(block: &ProceduralBlock, classification: &Classification, module: &mut Module, translator: &mut Translator) -> Process {
    let mut process = Process::new();
    process.set_attr("src", Constant::String(block.src.to_string()));
    process.set_attr("has_async_reset", Constant::Integer(1));
    if classification.is_sr_ff {
        process.set_attr("is_sr_ff", Constant::Integer(1));
    }

    let memories = module.memories.clone();
    let signals: Vec<String> = dispatch::collect_assigned_signals(&block.body, &memories)
        .into_iter()
        .filter_map(|s| match s {
            AssignedSignal::Full(name) => Some(name),
            // spec §4.2 step 1: "Skip records whose LHS is a part-select"
            AssignedSignal::Slice(..) => None,
        })
        .collect();

    {
        let root_case = process.root_case_mut();
        for name in &signals {
            let width = module.wire_width(name).unwrap_or(1);
            dispatch::init_temp_from_signal(name, width, root_case, module, translator);
        }
    }

    lower_body(&block.body, process.root_case_mut(), module, translator, &memories);

    for edge in &classification.edges {
        let trigger = crate::expr_eval::import_expression(&edge.signal, None, module, translator);
        let mut sync = Sync::new(SyncOn::Signal(signal_sync_for(edge), trigger));
        for name in &signals {
            let temp = dispatch::temp_wire_for(name, module.wire_width(name).unwrap_or(1), module, translator);
            sync.push_update(SigSpec::wire(name.clone()), temp);
        }
        process.syncs_mut().push(sync);
    }

    process
}

/// Step 3 of §4.2: the outermost if-else is the reset/non-reset split.
/// Anything else (a body that isn't a single top-level if) is lowered
/// directly through the shared dispatcher, still routing every assignment
/// through its `$0\name` temp (dispatch's `Expr::Ref` assign path already
/// does this unconditionally).
fn lower_body(
    body: &Stmt,
    root_case: &mut Case,
    module: &mut Module,
    translator: &mut Translator,
    memories: &std::collections::HashMap<String, crate::Memory>,
) {
    match body {
        Stmt::If { cond, then, els } => {
            let cond_sig = crate::expr_eval::import_expression(cond, None, module, translator);
            let mut switch = Switch::new(cond_sig);
            let mut reset_case = Case::matching(vec![SigSpec::const_uint(1, 1)]);
            dispatch::lower_stmt(then, &mut reset_case, module, translator, memories);
            switch.cases.push(reset_case);
            let mut default_case = Case::default_case();
            if let Some(els) = els {
                dispatch::lower_stmt(els, &mut default_case, module, translator, memories);
            }
            switch.cases.push(default_case);
            root_case.push_switch(switch);
        }
        other => {
            dispatch::lower_stmt(other, root_case, module, translator, memories);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::error::CollectingHandler;
    use crate::xlate::{import_ports, Config};
    use crate::CaseBody;

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn async_reset_counter_has_two_identical_sync_action_lists() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module counter;
            port input 1 clk;
            port input 1 rst_n;
            port output 8 count;
            always @(posedge clk or negedge rst_n)
            if (!rst_n)
                count <= 0;
            else
                count <= count + 1;
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let classification = classify::classify(block);
        let mut t = translator();
        let process = lower(block, &classification, &mut module, &mut t);

        assert_eq!(process.syncs().len(), 2);
        assert_eq!(process.syncs()[0].updates(), process.syncs()[1].updates());
        assert!(!process.root_case().case_bodies().is_empty());
        match &process.root_case().case_bodies().last().unwrap() {
            CaseBody::Switch(sw) => assert_eq!(sw.cases().len(), 2),
            _ => panic!("expected the reset switch as the last root-case entry"),
        }
    }
}
