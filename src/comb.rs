//! CombLowering (spec §4.5): a root case that initializes each temp wire
//! from its source signal, a switch tree mirroring the if/case structure,
//! and one level-always sync rule copying temps back to their source wires.

use std::collections::HashMap;

use crate::dispatch::{self, AssignedSignal};
use crate::hdl::{ProceduralBlock, Stmt};
use crate::memwrite;
use crate::xlate::Translator;
use crate::{Constant, Memwr, Module, Process, SigSpec, Sync, SyncOn};

/// Build the root case and sync-rule action list for a combinational body.
/// Shared by [`lower`] (`SyncOn::Always`) and `initial::lower_comb`
/// (`SyncOn::Init`), since §4.6 describes `InitialComb` as "same as §4.5 but
/// the single sync rule is init-type rather than level-always".
pub(crate) fn build(
    body: &Stmt,
    module: &mut Module,
    translator: &mut Translator,
    process: &mut Process,
) -> (Vec<(SigSpec, SigSpec)>, HashMap<String, Memwr>) {
    let memories = module.memories.clone();
    let signals = dispatch::collect_assigned_signals(body, &memories);

    {
        let root_case = process.root_case_mut();
        for signal in &signals {
            match signal {
                AssignedSignal::Full(name) => {
                    let width = module.wire_width(name).unwrap_or(1);
                    dispatch::init_temp_from_signal(name, width, root_case, module, translator);
                }
                AssignedSignal::Slice(name, msb, lsb) => {
                    let temp = dispatch::slice_temp_wire_for(name, *msb, *lsb, module, translator);
                    let src = SigSpec::wire(name.clone()).extract((*lsb).min(*msb), msb.abs_diff(*lsb) + 1);
                    root_case.push_assign(temp, src);
                }
            }
        }
    }

    dispatch::lower_stmt(body, process.root_case_mut(), module, translator, &memories);

    let mut updates = Vec::new();
    for signal in &signals {
        match signal {
            AssignedSignal::Full(name) => {
                let temp = dispatch::temp_wire_for(name, module.wire_width(name).unwrap_or(1), module, translator);
                updates.push((SigSpec::wire(name.clone()), temp));
            }
            AssignedSignal::Slice(name, msb, lsb) => {
                let temp = dispatch::slice_temp_wire_for(name, *msb, *lsb, module, translator);
                let dst = SigSpec::wire(name.clone()).extract((*lsb).min(*msb), msb.abs_diff(*lsb) + 1);
                updates.push((dst, temp));
            }
        }
    }

    let written = memwrite::detect_memory_writes(body, &memories);
    let memwrs = memwrite::build_memwr_actions(&written, &memories, translator);

    (updates, memwrs)
}

/// Lower a Comb-classified procedural block into a [`Process`] with one
/// `SyncOn::Always` rule.
pub(crate) fn lower(block: &ProceduralBlock, module: &mut Module, translator: &mut Translator) -> Process {
    let mut process = Process::new();
    process.set_attr("src", Constant::String(block.src.to_string()));

    let (updates, memwrs) = build(&block.body, module, translator, &mut process);

    let mut sync = Sync::new(SyncOn::Always);
    for (lhs, rhs) in updates {
        sync.push_update(lhs, rhs);
    }
    for (mem, memwr) in memwrs {
        sync.set_memwr(mem, memwr);
    }
    process.syncs_mut().push(sync);
    process
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingHandler;
    use crate::xlate::{import_ports, Config};

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn comb_case_with_default_builds_switch_and_always_sync() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module mux;
            port input 2 sel;
            port input 8 a;
            port input 8 b;
            port output 8 y;
            always @(*)
            case (sel)
                0: y = a;
                1: y = b;
                default: y = 0;
            endcase
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let mut t = translator();
        let process = lower(block, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert_eq!(*process.syncs()[0].sync_event(), SyncOn::Always);
        assert_eq!(process.syncs()[0].updates().len(), 1);
    }

    #[test]
    fn comb_case_with_named_begin_local_builds_one_sync_rule() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module mux_local;
            port input 2 sel;
            port input 8 a;
            port input 8 b;
            port output 8 y;
            always @(*)
            begin : blk
            int tmp;
            case (sel)
                0: tmp = a;
                1: tmp = b;
                default: tmp = 0;
            endcase
            y = tmp;
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let mut t = translator();
        let process = lower(block, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert_eq!(*process.syncs()[0].sync_event(), SyncOn::Always);
        assert!(!process.syncs()[0].updates().is_empty());
    }

    #[test]
    fn comb_memory_read_write_tracks_memwr_action() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module ram_comb;
            port input 1 we;
            port input 2 addr;
            port input 8 data;
            memory 8x4 mem;
            always @(*)
            if (we)
                mem[addr] = data;
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let mut t = translator();
        let process = lower(block, &mut module, &mut t);
        assert!(!process.syncs()[0].memwrs().is_empty());
    }
}
