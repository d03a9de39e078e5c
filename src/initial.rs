//! InitialLowering (spec §4.6): three sub-strategies dispatched by
//! [`crate::classify::Classification::kind`] — `InitialSync` (unrollable
//! for-loops, deduplicated init actions), `InitialComb` (the CombLowering
//! tree with an init-type sync), and `InitialInterpreted` (driven by
//! [`crate::interp::Interpreter`]).

use std::collections::HashSet;

use crate::comb;
use crate::dispatch;
use crate::hdl::{Expr, ProceduralBlock, Stmt};
use crate::interp::Interpreter;
use crate::xlate::Translator;
use crate::{Cell, Constant, Module, Process, SigSpec, Sync, SyncOn};

/// `InitialSync`: assignments and unrollable for-loops only, no control
/// flow. Each unrolled iteration's assignment goes straight into one
/// `SyncOn::Init` rule; later assignments to the same LHS overwrite earlier
/// ones (spec: "deduplicated... generate-scope-local assignments take
/// precedence").
pub(crate) fn lower_sync(block: &ProceduralBlock, module: &mut Module, translator: &mut Translator) -> Process {
    let mut process = Process::new();
    process.set_attr("src", Constant::String(block.src.to_string()));

    let mut updates: Vec<(String, SigSpec)> = Vec::new();
    let mut seen = HashSet::new();
    collect_sync_updates(&block.body, module, translator, &mut updates, &mut seen);

    let mut sync = Sync::new(SyncOn::Init);
    for (name, rhs) in updates {
        sync.push_update(SigSpec::wire(name), rhs);
    }
    process.syncs_mut().push(sync);
    process
}

fn collect_sync_updates(
    stmt: &Stmt,
    module: &mut Module,
    translator: &mut Translator,
    updates: &mut Vec<(String, SigSpec)>,
    seen: &mut HashSet<String>,
) {
    match stmt {
        Stmt::Assign { lhs: Expr::Ref(name), rhs, .. } => {
            let resolved = translator.resolve_name(name);
            let sig = crate::expr_eval::import_expression(rhs, None, module, translator);
            if let Some(pos) = seen_position(&resolved, updates, seen) {
                updates[pos] = (resolved, sig);
            } else {
                seen.insert(resolved.clone());
                updates.push((resolved, sig));
            }
        }
        Stmt::Assign { lhs: Expr::BitSelect(base, index), rhs, .. } => {
            if let Expr::Ref(arr) = base.as_ref() {
                if let Some(idx) = dispatch::const_eval(index, translator) {
                    let name = format!("{}[{}]", arr, idx);
                    let sig = crate::expr_eval::import_expression(rhs, None, module, translator);
                    if let Some(pos) = seen_position(&name, updates, seen) {
                        updates[pos] = (name, sig);
                    } else {
                        seen.insert(name.clone());
                        updates.push((name, sig));
                    }
                }
            }
        }
        Stmt::Begin(body) | Stmt::NamedBegin { body, .. } => {
            for s in body {
                collect_sync_updates(s, module, translator, updates, seen);
            }
        }
        Stmt::For { var, init, cond, step, body, .. } => {
            let Some(mut value) = dispatch::const_eval(init, translator) else {
                return;
            };
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
                collect_sync_updates(body, module, translator, updates, seen);
                let next = dispatch::const_eval(step, translator);
                translator.unbind_loop_var(var);
                match next {
                    Some(n) => value = n,
                    None => break,
                }
            }
        }
        _ => {}
    }
}

fn seen_position(name: &str, updates: &[(String, SigSpec)], seen: &HashSet<String>) -> Option<usize> {
    if seen.contains(name) {
        updates.iter().position(|(n, _)| n == name)
    } else {
        None
    }
}

/// `InitialComb`: reuse CombLowering's tree-building with an init-type sync.
pub(crate) fn lower_comb(block: &ProceduralBlock, module: &mut Module, translator: &mut Translator) -> Process {
    let mut process = Process::new();
    process.set_attr("src", Constant::String(block.src.to_string()));

    let (updates, memwrs) = comb::build(&block.body, module, translator, &mut process);

    let mut sync = Sync::new(SyncOn::Init);
    for (lhs, rhs) in updates {
        sync.push_update(lhs, rhs);
    }
    for (mem, memwr) in memwrs {
        sync.set_memwr(mem, memwr);
    }
    process.syncs_mut().push(sync);
    process
}

/// `InitialInterpreted`: run the interpreter to completion, then emit one
/// init-sync action per written scalar variable that resolves to a module
/// wire, and one `$meminit_v2` cell per written memory element (spec §6/§8:
/// constant `ADDR`, constant `DATA` taken from the interpreter's final
/// array contents, monotonically increasing `PRIORITY`, `EN` all-ones of
/// the memory's data width).
pub(crate) fn lower_interpreted(block: &ProceduralBlock, module: &mut Module, translator: &mut Translator) -> Process {
    let mut process = Process::new();
    process.set_attr("src", Constant::String(block.src.to_string()));

    let memories = module.memories.clone();
    let mut interp = Interpreter::new(&memories);
    if !interp.run(&block.body) {
        translator.report(
            crate::error::Severity::Warning,
            crate::error::DiagnosticKind::InterpreterDiverged,
            "initial-block interpreter could not fully evaluate the body, falling back to partial results",
            crate::error::SourceLoc::default(),
        );
    }

    let mut sync = Sync::new(SyncOn::Init);
    let arrays = interp.arrays().clone();
    for (name, value) in interp.into_vars() {
        let resolved = translator.resolve_name(&name);
        if let Some(width) = module.wire_width(&resolved) {
            sync.push_update(SigSpec::wire(resolved), SigSpec::const_uint(value as u64, width));
        }
    }
    process.syncs_mut().push(sync);

    for (name, values) in arrays.iter() {
        let Some(mem) = memories.get(name) else { continue };
        let addr_width = mem.address_width();
        let data_width = *mem.width();
        for (i, value) in values.iter().enumerate() {
            let cell = Cell::new("$meminit_v2")
                .with_param("MEMID", Constant::String(name.clone()))
                .with_param("PRIORITY", Constant::Integer(i as i32))
                .with_connection("ADDR", SigSpec::const_uint(i as u64, addr_width))
                .with_connection("DATA", SigSpec::const_uint(*value as u64, data_width))
                .with_connection("EN", all_ones(data_width));
            module.cells_mut().insert(format!("$meminit_v2${}${}", name, i), cell);
        }
    }
    process
}

/// A constant all-ones `SigSpec` of the given width, used for `$meminit_v2`'s
/// `EN` connection (every bit of the initialized word is driven).
fn all_ones(width: usize) -> SigSpec {
    SigSpec::Constant(Constant::Value(vec!['1'; width]))
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
    fn initial_sync_unrolls_for_loop_into_init_actions() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module m;
            port output 8 a;
            port output 8 b;
            initial
            begin
                a = 1;
                b = 2;
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let mut t = translator();
        let process = lower_sync(block, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert_eq!(*process.syncs()[0].sync_event(), SyncOn::Init);
        assert_eq!(process.syncs()[0].updates().len(), 2);
    }

    #[test]
    fn initial_interpreted_fills_memory_array() {
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module m;
            memory 8x4 mem;
            initial
            begin
                for (int i = 0; i < 4; i = i + 1)
                    mem[i] = i;
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let mut t = translator();
        let process = lower_interpreted(block, &mut module, &mut t);
        assert_eq!(process.syncs().len(), 1);
        assert_eq!(process.syncs()[0].updates().len(), 0);

        let meminit_cells: Vec<_> = module.cells().values().filter(|c| *c.cell_type() == "$meminit_v2").collect();
        assert_eq!(meminit_cells.len(), 4);
        let mut priorities: Vec<i32> = meminit_cells
            .iter()
            .map(|c| match c.parameters().get("PRIORITY") {
                Some(Constant::Integer(p)) => *p,
                _ => panic!("missing PRIORITY"),
            })
            .collect();
        priorities.sort();
        assert_eq!(priorities, vec![0, 1, 2, 3]);
        for cell in &meminit_cells {
            let Some(SigSpec::Constant(Constant::Value(bits))) = cell.connections().get("EN") else {
                panic!("missing EN");
            };
            assert!(bits.iter().all(|b| *b == '1'));
            assert_eq!(bits.len(), 8);
        }
    }

    #[test]
    fn memory_init_scenario_four_matches_expected_shape() {
        // spec §8 scenario 4: `j` starts at a constant, each iteration writes
        // `mem[i] = j * <const>` then updates `j`, producing one $meminit_v2
        // cell per constant address with distinct data and strictly
        // increasing priority.
        let hdl_module = crate::hdl::parse_fixture(
            r#"
            module m;
            memory 64x4 mem;
            initial
            begin
                int j;
                j = 1;
                for (int i = 0; i < 4; i = i + 1)
                begin
                    mem[i] = j;
                    j = j + 1;
                end
            end
            endmodule
            "#,
        )
        .unwrap();
        let mut module = import_ports(&hdl_module);
        let block = &hdl_module.procs[0];
        let mut t = translator();
        let _process = lower_interpreted(block, &mut module, &mut t);

        let mut meminit_cells: Vec<_> = module.cells().values().filter(|c| *c.cell_type() == "$meminit_v2").collect();
        assert_eq!(meminit_cells.len(), 4);
        meminit_cells.sort_by_key(|c| match c.parameters().get("PRIORITY") {
            Some(Constant::Integer(p)) => *p,
            _ => panic!("missing PRIORITY"),
        });
        for (i, cell) in meminit_cells.iter().enumerate() {
            let Some(addr) = cell.connections().get("ADDR").and_then(SigSpec::as_const_int) else {
                panic!("missing constant ADDR");
            };
            assert_eq!(addr, i as i64);
            assert!(cell.connections().get("DATA").and_then(SigSpec::as_const_int).is_some());
        }
    }
}
