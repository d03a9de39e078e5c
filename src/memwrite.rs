//! MemoryWriteLowering (spec §4.4): detects `mem[addr] <= data` shapes and
//! produces a `MemWriteAction` (`Memwr`) per written memory, with an enable
//! broadcast to the memory's data width and a monotonically increasing
//! priority mask in source order.

use std::collections::{HashMap, HashSet};

use crate::dispatch;
use crate::hdl::{Expr, Stmt};
use crate::xlate::Translator;
use crate::{Constant, Memory, Memwr, SigSpec};

/// Collect the set of memories written anywhere in `stmt` (spec §4.4:
/// "Detection scans the whole process body").
pub(crate) fn detect_memory_writes(stmt: &Stmt, memories: &HashMap<String, Memory>) -> HashSet<String> {
    let mut found = HashSet::new();
    detect_into(stmt, memories, &mut found);
    found
}

fn detect_into(stmt: &Stmt, memories: &HashMap<String, Memory>, found: &mut HashSet<String>) {
    match stmt {
        Stmt::Assign { lhs: Expr::BitSelect(base, _), .. } => {
            if let Expr::Ref(name) = base.as_ref() {
                if memories.contains_key(name) {
                    found.insert(name.clone());
                }
            }
        }
        Stmt::Begin(body) | Stmt::NamedBegin { body, .. } => {
            for s in body {
                detect_into(s, memories, found);
            }
        }
        Stmt::If { then, els, .. } => {
            detect_into(then, memories, found);
            if let Some(els) = els {
                detect_into(els, memories, found);
            }
        }
        Stmt::Case { items, default, .. } => {
            for (_, body) in items {
                detect_into(body, memories, found);
            }
            if let Some(default) = default {
                detect_into(default, memories, found);
            }
        }
        Stmt::For { body, .. } | Stmt::Repeat { body, .. } => detect_into(body, memories, found),
        _ => {}
    }
}

/// Broadcast a 1-bit enable signal to `width` bits by replication (spec §3:
/// "an enable broadcast to the data width").
fn broadcast(bit: SigSpec, width: usize) -> SigSpec {
    if width <= 1 {
        return bit;
    }
    SigSpec::Concat(std::iter::repeat(bit).take(width).collect())
}

/// Build the final `Memwr` entries for every memory written during this
/// process's lowering, assigning priority masks in source order (spec §5:
/// "Memory writes receive monotonically increasing priority masks in source
/// order").
pub(crate) fn build_memwr_actions(
    written: &HashSet<String>,
    memories: &HashMap<String, Memory>,
    translator: &mut Translator,
) -> HashMap<String, Memwr> {
    let mut out = HashMap::new();
    // iterate in a stable order so priority assignment is deterministic
    let mut names: Vec<&String> = written.iter().collect();
    names.sort();
    for name in names {
        let Some(memory) = memories.get(name) else { continue };
        let Some((addr, data, en)) = dispatch::memwrite_temps(name, translator) else {
            continue;
        };
        let priority = translator.next_autoidx() as i32;
        let mut memwr = Memwr::new(addr, data, broadcast(en, *memory.width()), priority);
        memwr
            .attributes
            .insert("src".to_string(), Constant::String(String::new()));
        out.insert(name.clone(), memwr);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingHandler;
    use crate::xlate::Config;
    use crate::{Case, Module, Wire};

    fn translator() -> Translator {
        Translator::new(Config::default(), Box::new(CollectingHandler::new()))
    }

    #[test]
    fn detects_memory_write_inside_if() {
        let mut memories = HashMap::new();
        memories.insert(
            "mem".to_string(),
            Memory {
                width: 8,
                size: 4,
                offset: 0,
                attributes: HashMap::new(),
            },
        );
        let body = Stmt::If {
            cond: Expr::Ref("we".into()),
            then: Box::new(Stmt::Assign {
                lhs: Expr::BitSelect(Box::new(Expr::Ref("mem".into())), Box::new(Expr::Ref("addr".into()))),
                rhs: Expr::Ref("data".into()),
                blocking: false,
            }),
            els: None,
        };
        let found = detect_memory_writes(&body, &memories);
        assert!(found.contains("mem"));
    }

    #[test]
    fn build_actions_broadcasts_enable_and_assigns_priority() {
        let mut module = Module::empty();
        module.memories.insert(
            "mem".to_string(),
            Memory {
                width: 8,
                size: 4,
                offset: 0,
                attributes: HashMap::new(),
            },
        );
        module.wires_mut().insert("addr".to_string(), Wire::with_width(2));
        module.wires_mut().insert("data".to_string(), Wire::with_width(8));
        let mut t = translator();
        let mut case = Case::root();
        let memories = module.memories.clone();
        let memory = memories.get("mem").unwrap();
        dispatch::alloc_memwrite_temps("mem", memory, &mut case, &mut module, &mut t);
        let mut written = HashSet::new();
        written.insert("mem".to_string());
        let actions = build_memwr_actions(&written, &memories, &mut t);
        let memwr = actions.get("mem").unwrap();
        assert_eq!(memwr.enable().size(), 8);
    }
}
