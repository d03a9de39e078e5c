//! Interpreter (spec §4.7): a small, strict, big-step evaluator over the
//! statement tree, used by `InitialInterpreted` when for-loops declare new
//! variables or control flow assigns to scalars inside a loop body.

use std::collections::HashMap;

use crate::hdl::{Expr, Stmt, UnOp};
use crate::Memory;

/// `vars`/`arrays`/`break_flag`/`continue_flag` state threaded through
/// `exec_stmt`. Evaluation aborts (returns `None`/`Err`) on any construct the
/// interpreter can't fold, per spec: "Unknown/unevaluatable nodes abort the
/// interpreter, which causes the caller to fall back to a gentler lowering."
pub(crate) struct Interpreter {
    vars: HashMap<String, i64>,
    arrays: HashMap<String, Vec<i64>>,
    break_flag: bool,
    continue_flag: bool,
}

const MAX_STEPS: u32 = 1 << 20;

impl Interpreter {
    pub(crate) fn new(memories: &HashMap<String, Memory>) -> Self {
        let arrays = memories.iter().map(|(name, mem)| (name.clone(), vec![0i64; *mem.size()])).collect();
        Interpreter {
            vars: HashMap::new(),
            arrays,
            break_flag: false,
            continue_flag: false,
        }
    }

    pub(crate) fn into_vars(self) -> HashMap<String, i64> {
        self.vars
    }

    pub(crate) fn arrays(&self) -> &HashMap<String, Vec<i64>> {
        &self.arrays
    }

    /// Run the whole body; returns `false` if the interpreter had to abort.
    pub(crate) fn run(&mut self, stmt: &Stmt) -> bool {
        let mut steps = 0u32;
        self.exec_stmt(stmt, &mut steps).is_some()
    }

    fn eval_expr(&self, expr: &Expr) -> Option<i64> {
        match expr {
            Expr::Const(v, _) => Some(*v),
            Expr::Ref(name) => self.vars.get(name).copied(),
            Expr::BitSelect(base, index) => {
                let Expr::Ref(name) = base.as_ref() else { return None };
                let arr = self.arrays.get(name)?;
                let idx = self.eval_expr(index)?;
                arr.get(usize::try_from(idx).ok()?).copied()
            }
            Expr::PartSelect(base, msb, lsb) => {
                let v = self.eval_expr(base)?;
                let width = msb.abs_diff(*lsb) + 1;
                let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                Some(((v as u64 >> lsb.min(msb)) & mask) as i64)
            }
            Expr::Concat(parts) => {
                let mut acc: i64 = 0;
                for p in parts {
                    let v = self.eval_expr(p)?;
                    acc = (acc << 8) | (v & 0xff);
                }
                Some(acc)
            }
            Expr::Unary(op, inner) => {
                let v = self.eval_expr(inner)?;
                Some(match op {
                    UnOp::Neg => -v,
                    UnOp::BitNot => !v,
                    UnOp::LogNot => (v == 0) as i64,
                    UnOp::ReduceOr => (v != 0) as i64,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                Some(crate::expr_eval::apply_binop(*op, l, r))
            }
            Expr::Ternary(cond, then, els) => {
                if self.eval_expr(cond)? != 0 {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(els)
                }
            }
            Expr::FuncCall(..) => None,
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, steps: &mut u32) -> Option<()> {
        *steps += 1;
        if *steps > MAX_STEPS {
            return None;
        }
        match stmt {
            Stmt::Assign { lhs, rhs, .. } => {
                let value = self.eval_expr(rhs)?;
                match lhs {
                    Expr::Ref(name) => {
                        self.vars.insert(name.clone(), value);
                    }
                    Expr::BitSelect(base, index) => {
                        let Expr::Ref(name) = base.as_ref() else { return None };
                        let idx = self.eval_expr(index)?;
                        let idx = usize::try_from(idx).ok()?;
                        let arr = self.arrays.get_mut(name)?;
                        if idx >= arr.len() {
                            return None;
                        }
                        arr[idx] = value;
                    }
                    _ => return None,
                }
                Some(())
            }
            Stmt::Begin(body) | Stmt::NamedBegin { body, .. } => {
                for s in body {
                    self.exec_stmt(s, steps)?;
                    if self.break_flag || self.continue_flag {
                        break;
                    }
                }
                Some(())
            }
            Stmt::If { cond, then, els } => {
                if self.eval_expr(cond)? != 0 {
                    self.exec_stmt(then, steps)
                } else if let Some(els) = els {
                    self.exec_stmt(els, steps)
                } else {
                    Some(())
                }
            }
            Stmt::Case { selector, items, default } => {
                let sel = self.eval_expr(selector)?;
                for (compares, body) in items {
                    for c in compares {
                        if self.eval_expr(c)? == sel {
                            return self.exec_stmt(body, steps);
                        }
                    }
                }
                match default {
                    Some(body) => self.exec_stmt(body, steps),
                    None => Some(()),
                }
            }
            Stmt::For { var, init, cond, step, body, .. } => {
                let mut value = self.eval_expr(init)?;
                self.vars.insert(var.clone(), value);
                loop {
                    if self.eval_expr(cond)? == 0 {
                        break;
                    }
                    self.exec_stmt(body, steps)?;
                    if self.break_flag {
                        self.break_flag = false;
                        break;
                    }
                    self.continue_flag = false;
                    value = self.eval_expr(step)?;
                    self.vars.insert(var.clone(), value);
                    if *steps > MAX_STEPS {
                        return None;
                    }
                }
                Some(())
            }
            Stmt::Repeat { count, body } => {
                let n = self.eval_expr(count)?;
                for _ in 0..n.max(0) {
                    self.exec_stmt(body, steps)?;
                    if self.break_flag {
                        self.break_flag = false;
                        break;
                    }
                    self.continue_flag = false;
                }
                Some(())
            }
            Stmt::Break => {
                self.break_flag = true;
                Some(())
            }
            Stmt::Continue => {
                self.continue_flag = true;
                Some(())
            }
            Stmt::Assert(cond) => {
                self.eval_expr(cond)?;
                Some(())
            }
            Stmt::TaskCall(..) | Stmt::SysTaskCall(..) | Stmt::Empty => Some(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdl::{BinOp, Expr};

    #[test]
    fn unrolls_for_loop_into_array_writes() {
        let memories = HashMap::new();
        let mut interp = Interpreter::new(&memories);
        interp.arrays.insert("mem".to_string(), vec![0; 4]);
        let stmt = Stmt::For {
            var: "i".into(),
            new_var: true,
            init: Expr::Const(0, 32),
            cond: Expr::Binary(BinOp::Lt, Box::new(Expr::Ref("i".into())), Box::new(Expr::Const(4, 32))),
            step: Expr::Binary(BinOp::Add, Box::new(Expr::Ref("i".into())), Box::new(Expr::Const(1, 32))),
            body: Box::new(Stmt::Assign {
                lhs: Expr::BitSelect(Box::new(Expr::Ref("mem".into())), Box::new(Expr::Ref("i".into()))),
                rhs: Expr::Ref("i".into()),
                blocking: true,
            }),
        };
        assert!(interp.run(&stmt));
        assert_eq!(interp.arrays().get("mem").unwrap(), &vec![0, 1, 2, 3]);
    }

    #[test]
    fn aborts_on_unevaluatable_func_call() {
        let memories = HashMap::new();
        let mut interp = Interpreter::new(&memories);
        let stmt = Stmt::Assign {
            lhs: Expr::Ref("x".into()),
            rhs: Expr::FuncCall("foo".into(), vec![]),
            blocking: true,
        };
        assert!(!interp.run(&stmt));
    }
}
