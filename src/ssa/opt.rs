use crate::ssa::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::env;

pub mod sccp;

/// Drives the middle-end passes over one function or a whole program.
/// Verification brackets the pipeline; `SSAOPT_VERIFY_EACH_PASS` adds a
/// check between the individual passes as well.
pub struct PassEngine;

#[derive(Debug, Default, Clone, Copy)]
pub struct PassStats {
    pub sccp_consts: usize,
    pub sccp_rewires: usize,
    pub dce_values: usize,
}

impl PassStats {
    fn accumulate(&mut self, other: Self) {
        self.sccp_consts += other.sccp_consts;
        self.sccp_rewires += other.sccp_rewires;
        self.dce_values += other.dce_values;
    }
}

impl PassEngine {
    pub fn new() -> Self {
        Self
    }

    fn env_bool(key: &str, default_v: bool) -> bool {
        match env::var(key) {
            Ok(v) => matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            Err(_) => default_v,
        }
    }

    fn env_usize(key: &str, default_v: usize) -> usize {
        env::var(key)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(default_v)
    }

    fn debug_sccp() -> usize {
        Self::env_usize("SSAOPT_DEBUG_SCCP", 0)
    }

    fn verify_each_pass() -> bool {
        Self::env_bool("SSAOPT_VERIFY_EACH_PASS", false)
    }

    fn verify_or_panic(func: &Func, stage: &str) {
        if let Err(e) = crate::ssa::verify::verify_func(func) {
            func.fatal(&format!("verification failed at {}: {}", stage, e));
        }
    }

    fn maybe_verify(func: &Func, stage: &str) {
        if Self::verify_each_pass() {
            Self::verify_or_panic(func, stage);
        }
    }

    pub fn run_program(&self, funcs: &mut FxHashMap<String, Func>) -> PassStats {
        let mut stats = PassStats::default();
        for (_, func) in funcs.iter_mut() {
            stats.accumulate(self.run_function(func));
        }
        stats
    }

    pub fn run_function(&self, func: &mut Func) -> PassStats {
        let mut stats = PassStats::default();
        Self::verify_or_panic(func, "Start");

        let (consts, rewires) = sccp::Sccp::with_debug(Self::debug_sccp()).optimize(func);
        stats.sccp_consts += consts;
        stats.sccp_rewires += rewires;
        Self::maybe_verify(func, "After SCCP");

        stats.dce_values += self.dce(func);
        Self::verify_or_panic(func, "End");
        stats
    }

    /// Removes values no control value or side-effecting root can reach,
    /// which also reclaims the probe values the constant evaluator left
    /// behind on the entry block.
    fn dce(&self, func: &mut Func) -> usize {
        let mut used = FxHashSet::default();
        let mut worklist: Vec<ValueId> = Vec::new();

        for blk in &func.blocks {
            for &c in &blk.ctrls {
                if used.insert(c) {
                    worklist.push(c);
                }
            }
            for &v in &blk.values {
                // unknown calls may have side effects, keep them anchored
                if func.values[v].op == Op::Call && used.insert(v) {
                    worklist.push(v);
                }
            }
        }

        while let Some(v) = worklist.pop() {
            for &a in &func.values[v].args {
                if used.insert(a) {
                    worklist.push(a);
                }
            }
        }

        let mut removed = 0;
        for bid in 0..func.blocks.len() {
            let vals = func.blocks[bid].values.clone();
            let mut kept = Vec::with_capacity(vals.len());
            for v in vals {
                if used.contains(&v) {
                    kept.push(v);
                } else {
                    func.reset_value(v, Op::Invalid);
                    removed += 1;
                }
            }
            func.blocks[bid].values = kept;
        }
        removed
    }
}

impl Default for PassEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Pos;

    fn const32(f: &mut Func, b: BlockId, v: i32) -> ValueId {
        f.add_value(b, Op::Const32, Ty::Int32, v as i64, Pos::none())
    }

    #[test]
    fn test_engine_folds_and_reclaims_probes() {
        let mut f = Func::new("engine_fold");
        let entry = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Ret);
        f.entry = entry;
        f.add_edge(entry, exit);

        let x = const32(&mut f, entry, 5);
        let y = const32(&mut f, entry, 7);
        let z = f.add_value(entry, Op::Add32, Ty::Int32, 0, Pos::none());
        f.add_arg(z, x);
        f.add_arg(z, y);
        let mk = f.add_value(exit, Op::MakeResult, Ty::Mem, 0, Pos::none());
        f.add_arg(mk, z);
        f.set_control(exit, mk);

        let stats = PassEngine::new().run_function(&mut f);
        assert_eq!(stats.sccp_consts, 1);
        assert_eq!(f.values[z].op, Op::Const32);
        assert_eq!(f.values[z].aux_i32(), 12);
        // the probe and the now-unused literals are swept out
        assert!(stats.dce_values >= 1);
        for blk in &f.blocks {
            for &v in &blk.values {
                assert_ne!(f.values[v].op, Op::Invalid);
            }
        }
        // z stays anchored through the result
        assert!(f.blocks[exit].values.contains(&mk));
        assert!(f.blocks[entry].values.contains(&z));
    }

    #[test]
    fn test_engine_noop_on_opaque_function() {
        let mut f = Func::new("engine_noop");
        let entry = f.add_block(BlockKind::Plain);
        let exit = f.add_block(BlockKind::Ret);
        f.entry = entry;
        f.add_edge(entry, exit);

        let a = f.add_value(entry, Op::Arg, Ty::Int32, 0, Pos::none());
        let b = f.add_value(entry, Op::Arg, Ty::Int32, 1, Pos::none());
        let sum = f.add_value(entry, Op::Add32, Ty::Int32, 0, Pos::none());
        f.add_arg(sum, a);
        f.add_arg(sum, b);
        let mk = f.add_value(exit, Op::MakeResult, Ty::Mem, 0, Pos::none());
        f.add_arg(mk, sum);
        f.set_control(exit, mk);

        let snapshot = f.clone();
        let stats = PassEngine::new().run_function(&mut f);
        assert_eq!(stats.sccp_consts, 0);
        assert_eq!(stats.sccp_rewires, 0);
        assert_eq!(stats.dce_values, 0);
        assert_eq!(f, snapshot);
    }

    #[test]
    fn test_dce_keeps_calls() {
        let mut f = Func::new("dce_calls");
        let entry = f.add_block(BlockKind::Exit);
        f.entry = entry;

        let a = const32(&mut f, entry, 1);
        let call = f.add_value(entry, Op::Call, Ty::Int32, 0, Pos::none());
        f.add_arg(call, a);
        let unused = const32(&mut f, entry, 9);

        let removed = PassEngine::new().dce(&mut f);
        assert_eq!(removed, 1);
        assert_eq!(f.values[unused].op, Op::Invalid);
        assert_eq!(f.values[call].op, Op::Call);
        assert!(f.blocks[entry].values.contains(&call));
        assert!(f.blocks[entry].values.contains(&a));
    }
}
