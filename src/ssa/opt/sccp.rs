//! Sparse conditional constant propagation (Wegman and Zadeck).
//!
//! Every value starts at Top and descends through a three-point lattice
//! (Top, Constant, Bottom) while constant facts flow only along control
//! flow edges proven reachable. Unvisited phi inputs stay Top and drop out
//! of the meet, so branches cut off by a constant condition cannot poison
//! a join. A cell descends at most twice, which bounds the solver.

use crate::ssa::rewrite::rewrite_value_generic;
use crate::ssa::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cell {
    Top, // undefined
    Const(ValueId),
    Bottom, // overdefined
}

// Top ∩ x = x, Bottom ∩ x = Bottom, and two constants meet to themselves
// only when they are the same node.
fn meet(a: Cell, b: Cell) -> Cell {
    match (a, b) {
        (Cell::Top, x) | (x, Cell::Top) => x,
        (Cell::Bottom, _) | (_, Cell::Bottom) => Cell::Bottom,
        (Cell::Const(c1), Cell::Const(c2)) => {
            if c1 == c2 {
                a
            } else {
                Cell::Bottom
            }
        }
    }
}

// The opcodes the solver hands to the generic rewriter. Given all-constant
// arguments and a non-zero divisor, every one of these is guaranteed to
// reduce; a miss is a fatal rule gap.
fn is_foldable_binary(op: Op) -> bool {
    use Op::*;
    matches!(
        op,
        Add8 | Add16
            | Add32
            | Add64
            | Add32F
            | Add64F
            | Sub8
            | Sub16
            | Sub32
            | Sub64
            | Sub32F
            | Sub64F
            | Mul8
            | Mul16
            | Mul32
            | Mul64
            | Mul32F
            | Mul64F
            | Div8
            | Div16
            | Div32
            | Div64
            | Div8u
            | Div16u
            | Div32u
            | Div64u
            | Div32F
            | Div64F
            | Mod8
            | Mod16
            | Mod32
            | Mod64
            | Mod8u
            | Mod16u
            | Mod32u
            | Mod64u
            | Eq8
            | Eq16
            | Eq32
            | Eq64
            | Eq32F
            | Eq64F
            | Less8
            | Less16
            | Less32
            | Less64
            | Less8U
            | Less16U
            | Less32U
            | Less64U
            | Less32F
            | Less64F
            | Leq8
            | Leq16
            | Leq32
            | Leq64
            | Leq8U
            | Leq16U
            | Leq32U
            | Leq64U
            | Leq32F
            | Leq64F
    )
}

fn is_div_or_mod(op: Op) -> bool {
    use Op::*;
    matches!(
        op,
        Div8 | Div16
            | Div32
            | Div64
            | Div8u
            | Div16u
            | Div32u
            | Div64u
            | Div32F
            | Div64F
            | Mod8
            | Mod16
            | Mod32
            | Mod64
            | Mod8u
            | Mod16u
            | Mod32u
            | Mod64u
    )
}

pub struct Sccp {
    debug: usize,
}

impl Sccp {
    pub fn new() -> Self {
        Self { debug: 0 }
    }

    pub fn with_debug(debug: usize) -> Self {
        Self { debug }
    }

    /// Runs the pass to its fixed point and rewrites the function in
    /// place. Returns `(constants replaced, branches rewired)`.
    pub fn optimize(&self, func: &mut Func) -> (usize, usize) {
        let name = func.name.clone();
        let mut t = Solver::new(func, self.debug);
        t.build_def_uses();
        t.solve();
        let (const_cnt, rewire_cnt) = t.replace_const();
        if self.debug > 0 && (const_cnt > 0 || rewire_cnt > 0) {
            eprintln!("{}: {} constants, {} dce", name, const_cnt, rewire_cnt);
        }
        (const_cnt, rewire_cnt)
    }

    #[cfg(test)]
    fn solve_for_test(&self, func: &mut Func) -> (FxHashMap<ValueId, Cell>, FxHashSet<BlockId>) {
        let mut t = Solver::new(func, self.debug);
        t.build_def_uses();
        t.solve();
        (t.cells, t.reachable)
    }
}

impl Default for Sccp {
    fn default() -> Self {
        Self::new()
    }
}

struct Solver<'a> {
    func: &'a mut Func,
    edges: VecDeque<(BlockId, BlockId)>, // CFG edges to propagate through
    uses: VecDeque<ValueId>,             // values to re-visit after a def changed
    visited: FxHashSet<(BlockId, BlockId)>,
    reachable: FxHashSet<BlockId>, // blocks with at least one visited incoming edge
    cells: FxHashMap<ValueId, Cell>,
    def_use: FxHashMap<ValueId, Vec<ValueId>>,
    def_block: FxHashMap<ValueId, Vec<BlockId>>,
    // Canonical node per folded literal, so meet can compare constants by
    // identity.
    const_cache: FxHashMap<(Op, i64), ValueId>,
    debug: usize,
}

impl<'a> Solver<'a> {
    fn new(func: &'a mut Func, debug: usize) -> Self {
        let entry = func.entry;
        let mut edges = VecDeque::new();
        // Self-edge seed so the entry block gets its first visit.
        edges.push_back((entry, entry));
        Self {
            func,
            edges,
            uses: VecDeque::new(),
            visited: FxHashSet::default(),
            reachable: FxHashSet::default(),
            cells: FxHashMap::default(),
            def_use: FxHashMap::default(),
            def_block: FxHashMap::default(),
            const_cache: FxHashMap::default(),
            debug,
        }
    }

    fn cell(&self, v: ValueId) -> Cell {
        // un-visited values are optimistically Top
        self.cells.get(&v).copied().unwrap_or(Cell::Top)
    }

    fn cell_string(&self, c: Cell) -> String {
        match c {
            Cell::Top => "{Top}".to_string(),
            Cell::Bottom => "{Bottom}".to_string(),
            Cell::Const(k) => format!("{{Const v{} [{}]}}", k, self.func.values[k].aux_int),
        }
    }

    /// Builds the def-use chains up front. Once a cell changes, every use
    /// of the value goes back on the worklist, so propagation leans on
    /// these chains heavily.
    fn build_def_uses(&mut self) {
        for block in &self.func.blocks {
            for &v in &block.values {
                for &arg in &self.func.values[v].args {
                    self.def_use.entry(arg).or_default().push(v);
                }
            }
            for &ctl in &block.ctrls {
                self.def_block.entry(ctl).or_default().push(block.id);
            }
        }
        if cfg!(debug_assertions) {
            // Stale use counts on the host IR mean the chains cannot be
            // trusted; give up loudly.
            for v in 0..self.func.values.len() {
                let expect = self.func.values[v].uses as usize;
                let got = self.def_use.get(&v).map_or(0, |u| u.len())
                    + self.def_block.get(&v).map_or(0, |b| b.len());
                if expect != got {
                    self.func.fatal(&format!(
                        "def-use chain of v{} is stale: use count {} but found {}",
                        v, expect, got
                    ));
                }
            }
        }
    }

    /// Interleaves the two worklists until both drain. Edges go first so
    /// reachability always leads value re-evaluation.
    fn solve(&mut self) {
        loop {
            if let Some(e) = self.edges.pop_front() {
                if self.visited.insert(e) {
                    let dest = e.1;
                    let first_visit = self.reachable.insert(dest);
                    let vals: Vec<ValueId> = self.func.blocks[dest].values.clone();
                    for v in vals {
                        // A new incoming edge grows every phi's visible
                        // argument set; other values only need the one
                        // evaluation on the first visit.
                        if self.func.values[v].op == Op::Phi || first_visit {
                            self.visit_value(v);
                        }
                    }
                    if first_visit {
                        self.propagate(dest);
                    }
                }
                continue;
            }
            if let Some(v) = self.uses.pop_front() {
                self.visit_value(v);
                continue;
            }
            break;
        }
    }

    fn visit_value(&mut self, v: ValueId) {
        let old = self.cell(v);
        let op = self.func.values[v].op;

        let new = if op.is_const() {
            Cell::Const(v)
        } else if op == Op::Copy {
            // lattice of copy(x) is the lattice of x
            let x = self.func.values[v].args[0];
            self.cell(x)
        } else if op == Op::Phi {
            self.visit_phi(v)
        } else if is_foldable_binary(op) {
            let a0 = self.func.values[v].args[0];
            let a1 = self.func.values[v].args[1];
            match (self.cell(a0), self.cell(a1)) {
                (Cell::Const(c1), Cell::Const(c2)) => {
                    if is_div_or_mod(op) && self.func.values[c2].aux_int == 0 {
                        // the rewriter must never observe a zero divisor
                        Cell::Bottom
                    } else {
                        match self.compute_const_value(v, c1, c2) {
                            Some(k) => Cell::Const(k),
                            None => Cell::Bottom,
                        }
                    }
                }
                _ => Cell::Bottom,
            }
        } else {
            Cell::Bottom
        };

        if new != old {
            if self.debug > 0 {
                if let Cell::Const(_) = new {
                    eprintln!(
                        "Visit value {} {}->{}",
                        self.func.values[v].long_string(),
                        self.cell_string(old),
                        self.cell_string(new)
                    );
                }
            }
            self.cells.insert(v, new);
            self.add_uses(v);
        }
    }

    /// Meet over the arguments whose incoming edge has been visited.
    /// Unvisited edges contribute Top, the meet identity, so they are
    /// skipped outright.
    fn visit_phi(&mut self, v: ValueId) -> Cell {
        let block = self.func.values[v].block;
        let mut lt = Cell::Top;
        let n = self.func.values[v].args.len();
        for i in 0..n {
            let pred = self.func.blocks[block].preds[i].block;
            if !self.visited.contains(&(pred, block)) {
                continue;
            }
            let arg = self.func.values[v].args[i];
            lt = meet(lt, self.cell(arg));
            if lt == Cell::Bottom {
                break;
            }
        }
        lt
    }

    fn add_uses(&mut self, v: ValueId) {
        if let Some(users) = self.def_use.get(&v) {
            for &u in users {
                if u == v {
                    // a phi may list itself among its uses; skip it, the
                    // other wake-ups cover it transitively
                    continue;
                }
                self.uses.push_back(u);
            }
        }
        let ctrl_blocks = match self.def_block.get(&v) {
            Some(bs) => bs.clone(),
            None => return,
        };
        for b in ctrl_blocks {
            // A block not yet reachable gets its propagation on first
            // visit; re-propagating it here would mark edges whose source
            // was never reached.
            if self.reachable.contains(&b) {
                self.propagate(b);
            }
        }
    }

    /// Enqueues the live outgoing edges of `block`. Single-successor
    /// kinds always propagate; branching kinds consult the lattice of
    /// their condition.
    fn propagate(&mut self, block: BlockId) {
        let kind = self.func.blocks[block].kind;
        match kind {
            BlockKind::Exit | BlockKind::Ret | BlockKind::RetJmp | BlockKind::Invalid => {
                // control flow ends, nothing to enqueue
            }
            BlockKind::Defer => {
                // deferred control flow is opaque, assume every arm runs
                let succs: Vec<BlockId> =
                    self.func.blocks[block].succs.iter().map(|e| e.block).collect();
                for s in succs {
                    self.edges.push_back((block, s));
                }
            }
            BlockKind::Plain | BlockKind::First => {
                // First always takes its first successor
                let s = self.func.blocks[block].succs[0].block;
                self.edges.push_back((block, s));
            }
            BlockKind::If | BlockKind::JumpTable => {
                let cond = self.func.blocks[block].ctrls[0];
                match self.cell(cond) {
                    Cell::Bottom => {
                        let succs: Vec<BlockId> =
                            self.func.blocks[block].succs.iter().map(|e| e.block).collect();
                        for s in succs {
                            self.edges.push_back((block, s));
                            if self.debug > 0 {
                                eprintln!(
                                    "Propagate {:?} through edge b{}->b{} by cond v{}",
                                    kind, block, s, cond
                                );
                            }
                        }
                    }
                    Cell::Const(k) => {
                        let aux = self.func.values[k].aux_int;
                        // Successor 0 is the "then" branch, so a true
                        // condition (aux 1) selects index 0.
                        let branch = if kind == BlockKind::If { 1 - aux } else { aux };
                        let s = self.func.blocks[block].succs[branch as usize].block;
                        self.edges.push_back((block, s));
                        if self.debug > 0 {
                            eprintln!(
                                "Propagate {:?} through edge b{}->b{} by cond v{}",
                                kind, block, s, cond
                            );
                        }
                    }
                    Cell::Top => {
                        // condition not visited yet; propagated again once
                        // it descends
                    }
                }
            }
        }
    }

    /// Evaluates `v` over constant arguments by cloning it into a probe
    /// attached to the entry block and letting the generic rewriter fold
    /// the probe. The original is never rewritten here: its cell may still
    /// descend later, and a premature in-place fold could not be undone.
    /// Probes are abandoned as dead code for a later cleanup pass.
    fn compute_const_value(&mut self, v: ValueId, c1: ValueId, c2: ValueId) -> Option<ValueId> {
        let (op, ty, pos) = {
            let val = &self.func.values[v];
            (val.op, val.ty, val.pos)
        };
        let entry = self.func.entry;
        let probe = self.func.add_value(entry, op, ty, 0, pos);
        self.func.add_arg(probe, c1);
        self.func.add_arg(probe, c2);
        let matched = rewrite_value_generic(self.func, probe);
        if !matched {
            return None;
        }
        if !self.func.values[probe].op.is_const() {
            self.func.fatal(&format!(
                "{} must fold to a constant, missing or unexpectedly matched generic rule",
                self.func.values[v].long_string()
            ));
        }
        // Equal literals must share one node, meet compares by identity.
        let key = (self.func.values[probe].op, self.func.values[probe].aux_int);
        Some(*self.const_cache.entry(key).or_insert(probe))
    }

    /// Rewrites the function after the fixed point: proven-constant cells
    /// become constant values in place, and branches whose condition is
    /// now constant collapse to a plain jump to the live successor.
    fn replace_const(&mut self) -> (usize, usize) {
        let mut const_cnt = 0;
        let mut rewire_cnt = 0;
        let cells: Vec<(ValueId, Cell)> = self.cells.iter().map(|(&v, &c)| (v, c)).collect();
        for (v, cell) in cells {
            let k = match cell {
                Cell::Const(k) => k,
                _ => continue,
            };
            if self.func.values[v].op.is_const() {
                continue;
            }
            if self.debug > 0 {
                eprintln!(
                    "Replace {} with {}",
                    self.func.values[v].long_string(),
                    self.func.values[k].long_string()
                );
            }
            let (kop, kaux) = (self.func.values[k].op, self.func.values[k].aux_int);
            self.func.reset_value(v, kop);
            self.func.values[v].aux_int = kaux;
            const_cnt += 1;

            // Rewire the successors of every block this value controlled.
            let ctrl_blocks = self.def_block.get(&v).cloned().unwrap_or_default();
            for b in ctrl_blocks {
                match self.func.blocks[b].kind {
                    BlockKind::If => {
                        rewire_cnt += self.collapse_if(b, kaux);
                    }
                    BlockKind::JumpTable => {
                        // TODO: rewire jump tables once the index is a
                        // known constant
                    }
                    kind => {
                        self.func
                            .fatal(&format!("constant control on a {:?} block b{}", kind, b));
                    }
                }
            }
        }

        // A branch whose condition was a constant literal to begin with
        // never enters the replacement loop above; collapse those too.
        for b in 0..self.func.blocks.len() {
            if self.func.blocks[b].kind != BlockKind::If {
                continue;
            }
            let cond = self.func.blocks[b].ctrls[0];
            if self.func.values[cond].op != Op::ConstBool {
                continue;
            }
            let aux = self.func.values[cond].aux_int;
            rewire_cnt += self.collapse_if(b, aux);
        }

        (const_cnt, rewire_cnt)
    }

    /// Drops the dead successor (`aux` names its index) and turns the If
    /// into a Plain block with a single live successor.
    fn collapse_if(&mut self, b: BlockId, aux: i64) -> usize {
        self.func.remove_edge(b, aux as usize);
        self.func.blocks[b].kind = BlockKind::Plain;
        self.func.blocks[b].likely = Branch::Unknown;
        self.func.reset_controls(b);
        1
    }
}
