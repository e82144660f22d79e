use crate::utils::Pos;
use std::fmt;

pub type BlockId = usize;
pub type ValueId = usize;

/// One compiled function in SSA form. Blocks and values live in flat
/// arenas; ids are indices into those arenas and stay stable for the
/// lifetime of the function.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub blocks: Vec<Block>, // indices are BlockIds
    pub values: Vec<Value>, // indices are ValueIds
    pub entry: BlockId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub preds: Vec<Edge>,
    pub succs: Vec<Edge>,
    pub values: Vec<ValueId>,
    // Control values deciding where flow goes next. If/JumpTable carry
    // exactly one; Ret/RetJmp/Exit/Defer carry at most one.
    pub ctrls: Vec<ValueId>,
    pub likely: Branch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Plain,
    If,
    JumpTable,
    Defer,
    First, // two successors, always takes the first
    Exit,
    Ret,
    RetJmp,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Unlikely,
    Unknown,
    Likely,
}

/// One CFG arrow. `b.succs[i] == Edge { block: c, index: j }` always
/// pairs with `c.preds[j] == Edge { block: b, index: i }`; mutators keep
/// the two sides in step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub block: BlockId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub id: ValueId,
    pub op: Op,
    pub ty: Ty,
    pub aux_int: i64,
    pub args: Vec<ValueId>,
    pub block: BlockId, // owning block
    pub pos: Pos,
    pub uses: u32, // argument references plus control references
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Mem,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Invalid,

    // Constant literals. Sub-64-bit integer payloads are stored
    // sign-extended in aux_int; ConstBool stores 0/1; Const32F/Const64F
    // store the f64 bits of the literal (a Const32F payload is always
    // exactly representable in f32).
    Const8,
    Const16,
    Const32,
    Const64,
    ConstBool,
    Const32F,
    Const64F,

    Copy,
    Phi,

    // Opaque producers, never compile-time constant.
    Arg,
    Load,
    Call,
    MakeResult,

    // Integer arithmetic.
    Add8,
    Add16,
    Add32,
    Add64,
    Sub8,
    Sub16,
    Sub32,
    Sub64,
    Mul8,
    Mul16,
    Mul32,
    Mul64,

    // Float arithmetic.
    Add32F,
    Add64F,
    Sub32F,
    Sub64F,
    Mul32F,
    Mul64F,
    Div32F,
    Div64F,

    // Integer division and remainder, signed and unsigned.
    Div8,
    Div16,
    Div32,
    Div64,
    Div8u,
    Div16u,
    Div32u,
    Div64u,
    Mod8,
    Mod16,
    Mod32,
    Mod64,
    Mod8u,
    Mod16u,
    Mod32u,
    Mod64u,

    // Comparisons.
    Eq8,
    Eq16,
    Eq32,
    Eq64,
    Eq32F,
    Eq64F,
    Less8,
    Less16,
    Less32,
    Less64,
    Less8U,
    Less16U,
    Less32U,
    Less64U,
    Less32F,
    Less64F,
    Leq8,
    Leq16,
    Leq32,
    Leq64,
    Leq8U,
    Leq16U,
    Leq32U,
    Leq64U,
    Leq32F,
    Leq64F,

    // Unary operators. Present in the IR but not folded.
    Neg8,
    Neg16,
    Neg32,
    Neg64,
    Not,
}

impl Op {
    pub fn is_const(self) -> bool {
        matches!(
            self,
            Op::Const8
                | Op::Const16
                | Op::Const32
                | Op::Const64
                | Op::ConstBool
                | Op::Const32F
                | Op::Const64F
        )
    }
}

impl Value {
    pub fn aux_i8(&self) -> i8 {
        self.aux_int as i8
    }

    pub fn aux_i16(&self) -> i16 {
        self.aux_int as i16
    }

    pub fn aux_i32(&self) -> i32 {
        self.aux_int as i32
    }

    pub fn aux_i64(&self) -> i64 {
        self.aux_int
    }

    pub fn aux_u8(&self) -> u8 {
        self.aux_int as u8
    }

    pub fn aux_u16(&self) -> u16 {
        self.aux_int as u16
    }

    pub fn aux_u32(&self) -> u32 {
        self.aux_int as u32
    }

    pub fn aux_u64(&self) -> u64 {
        self.aux_int as u64
    }

    pub fn aux_bool(&self) -> bool {
        self.aux_int != 0
    }

    pub fn aux_f64(&self) -> f64 {
        f64::from_bits(self.aux_int as u64)
    }

    pub fn aux_f32(&self) -> f32 {
        self.aux_f64() as f32
    }
}

pub fn aux_from_bool(b: bool) -> i64 {
    b as i64
}

pub fn aux_from_f32(v: f32) -> i64 {
    (v as f64).to_bits() as i64
}

pub fn aux_from_f64(v: f64) -> i64 {
    v.to_bits() as i64
}

impl Func {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            values: Vec::new(),
            entry: 0,
        }
    }

    pub fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block {
            id,
            kind,
            preds: Vec::new(),
            succs: Vec::new(),
            values: Vec::new(),
            ctrls: Vec::new(),
            likely: Branch::Unknown,
        });
        id
    }

    /// Appends a fresh value to `block`. Arguments are attached afterwards
    /// with `add_arg` so use counts stay correct.
    pub fn add_value(&mut self, block: BlockId, op: Op, ty: Ty, aux_int: i64, pos: Pos) -> ValueId {
        let id = self.values.len();
        self.values.push(Value {
            id,
            op,
            ty,
            aux_int,
            args: Vec::new(),
            block,
            pos,
            uses: 0,
        });
        self.blocks[block].values.push(id);
        id
    }

    pub fn add_arg(&mut self, v: ValueId, arg: ValueId) {
        self.values[v].args.push(arg);
        self.values[arg].uses += 1;
    }

    pub fn set_args(&mut self, v: ValueId, args: &[ValueId]) {
        for &a in args {
            self.add_arg(v, a);
        }
    }

    pub fn replace_arg(&mut self, v: ValueId, i: usize, new_arg: ValueId) {
        let old = self.values[v].args[i];
        self.values[old].uses -= 1;
        self.values[v].args[i] = new_arg;
        self.values[new_arg].uses += 1;
    }

    pub fn set_control(&mut self, b: BlockId, v: ValueId) {
        self.blocks[b].ctrls.push(v);
        self.values[v].uses += 1;
    }

    pub fn reset_controls(&mut self, b: BlockId) {
        let ctrls = std::mem::take(&mut self.blocks[b].ctrls);
        for c in ctrls {
            self.values[c].uses -= 1;
        }
    }

    /// Resets a value in place: the id, type, and position survive, the
    /// opcode changes, arguments are detached, and aux_int is cleared.
    pub fn reset_value(&mut self, v: ValueId, op: Op) {
        let args = std::mem::take(&mut self.values[v].args);
        for a in args {
            self.values[a].uses -= 1;
        }
        self.values[v].op = op;
        self.values[v].aux_int = 0;
    }

    /// Wires a new CFG arrow from `from` to `to`, recording reciprocal
    /// indices on both sides.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        let i = self.blocks[from].succs.len();
        let j = self.blocks[to].preds.len();
        self.blocks[from].succs.push(Edge { block: to, index: j });
        self.blocks[to].preds.push(Edge { block: from, index: i });
    }

    /// Removes successor `i` of block `b` together with the reciprocal
    /// predecessor entry, shrinking the argument list of every phi in the
    /// destination so phi arguments stay parallel to the predecessor list.
    pub fn remove_edge(&mut self, b: BlockId, i: usize) {
        let e = self.blocks[b].succs[i];
        let dest = e.block;
        let j = e.index;
        self.remove_succ(b, i);
        self.remove_pred(dest, j);
        let phis: Vec<ValueId> = self.blocks[dest]
            .values
            .iter()
            .copied()
            .filter(|&v| self.values[v].op == Op::Phi)
            .collect();
        for phi in phis {
            self.remove_phi_arg(phi, j);
        }
    }

    pub fn remove_phi_arg(&mut self, phi: ValueId, i: usize) {
        let arg = self.values[phi].args[i];
        self.values[arg].uses -= 1;
        let n = self.values[phi].args.len() - 1;
        self.values[phi].args.swap(i, n);
        self.values[phi].args.truncate(n);
    }

    fn remove_succ(&mut self, b: BlockId, i: usize) {
        let n = self.blocks[b].succs.len() - 1;
        if i != n {
            let e = self.blocks[b].succs[n];
            self.blocks[b].succs[i] = e;
            // The moved edge's other end must learn its new slot.
            self.blocks[e.block].preds[e.index].index = i;
        }
        self.blocks[b].succs.truncate(n);
    }

    fn remove_pred(&mut self, b: BlockId, j: usize) {
        let n = self.blocks[b].preds.len() - 1;
        if j != n {
            let e = self.blocks[b].preds[n];
            self.blocks[b].preds[j] = e;
            self.blocks[e.block].succs[e.index].index = j;
        }
        self.blocks[b].preds.truncate(n);
    }

    /// Internal invariant violation: dump the function and abort. The IR
    /// is trusted in-memory state, so there is nothing to recover.
    pub fn fatal(&self, msg: &str) -> ! {
        eprintln!("{}", self);
        panic!("internal error in {}: {}", self.name, msg);
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (entry b{})", self.name, self.entry)?;
        for blk in &self.blocks {
            write!(f, "  b{}: {:?}", blk.id, blk.kind)?;
            if !blk.ctrls.is_empty() {
                let ctrls: Vec<String> = blk.ctrls.iter().map(|c| format!("v{}", c)).collect();
                write!(f, " ctrl {}", ctrls.join(" "))?;
            }
            if !blk.preds.is_empty() {
                let preds: Vec<String> =
                    blk.preds.iter().map(|e| format!("b{}", e.block)).collect();
                write!(f, " <- {}", preds.join(" "))?;
            }
            if !blk.succs.is_empty() {
                let succs: Vec<String> =
                    blk.succs.iter().map(|e| format!("b{}", e.block)).collect();
                write!(f, " -> {}", succs.join(" "))?;
            }
            writeln!(f)?;
            for &v in &blk.values {
                writeln!(f, "    {}", self.values[v].long_string())?;
            }
        }
        Ok(())
    }
}

impl Value {
    pub fn long_string(&self) -> String {
        let mut s = format!("v{} = {:?} <{:?}>", self.id, self.op, self.ty);
        if self.op.is_const() || self.aux_int != 0 {
            s.push_str(&format!(" [{}]", self.aux_int));
        }
        for a in &self.args {
            s.push_str(&format!(" v{}", a));
        }
        s.push_str(&format!(" uses={}", self.uses));
        s
    }
}
