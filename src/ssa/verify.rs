use crate::ssa::*;
use std::fmt;

#[derive(Debug)]
pub enum VerifyError {
    BadValue(ValueId),
    BadBlock(BlockId),
    ValueInWrongBlock {
        value: ValueId,
        block: BlockId,
    },
    FloatingValue(ValueId),
    DuplicateValue(ValueId),
    BadEdge {
        block: BlockId,
        index: usize,
    },
    BadSuccCount {
        block: BlockId,
        kind: BlockKind,
        got: usize,
    },
    BadCtrlCount {
        block: BlockId,
        kind: BlockKind,
        got: usize,
    },
    PhiArgMismatch {
        phi: ValueId,
        expected: usize,
        got: usize,
    },
    BadUseCount {
        value: ValueId,
        expected: u32,
        got: u32,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::BadValue(v) => write!(f, "invalid ValueId: v{}", v),
            VerifyError::BadBlock(b) => write!(f, "invalid BlockId: b{}", b),
            VerifyError::ValueInWrongBlock { value, block } => {
                write!(f, "v{} listed in b{} but owned elsewhere", value, block)
            }
            VerifyError::FloatingValue(v) => {
                write!(f, "v{} belongs to no block", v)
            }
            VerifyError::DuplicateValue(v) => {
                write!(f, "v{} listed in more than one block", v)
            }
            VerifyError::BadEdge { block, index } => {
                write!(f, "edge {} of b{} has no matching reciprocal", index, block)
            }
            VerifyError::BadSuccCount { block, kind, got } => {
                write!(f, "{:?} block b{} has {} successors", kind, block, got)
            }
            VerifyError::BadCtrlCount { block, kind, got } => {
                write!(f, "{:?} block b{} has {} control values", kind, block, got)
            }
            VerifyError::PhiArgMismatch { phi, expected, got } => write!(
                f,
                "phi v{} has wrong arg count: expected {}, got {}",
                phi, expected, got
            ),
            VerifyError::BadUseCount {
                value,
                expected,
                got,
            } => write!(
                f,
                "v{} use count is stale: expected {}, got {}",
                value, expected, got
            ),
        }
    }
}

/// Structural well-formedness of a function: arena ids are consistent,
/// every edge has its reciprocal, block kinds carry the successor and
/// control arity they require, phi arguments stay parallel to the
/// predecessor list, and stored use counts agree with a recount.
pub fn verify_func(func: &Func) -> Result<(), VerifyError> {
    if func.entry >= func.blocks.len() {
        return Err(VerifyError::BadBlock(func.entry));
    }

    for (vid, val) in func.values.iter().enumerate() {
        if val.id != vid {
            return Err(VerifyError::BadValue(vid));
        }
        for &arg in &val.args {
            if arg >= func.values.len() {
                return Err(VerifyError::BadValue(arg));
            }
        }
    }

    // Every live value sits in exactly one block; reclaimed slots in none.
    let mut membership = vec![0usize; func.values.len()];
    for (bid, blk) in func.blocks.iter().enumerate() {
        if blk.id != bid {
            return Err(VerifyError::BadBlock(bid));
        }
        for &v in &blk.values {
            if v >= func.values.len() {
                return Err(VerifyError::BadValue(v));
            }
            // reclaimed slots must not stay listed anywhere
            if func.values[v].block != bid || func.values[v].op == Op::Invalid {
                return Err(VerifyError::ValueInWrongBlock { value: v, block: bid });
            }
            membership[v] += 1;
        }
        for &c in &blk.ctrls {
            if c >= func.values.len() {
                return Err(VerifyError::BadValue(c));
            }
        }
    }
    for (vid, val) in func.values.iter().enumerate() {
        if val.op == Op::Invalid {
            continue;
        }
        match membership[vid] {
            0 => return Err(VerifyError::FloatingValue(vid)),
            1 => {}
            _ => return Err(VerifyError::DuplicateValue(vid)),
        }
    }

    for (bid, blk) in func.blocks.iter().enumerate() {
        // reciprocal pred/succ indices
        for (i, e) in blk.succs.iter().enumerate() {
            if e.block >= func.blocks.len() {
                return Err(VerifyError::BadBlock(e.block));
            }
            let other = &func.blocks[e.block];
            let ok = other
                .preds
                .get(e.index)
                .map_or(false, |back| back.block == bid && back.index == i);
            if !ok {
                return Err(VerifyError::BadEdge { block: bid, index: i });
            }
        }
        for (j, e) in blk.preds.iter().enumerate() {
            if e.block >= func.blocks.len() {
                return Err(VerifyError::BadBlock(e.block));
            }
            let other = &func.blocks[e.block];
            let ok = other
                .succs
                .get(e.index)
                .map_or(false, |fwd| fwd.block == bid && fwd.index == j);
            if !ok {
                return Err(VerifyError::BadEdge { block: bid, index: j });
            }
        }

        let nsuccs = blk.succs.len();
        let succs_ok = match blk.kind {
            BlockKind::Plain => nsuccs == 1,
            BlockKind::If | BlockKind::First => nsuccs == 2,
            BlockKind::JumpTable | BlockKind::Defer => nsuccs >= 1,
            BlockKind::Exit | BlockKind::Ret | BlockKind::RetJmp | BlockKind::Invalid => {
                nsuccs == 0
            }
        };
        if !succs_ok {
            return Err(VerifyError::BadSuccCount {
                block: bid,
                kind: blk.kind,
                got: nsuccs,
            });
        }

        let nctrls = blk.ctrls.len();
        let ctrls_ok = match blk.kind {
            BlockKind::If | BlockKind::JumpTable => nctrls == 1,
            BlockKind::Ret | BlockKind::RetJmp | BlockKind::Exit | BlockKind::Defer => nctrls <= 1,
            BlockKind::Plain | BlockKind::First | BlockKind::Invalid => nctrls == 0,
        };
        if !ctrls_ok {
            return Err(VerifyError::BadCtrlCount {
                block: bid,
                kind: blk.kind,
                got: nctrls,
            });
        }

        for &v in &blk.values {
            if func.values[v].op == Op::Phi && func.values[v].args.len() != blk.preds.len() {
                return Err(VerifyError::PhiArgMismatch {
                    phi: v,
                    expected: blk.preds.len(),
                    got: func.values[v].args.len(),
                });
            }
        }
    }

    // Recount argument and control references against the stored counts.
    let mut counted = vec![0u32; func.values.len()];
    for val in &func.values {
        for &arg in &val.args {
            counted[arg] += 1;
        }
    }
    for blk in &func.blocks {
        for &c in &blk.ctrls {
            counted[c] += 1;
        }
    }
    for (vid, val) in func.values.iter().enumerate() {
        if val.uses != counted[vid] {
            return Err(VerifyError::BadUseCount {
                value: vid,
                expected: counted[vid],
                got: val.uses,
            });
        }
    }

    Ok(())
}
