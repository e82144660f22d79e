#![no_main]

// Decodes the fuzz input into a small structurally valid CFG, runs the
// pipeline, and re-verifies the result. Any panic here is a bug.

use libfuzzer_sys::fuzz_target;
use ssaopt::ssa::opt::PassEngine;
use ssaopt::ssa::verify::verify_func;
use ssaopt::ssa::*;
use ssaopt::utils::Pos;

fuzz_target!(|data: &[u8]| {
    let mut cursor = data.iter().copied();
    let mut take = move || cursor.next().unwrap_or(0) as usize;

    let mut f = Func::new("fuzz_pipeline");
    let entry = f.add_block(BlockKind::Plain);
    f.entry = entry;

    let mut ints: Vec<ValueId> = Vec::new();
    ints.push(f.add_value(entry, Op::Arg, Ty::Int32, 0, Pos::none()));
    for _ in 0..3 {
        let lit = take() as i64 - 128;
        ints.push(f.add_value(entry, Op::Const32, Ty::Int32, lit, Pos::none()));
    }

    let mut cur = entry;
    let rounds = 1 + take() % 5;
    for _ in 0..rounds {
        for _ in 0..take() % 5 {
            let ops = [
                Op::Add32,
                Op::Sub32,
                Op::Mul32,
                Op::Div32,
                Op::Div32u,
                Op::Mod32,
            ];
            let op = ops[take() % ops.len()];
            let v = f.add_value(cur, op, Ty::Int32, 0, Pos::none());
            let lhs = ints[take() % ints.len()];
            let rhs = ints[take() % ints.len()];
            f.add_arg(v, lhs);
            f.add_arg(v, rhs);
            ints.push(v);
        }

        let cmp = [Op::Less32, Op::Less32U, Op::Leq32, Op::Eq32];
        let cond = f.add_value(cur, cmp[take() % cmp.len()], Ty::Bool, 0, Pos::none());
        let lhs = ints[take() % ints.len()];
        let rhs = ints[take() % ints.len()];
        f.add_arg(cond, lhs);
        f.add_arg(cond, rhs);
        f.blocks[cur].kind = BlockKind::If;
        f.set_control(cur, cond);

        let then_bb = f.add_block(BlockKind::Plain);
        let else_bb = f.add_block(BlockKind::Plain);
        let join = f.add_block(BlockKind::Plain);
        f.add_edge(cur, then_bb);
        f.add_edge(cur, else_bb);
        f.add_edge(then_bb, join);
        f.add_edge(else_bb, join);

        let lit = take() as i64 - 128;
        let t = f.add_value(then_bb, Op::Const32, Ty::Int32, lit, Pos::none());
        let e = ints[take() % ints.len()];
        let p = f.add_value(join, Op::Phi, Ty::Int32, 0, Pos::none());
        f.add_arg(p, t);
        f.add_arg(p, e);
        ints.push(p);
        cur = join;
    }

    let exit = f.add_block(BlockKind::Ret);
    f.add_edge(cur, exit);
    let mk = f.add_value(exit, Op::MakeResult, Ty::Mem, 0, Pos::none());
    f.add_arg(mk, ints[ints.len() - 1]);
    f.set_control(exit, mk);

    PassEngine::new().run_function(&mut f);
    assert!(verify_func(&f).is_ok());
});
