use basalt_core::ir::{run_main, ENTRY_FUNCTION};
use basalt_core::program::{BinaryPrim, DefId, PrimitiveOp};
use basalt_core::{generate_module, CodegenOptions, Module, Program, ProgramBuilder};

fn build(program: &Program) -> Module {
    generate_module(program, &CodegenOptions::default()).expect("module should generate")
}

fn run_int(module: &Module) -> i64 {
    run_main(module, &[]).expect("program should run").as_int().expect("integer result")
}

fn main_blocks(module: &Module) -> Vec<String> {
    let main = module.find_function(ENTRY_FUNCTION).expect("entry function");
    module.function(main).blocks.iter().map(|b| b.name.clone()).collect()
}

fn int_op(pb: &mut ProgramBuilder, name: &str, op: BinaryPrim, returns_bool: bool) -> DefId {
    let int32 = pb.std.int32;
    let ret = if returns_bool { pb.std.bool } else { int32 };
    pb.primitive(name, int32, &[("other", int32)], Some(ret), PrimitiveOp::Binary { op })
}

/// `def each_upto(n)`: yields 0, 1, ... n - 1.
fn each_upto(pb: &mut ProgramBuilder, lt: DefId, add: DefId) -> DefId {
    let (int32, nil_t, bool_t) = (pb.std.int32, pb.std.nil, pb.std.bool);
    let zero = pb.int(0);
    let init = pb.assign_var("i", int32, zero);
    let i = pb.var("i", int32);
    let n = pb.var("n", int32);
    let cond = pb.call(Some(i), "<", vec![n], vec![lt], Some(bool_t));
    let i = pb.var("i", int32);
    let yielded = pb.yield_(vec![i], Some(nil_t));
    let i = pb.var("i", int32);
    let one = pb.int(1);
    let next = pb.call(Some(i), "+", vec![one], vec![add], Some(int32));
    let step = pb.assign_var("i", int32, next);
    let body = pb.seq(vec![yielded, step]);
    let lp = pb.while_(cond, Some(body), false);
    let nil = pb.nil();
    let def_body = pb.seq(vec![init, lp, nil]);
    pb.fun("each_upto", &[("n", int32)], Some(nil_t), def_body)
}

#[test]
fn nil_condition_folds_to_else_branch() {
    let mut pb = ProgramBuilder::new();
    let (nil_t, int32) = (pb.std.nil, pb.std.int32);
    let nil = pb.nil();
    let set = pb.assign_var("x", nil_t, nil);
    let x = pb.var("x", nil_t);
    let one = pb.int(1);
    let two = pb.int(2);
    let cond = pb.if_(x, Some(one), Some(two), Some(int32));
    let program = pb.finish_seq(vec![set, cond]);

    let module = build(&program);
    let blocks = main_blocks(&module);
    assert!(!blocks.iter().any(|b| b.starts_with("then") || b.starts_with("exit")), "{:?}", blocks);
    assert_eq!(run_int(&module), 2);
}

#[test]
fn constant_true_condition_emits_only_then_branch() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let cond = pb.bool(true);
    let one = pb.int(1);
    let two = pb.int(2);
    let root = pb.if_(cond, Some(one), Some(two), Some(int32));
    let program = pb.finish(root);

    let module = build(&program);
    assert_eq!(main_blocks(&module), vec!["alloca", "const", "entry"]);
    assert_eq!(run_int(&module), 1);
}

fn union_truthiness(assign_nil: bool) -> (Module, i64) {
    let mut pb = ProgramBuilder::new();
    let (nil_t, int32) = (pb.std.nil, pb.std.int32);
    let u = pb.union(&[int32, nil_t]);
    let value = if assign_nil { pb.nil() } else { pb.int(5) };
    let set = pb.assign_var("x", u, value);
    let x = pb.var("x", u);
    let one = pb.int(1);
    let two = pb.int(2);
    let cond = pb.if_(x, Some(one), Some(two), Some(int32));
    let program = pb.finish_seq(vec![set, cond]);
    let module = build(&program);
    let result = run_int(&module);
    (module, result)
}

#[test]
fn union_condition_tests_the_tag_at_runtime() {
    let (module, result) = union_truthiness(false);
    assert_eq!(result, 1);
    let blocks = main_blocks(&module);
    assert!(blocks.iter().any(|b| b.starts_with("then")), "{:?}", blocks);
    assert!(blocks.iter().any(|b| b.starts_with("exit")), "{:?}", blocks);

    let (_, result) = union_truthiness(true);
    assert_eq!(result, 2);
}

#[test]
fn break_leaves_infinite_loop() {
    let mut pb = ProgramBuilder::new();
    let (int32, bool_t) = (pb.std.int32, pb.std.bool);
    let add = int_op(&mut pb, "+", BinaryPrim::Add, false);
    let eq = int_op(&mut pb, "==", BinaryPrim::Eq, true);

    let zero = pb.int(0);
    let init = pb.assign_var("i", int32, zero);
    let i = pb.var("i", int32);
    let one = pb.int(1);
    let sum = pb.call(Some(i), "+", vec![one], vec![add], Some(int32));
    let step = pb.assign_var("i", int32, sum);
    let i = pb.var("i", int32);
    let five = pb.int(5);
    let done = pb.call(Some(i), "==", vec![five], vec![eq], Some(bool_t));
    let stop = pb.brk(None);
    let check = pb.if_(done, Some(stop), None, None);
    let body = pb.seq(vec![step, check]);
    let forever = pb.bool(true);
    let lp = pb.while_(forever, Some(body), false);
    let result = pb.var("i", int32);
    let program = pb.finish_seq(vec![init, lp, result]);

    let module = build(&program);
    assert_eq!(run_int(&module), 5);
}

#[test]
fn return_inside_block_leaves_enclosing_function() {
    let build_program = |limit: i64| {
        let mut pb = ProgramBuilder::new();
        let (int32, nil_t, bool_t) = (pb.std.int32, pb.std.nil, pb.std.bool);
        let lt = int_op(&mut pb, "<", BinaryPrim::Lt, true);
        let gt = int_op(&mut pb, ">", BinaryPrim::Gt, true);
        let add = int_op(&mut pb, "+", BinaryPrim::Add, false);
        let each = each_upto(&mut pb, lt, add);

        let x = pb.var("x", int32);
        let lim = pb.var("limit", int32);
        let over = pb.call(Some(x), ">", vec![lim], vec![gt], Some(bool_t));
        let x = pb.var("x", int32);
        let ret = pb.ret(Some(x));
        let check = pb.if_(over, Some(ret), None, None);
        let block = pb.block(&[("x", int32)], Some(check));
        let ten = pb.int(10);
        let iterate = pb.call_with_block(None, "each_upto", vec![ten], each, block, Some(nil_t));
        let not_found = pb.int(-1);
        let body = pb.seq(vec![iterate, not_found]);
        let find = pb.fun("find_first_over", &[("limit", int32)], Some(int32), body);

        let arg = pb.int(limit);
        let root = pb.call(None, "find_first_over", vec![arg], vec![find], Some(int32));
        pb.finish(root)
    };

    let module = build(&build_program(3));
    assert_eq!(run_int(&module), 4);
    // The block body is inlined; no function exists for the iterator.
    assert!(module.find_function("each_upto").is_none());

    let module = build(&build_program(20));
    assert_eq!(run_int(&module), -1);
}

#[test]
fn break_inside_block_leaves_only_the_inlined_call() {
    let mut pb = ProgramBuilder::new();
    let (int32, nil_t, bool_t) = (pb.std.int32, pb.std.nil, pb.std.bool);
    let lt = int_op(&mut pb, "<", BinaryPrim::Lt, true);
    let eq = int_op(&mut pb, "==", BinaryPrim::Eq, true);
    let add = int_op(&mut pb, "+", BinaryPrim::Add, false);
    let each = each_upto(&mut pb, lt, add);

    let zero = pb.int(0);
    let init = pb.assign_var("total", int32, zero);
    let total = pb.var("total", int32);
    let x = pb.var("x", int32);
    let sum = pb.call(Some(total), "+", vec![x], vec![add], Some(int32));
    let acc = pb.assign_var("total", int32, sum);
    let x = pb.var("x", int32);
    let three = pb.int(3);
    let done = pb.call(Some(x), "==", vec![three], vec![eq], Some(bool_t));
    let stop = pb.brk(None);
    let check = pb.if_(done, Some(stop), None, None);
    let body = pb.seq(vec![acc, check]);
    let block = pb.block(&[("x", int32)], Some(body));
    let ten = pb.int(10);
    let iterate = pb.call_with_block(None, "each_upto", vec![ten], each, block, Some(nil_t));
    let result = pb.var("total", int32);
    let program = pb.finish_seq(vec![init, iterate, result]);

    let module = build(&program);
    assert_eq!(run_int(&module), 6);
}

#[test]
fn statements_after_return_are_not_generated() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let seven = pb.int(7);
    let early = pb.ret(Some(seven));
    let eight = pb.int(8);
    let body = pb.seq(vec![early, eight]);
    let f = pb.fun("early", &[], Some(int32), body);
    let root = pb.call(None, "early", vec![], vec![f], Some(int32));
    let program = pb.finish(root);

    let module = build(&program);
    assert_eq!(run_int(&module), 7);
    let f = module.find_function("early").expect("generated function");
    assert_eq!(module.function(f).blocks.len(), 2);
}

#[test]
fn run_once_loop_enters_the_body_before_testing() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let add = int_op(&mut pb, "+", BinaryPrim::Add, false);
    let zero = pb.int(0);
    let init = pb.assign_var("i", int32, zero);
    let i = pb.var("i", int32);
    let one = pb.int(1);
    let sum = pb.call(Some(i), "+", vec![one], vec![add], Some(int32));
    let step = pb.assign_var("i", int32, sum);
    let never = pb.bool(false);
    let lp = pb.while_(never, Some(step), true);
    let result = pb.var("i", int32);
    let program = pb.finish_seq(vec![init, lp, result]);

    let module = build(&program);
    assert_eq!(run_int(&module), 1);
}

/// `y = argc == 0 ? 7 : true` typed `Int32 | Bool`, then `y.is_a?(Int32) ? y : -1`.
fn union_valued_if(args: &[String]) -> i64 {
    let mut pb = ProgramBuilder::new();
    let (int32, bool_t) = (pb.std.int32, pb.std.bool);
    let eq = int_op(&mut pb, "==", BinaryPrim::Eq, true);
    let u = pb.union(&[int32, bool_t]);

    let argc = pb.argc();
    let zero = pb.int(0);
    let cond = pb.call(Some(argc), "==", vec![zero], vec![eq], Some(bool_t));
    let seven = pb.int(7);
    let yes = pb.bool(true);
    let choice = pb.if_(cond, Some(seven), Some(yes), Some(u));
    let set = pb.assign_var("y", u, choice);
    let y = pb.var("y", u);
    let is_int = pb.is_a(y, int32);
    let narrowed = pb.var("y", int32);
    let missing = pb.int(-1);
    let result = pb.if_(is_int, Some(narrowed), Some(missing), Some(int32));
    let program = pb.finish_seq(vec![set, result]);

    let module = build(&program);
    run_main(&module, args).expect("program should run").as_int().expect("integer result")
}

#[test]
fn union_valued_if_merges_through_a_shared_slot() {
    assert_eq!(union_valued_if(&[]), 7);
    assert_eq!(union_valued_if(&["x".to_string()]), -1);
}

/// Iterate 0..10 and `break x` once `x == stop`; the call is `Int32 | Nil`.
fn break_with_value(stop: i64) -> i64 {
    let mut pb = ProgramBuilder::new();
    let (int32, nil_t, bool_t) = (pb.std.int32, pb.std.nil, pb.std.bool);
    let lt = int_op(&mut pb, "<", BinaryPrim::Lt, true);
    let eq = int_op(&mut pb, "==", BinaryPrim::Eq, true);
    let add = int_op(&mut pb, "+", BinaryPrim::Add, false);
    let each = each_upto(&mut pb, lt, add);
    let maybe = pb.union(&[int32, nil_t]);

    let x = pb.var("x", int32);
    let k = pb.int(stop);
    let hit = pb.call(Some(x), "==", vec![k], vec![eq], Some(bool_t));
    let x = pb.var("x", int32);
    let leave = pb.brk(Some(x));
    let check = pb.if_(hit, Some(leave), None, None);
    let block = pb.block(&[("x", int32)], Some(check));
    let ten = pb.int(10);
    let iterate = pb.call_with_block(None, "each_upto", vec![ten], each, block, Some(maybe));
    let set = pb.assign_var("r", maybe, iterate);

    let r = pb.var("r", maybe);
    let is_int = pb.is_a(r, int32);
    let narrowed = pb.var("r", int32);
    let missing = pb.int(-1);
    let result = pb.if_(is_int, Some(narrowed), Some(missing), Some(int32));
    let program = pb.finish_seq(vec![set, result]);
    run_int(&build(&program))
}

#[test]
fn break_with_value_fills_the_union_slot_of_the_inlined_call() {
    assert_eq!(break_with_value(3), 3);
    // Running off the end yields the callee's own nil.
    assert_eq!(break_with_value(30), -1);
}

/// `def find_first_over(limit) : Int32 | Nil` returning from inside a block.
fn union_return_from_block(limit: i64) -> Module {
    let mut pb = ProgramBuilder::new();
    let (int32, nil_t, bool_t) = (pb.std.int32, pb.std.nil, pb.std.bool);
    let lt = int_op(&mut pb, "<", BinaryPrim::Lt, true);
    let gt = int_op(&mut pb, ">", BinaryPrim::Gt, true);
    let add = int_op(&mut pb, "+", BinaryPrim::Add, false);
    let each = each_upto(&mut pb, lt, add);
    let maybe = pb.union(&[int32, nil_t]);

    let x = pb.var("x", int32);
    let lim = pb.var("limit", int32);
    let over = pb.call(Some(x), ">", vec![lim], vec![gt], Some(bool_t));
    let x = pb.var("x", int32);
    let ret = pb.ret(Some(x));
    let check = pb.if_(over, Some(ret), None, None);
    let block = pb.block(&[("x", int32)], Some(check));
    let ten = pb.int(10);
    let iterate = pb.call_with_block(None, "each_upto", vec![ten], each, block, Some(nil_t));
    let none = pb.nil();
    let body = pb.seq(vec![iterate, none]);
    let find = pb.fun("find_first_over", &[("limit", int32)], Some(maybe), body);

    let arg = pb.int(limit);
    let found = pb.call(None, "find_first_over", vec![arg], vec![find], Some(maybe));
    let set = pb.assign_var("r", maybe, found);
    let r = pb.var("r", maybe);
    let is_int = pb.is_a(r, int32);
    let narrowed = pb.var("r", int32);
    let missing = pb.int(-1);
    let result = pb.if_(is_int, Some(narrowed), Some(missing), Some(int32));
    let program = pb.finish_seq(vec![set, result]);
    build(&program)
}

#[test]
fn union_returning_function_goes_through_its_return_slot() {
    let module = union_return_from_block(3);
    let f = module.find_function("find_first_over<Int32>").expect("generated function");
    assert!(module.function(f).blocks.iter().any(|b| b.name.starts_with("return")));
    assert_eq!(run_int(&module), 4);

    assert_eq!(run_int(&union_return_from_block(20)), -1);
}
