use basalt_core::ir::{run_main, ENTRY_FUNCTION};
use basalt_core::program::{BinaryPrim, PrimitiveOp};
use basalt_core::{generate_module, CodegenOptions, Module, Program, ProgramBuilder};

fn build(program: &Program) -> Module {
    generate_module(program, &CodegenOptions::default()).expect("module should generate")
}

fn run_int(module: &Module) -> i64 {
    run_main(module, &[]).expect("program should run").as_int().expect("integer result")
}

#[test]
fn constant_is_initialized_once_before_the_entry_block() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let add = pb.primitive("+", int32, &[("other", int32)], Some(int32), PrimitiveOp::Binary { op: BinaryPrim::Add });
    let three = pb.int(3);
    let four = pb.int(4);
    let init = pb.call(Some(three), "+", vec![four], vec![add], Some(int32));
    let k = pb.constant("K", init);

    let a = pb.const_ref(k);
    let b = pb.const_ref(k);
    let ab = pb.call(Some(a), "+", vec![b], vec![add], Some(int32));
    let c = pb.const_ref(k);
    let root = pb.call(Some(ab), "+", vec![c], vec![add], Some(int32));
    let program = pb.finish(root);

    let module = build(&program);
    assert_eq!(run_int(&module), 21);

    let main = module.function(module.find_function(ENTRY_FUNCTION).expect("entry"));
    let const_blocks = main.blocks.iter().filter(|b| b.name.starts_with("const_K")).count();
    assert_eq!(const_blocks, 1);
    assert!(module.find_global("K").is_some());
    assert_eq!(module.functions.iter().filter(|f| f.name == "Int32#+<Int32>").count(), 1);
}

#[test]
fn literal_constant_becomes_a_global_initializer() {
    let mut pb = ProgramBuilder::new();
    let seven = pb.int(7);
    let k = pb.constant("SEVEN", seven);
    let root = pb.const_ref(k);
    let program = pb.finish(root);

    let module = build(&program);
    let global = module.global(module.find_global("SEVEN").expect("constant global"));
    assert!(global.constant);
    assert!(global.init.is_some());
    assert_eq!(run_int(&module), 7);
}

#[test]
fn symbols_are_numbered_in_sorted_order() {
    let build_program = || {
        let mut pb = ProgramBuilder::new();
        let zeta = pb.symbol("zeta");
        let alpha = pb.symbol("alpha");
        let z = pb.symbol("zeta");
        pb.finish_seq(vec![zeta, alpha, z])
    };
    let module = build(&build_program());
    assert_eq!(run_int(&module), 1);
    assert!(module.find_global("symbol_table").is_some());

    let again = build(&build_program());
    assert_eq!(module.to_string(), again.to_string());
}

#[test]
fn equal_string_literals_share_one_global() {
    let mut pb = ProgramBuilder::new();
    let first = pb.string("hello");
    let second = pb.string("hello");
    let other = pb.string("bye");
    let zero = pb.int(0);
    let program = pb.finish_seq(vec![first, second, other, zero]);

    let module = build(&program);
    let text = module.to_string();
    assert_eq!(text.matches("hello").count(), 1, "{}", text);
    assert_eq!(run_int(&module), 0);
}
