use basalt_core::ir::run_main;
use basalt_core::program::{BinaryPrim, PrimitiveOp, TypeId};
use basalt_core::{generate_module, CodegenOptions, Module, Program, ProgramBuilder};

fn build(program: &Program) -> Module {
    generate_module(program, &CodegenOptions::default()).expect("module should generate")
}

fn run_int(program: &Program) -> i64 {
    let module = build(program);
    run_main(&module, &[]).expect("program should run").as_int().expect("integer result")
}

#[test]
fn union_keeps_the_runtime_type_of_the_assigned_value() {
    let check = |probe: fn(&ProgramBuilder) -> TypeId| {
        let mut pb = ProgramBuilder::new();
        let (int32, bool_t) = (pb.std.int32, pb.std.bool);
        let u = pb.union(&[int32, bool_t]);
        let value = pb.bool(true);
        let set = pb.assign_var("x", u, value);
        let x = pb.var("x", u);
        let target = probe(&pb);
        let test = pb.is_a(x, target);
        let program = pb.finish_seq(vec![set, test]);
        run_int(&program)
    };
    assert_eq!(check(|pb| pb.std.bool), 1);
    assert_eq!(check(|pb| pb.std.int32), 0);
}

#[test]
fn narrowed_read_extracts_the_payload() {
    let mut pb = ProgramBuilder::new();
    let (int32, bool_t) = (pb.std.int32, pb.std.bool);
    let u = pb.union(&[int32, bool_t]);
    let seven = pb.int(7);
    let set = pb.assign_var("x", u, seven);
    let read = pb.var("x", int32);
    let program = pb.finish_seq(vec![set, read]);
    assert_eq!(run_int(&program), 7);
}

#[test]
fn union_widens_into_a_larger_union() {
    let mut pb = ProgramBuilder::new();
    let (int32, bool_t, nil_t) = (pb.std.int32, pb.std.bool, pb.std.nil);
    let narrow = pb.union(&[int32, bool_t]);
    let wide = pb.union(&[int32, bool_t, nil_t]);
    let seven = pb.int(7);
    let set_x = pb.assign_var("x", narrow, seven);
    let x = pb.var("x", narrow);
    let set_y = pb.assign_var("y", wide, x);
    let y = pb.var("y", wide);
    let is_int = pb.is_a(y, int32);
    let program = pb.finish_seq(vec![set_x, set_y, is_int]);
    assert_eq!(run_int(&program), 1);
}

/// `x : Foo | Nil` assigned either `Foo.allocate` or nil, then `if x then 1 else 2`.
fn nilable_truthiness(assign_nil: bool) -> i64 {
    let mut pb = ProgramBuilder::new();
    let (int32, nil_t) = (pb.std.int32, pb.std.nil);
    let foo = pb.class("Foo", None, &[]);
    let foo_class = pb.metaclass(foo);
    let nilable = pb.union(&[foo, nil_t]);
    let allocate = pb.primitive("allocate", foo_class, &[], Some(foo), PrimitiveOp::Allocate);

    let value = if assign_nil {
        pb.nil()
    } else {
        let recv = pb.type_literal(foo_class);
        pb.call(Some(recv), "allocate", vec![], vec![allocate], Some(foo))
    };
    let set = pb.assign_var("x", nilable, value);
    let x = pb.var("x", nilable);
    let one = pb.int(1);
    let two = pb.int(2);
    let cond = pb.if_(x, Some(one), Some(two), Some(int32));
    let program = pb.finish_seq(vec![set, cond]);
    run_int(&program)
}

#[test]
fn nilable_is_truthy_only_when_set() {
    assert_eq!(nilable_truthiness(false), 1);
    assert_eq!(nilable_truthiness(true), 2);
}

#[test]
fn nilable_is_a_nil_checks_the_pointer() {
    let mut pb = ProgramBuilder::new();
    let nil_t = pb.std.nil;
    let foo = pb.class("Foo", None, &[]);
    let nilable = pb.union(&[foo, nil_t]);
    let nil = pb.nil();
    let set = pb.assign_var("x", nilable, nil);
    let x = pb.var("x", nilable);
    let test = pb.is_a(x, nil_t);
    let program = pb.finish_seq(vec![set, test]);

    let module = build(&program);
    assert!(module.to_string().contains("ptrtoint"));
    assert_eq!(run_main(&module, &[]).expect("run").as_int(), Some(1));
}

#[test]
fn multiple_assignment_evaluates_values_first() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let sub = pb.primitive("-", int32, &[("other", int32)], Some(int32), PrimitiveOp::Binary { op: BinaryPrim::Sub });
    let one = pb.int(1);
    let two = pb.int(2);
    let set_a = pb.assign_var("a", int32, one);
    let set_b = pb.assign_var("b", int32, two);
    let a = pb.var("a", int32);
    let b = pb.var("b", int32);
    let b_val = pb.var("b", int32);
    let a_val = pb.var("a", int32);
    let swap = pb.multi_assign(vec![a, b], vec![b_val, a_val]);
    let a = pb.var("a", int32);
    let b = pb.var("b", int32);
    let diff = pb.call(Some(a), "-", vec![b], vec![sub], Some(int32));
    let program = pb.finish_seq(vec![set_a, set_b, swap, diff]);
    assert_eq!(run_int(&program), 1);
}

#[test]
fn instance_variables_round_trip_through_the_heap_record() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let point = pb.class("Point", None, &[("x", int32), ("y", int32)]);
    let point_class = pb.metaclass(point);
    let allocate = pb.primitive("allocate", point_class, &[], Some(point), PrimitiveOp::Allocate);

    let field = pb.ivar("x", int32);
    let v = pb.var("v", int32);
    let store = pb.assign(field, v);
    let set_x = pb.def("x=", point, &[("v", int32)], Some(int32), store);
    let read = pb.ivar("x", int32);
    let get_x = pb.def("x", point, &[], Some(int32), read);

    let recv = pb.type_literal(point_class);
    let made = pb.call(Some(recv), "allocate", vec![], vec![allocate], Some(point));
    let set_p = pb.assign_var("p", point, made);
    let p = pb.var("p", point);
    let five = pb.int(5);
    let write = pb.call(Some(p), "x=", vec![five], vec![set_x], Some(int32));
    let p = pb.var("p", point);
    let fetch = pb.call(Some(p), "x", vec![], vec![get_x], Some(int32));
    let program = pb.finish_seq(vec![set_p, write, fetch]);

    let module = build(&program);
    assert!(module.find_function("Point#x=<Int32>").is_some());
    assert!(module.find_function("Point#x").is_some());
    assert_eq!(run_main(&module, &[]).expect("run").as_int(), Some(5));
}

#[test]
fn int_or_nil_holds_five_and_is_not_nil() {
    let build_program = |nil_test: bool| {
        let mut pb = ProgramBuilder::new();
        let (int32, nil_t) = (pb.std.int32, pb.std.nil);
        let u = pb.union(&[int32, nil_t]);
        let five = pb.int(5);
        let set = pb.assign_var("x", u, five);
        let last = if nil_test {
            let x = pb.var("x", u);
            pb.is_a(x, nil_t)
        } else {
            pb.var("x", int32)
        };
        pb.finish_seq(vec![set, last])
    };
    assert_eq!(run_int(&build_program(true)), 0);
    assert_eq!(run_int(&build_program(false)), 5);
}

#[test]
fn false_inside_a_union_is_falsy() {
    let truthy = |value: Option<bool>| {
        let mut pb = ProgramBuilder::new();
        let (int32, bool_t, nil_t) = (pb.std.int32, pb.std.bool, pb.std.nil);
        let u = pb.union(&[int32, bool_t, nil_t]);
        let v = match value {
            Some(b) => pb.bool(b),
            None => pb.int(0),
        };
        let set = pb.assign_var("x", u, v);
        let x = pb.var("x", u);
        let one = pb.int(1);
        let two = pb.int(2);
        let cond = pb.if_(x, Some(one), Some(two), Some(int32));
        let program = pb.finish_seq(vec![set, cond]);
        run_int(&program)
    };
    assert_eq!(truthy(Some(false)), 2);
    assert_eq!(truthy(Some(true)), 1);
    // Zero is an ordinary integer, not false.
    assert_eq!(truthy(None), 1);
}
