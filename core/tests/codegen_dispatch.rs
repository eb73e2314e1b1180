use basalt_core::ir::run_main;
use basalt_core::program::{DefId, Node, PrimitiveOp, TypeId};
use basalt_core::{generate_module, CodegenOptions, Module, Program, ProgramBuilder};

struct Zoo {
    pb: ProgramBuilder,
    animal: TypeId,
    dog: TypeId,
    cat: TypeId,
    bird: TypeId,
    meta: [TypeId; 3],
    allocate: [DefId; 3],
    sound: [DefId; 3],
}

/// `Animal` with subclasses `Dog`, `Cat` and `Bird`; `sound` returns 1, 2 and 3.
fn zoo() -> Zoo {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let animal = pb.class("Animal", None, &[]);
    let dog = pb.class("Dog", Some(animal), &[]);
    let cat = pb.class("Cat", Some(animal), &[]);
    let bird = pb.class("Bird", Some(animal), &[]);
    let mut meta = Vec::new();
    let mut allocate = Vec::new();
    let mut sound = Vec::new();
    for (n, ty) in [dog, cat, bird].into_iter().enumerate() {
        let class = pb.metaclass(ty);
        meta.push(class);
        allocate.push(pb.primitive("allocate", class, &[], Some(ty), PrimitiveOp::Allocate));
        let value = pb.int(n as i64 + 1);
        sound.push(pb.def("sound", ty, &[], Some(int32), value));
    }
    Zoo {
        pb,
        animal,
        dog,
        cat,
        bird,
        meta: [meta[0], meta[1], meta[2]],
        allocate: [allocate[0], allocate[1], allocate[2]],
        sound: [sound[0], sound[1], sound[2]],
    }
}

impl Zoo {
    fn new_instance(&mut self, which: usize) -> Node {
        let ty = [self.dog, self.cat, self.bird][which];
        let recv = self.pb.type_literal(self.meta[which]);
        self.pb.call(Some(recv), "allocate", vec![], vec![self.allocate[which]], Some(ty))
    }
}

fn build(program: &Program) -> Module {
    generate_module(program, &CodegenOptions::default()).expect("module should generate")
}

fn run_int(module: &Module) -> i64 {
    run_main(module, &[]).expect("program should run").as_int().expect("integer result")
}

fn union_sound(which: usize) -> Module {
    let mut z = zoo();
    let u = z.pb.union(&[z.dog, z.cat]);
    let value = z.new_instance(which);
    let set = z.pb.assign_var("a", u, value);
    let a = z.pb.var("a", u);
    let int32 = z.pb.std.int32;
    let call = z.pb.call(Some(a), "sound", vec![], vec![z.sound[0], z.sound[1]], Some(int32));
    let program = z.pb.finish_seq(vec![set, call]);
    build(&program)
}

#[test]
fn dispatch_over_union_picks_the_runtime_candidate() {
    let module = union_sound(0);
    assert_eq!(run_int(&module), 1);
    assert!(module.find_function("Dog#sound").is_some());
    assert!(module.find_function("Cat#sound").is_some());
    assert!(module.to_string().contains("phi i32"));

    assert_eq!(run_int(&union_sound(1)), 2);
}

#[test]
fn never_instantiated_candidate_is_not_generated() {
    let mut z = zoo();
    z.pb.set_allocated(z.bird, false);
    let u = z.pb.union(&[z.dog, z.cat, z.bird]);
    let value = z.new_instance(1);
    let set = z.pb.assign_var("a", u, value);
    let a = z.pb.var("a", u);
    let int32 = z.pb.std.int32;
    let call = z.pb.call(Some(a), "sound", vec![], z.sound.to_vec(), Some(int32));
    let program = z.pb.finish_seq(vec![set, call]);

    let module = build(&program);
    assert!(module.find_function("Bird#sound").is_none());
    assert_eq!(run_int(&module), 2);
}

fn hierarchy_program(which: usize, tail: impl FnOnce(&mut Zoo, TypeId) -> Node) -> Module {
    let mut z = zoo();
    let h = z.pb.hierarchy(z.animal);
    let value = z.new_instance(which);
    let set = z.pb.assign_var("h", h, value);
    let last = tail(&mut z, h);
    let program = z.pb.finish_seq(vec![set, last]);
    build(&program)
}

#[test]
fn dispatch_over_hierarchy_reads_the_box_tag() {
    let sound_of = |which: usize| {
        hierarchy_program(which, |z, h| {
            let var = z.pb.var("h", h);
            let int32 = z.pb.std.int32;
            z.pb.call(Some(var), "sound", vec![], z.sound.to_vec(), Some(int32))
        })
    };
    assert_eq!(run_int(&sound_of(0)), 1);
    assert_eq!(run_int(&sound_of(1)), 2);
    assert_eq!(run_int(&sound_of(2)), 3);
}

#[test]
fn hierarchy_is_a_is_decided_statically() {
    let module = hierarchy_program(0, |z, h| {
        let var = z.pb.var("h", h);
        let animal = z.animal;
        z.pb.is_a(var, animal)
    });
    assert_eq!(run_int(&module), 1);

    // The static answer ignores the runtime subclass held in the box.
    let module = hierarchy_program(0, |z, h| {
        let var = z.pb.var("h", h);
        let dog = z.dog;
        z.pb.is_a(var, dog)
    });
    assert_eq!(run_int(&module), 0);
}

/// `Dog#trait` returns 5 and `Cat#trait` returns true; the call is `Int32 | Bool`.
fn union_result(which: usize) -> i64 {
    let mut z = zoo();
    let (int32, bool_t) = (z.pb.std.int32, z.pb.std.bool);
    let five = z.pb.int(5);
    let dog_trait = z.pb.def("trait", z.dog, &[], Some(int32), five);
    let yes = z.pb.bool(true);
    let cat_trait = z.pb.def("trait", z.cat, &[], Some(bool_t), yes);
    let result_ty = z.pb.union(&[int32, bool_t]);

    let pets = z.pb.union(&[z.dog, z.cat]);
    let value = z.new_instance(which);
    let set = z.pb.assign_var("a", pets, value);
    let a = z.pb.var("a", pets);
    let call = z.pb.call(Some(a), "trait", vec![], vec![dog_trait, cat_trait], Some(result_ty));
    let keep = z.pb.assign_var("t", result_ty, call);

    let t = z.pb.var("t", result_ty);
    let is_bool = z.pb.is_a(t, bool_t);
    let flag = z.pb.int(-1);
    let narrowed = z.pb.var("t", int32);
    let result = z.pb.if_(is_bool, Some(flag), Some(narrowed), Some(int32));
    let program = z.pb.finish_seq(vec![set, keep, result]);
    run_int(&build(&program))
}

#[test]
fn union_typed_dispatch_shares_one_result_slot() {
    assert_eq!(union_result(0), 5);
    assert_eq!(union_result(1), -1);
}

/// `describe(a : Dog)` returns 1 and `describe(a : Nil)` returns 2.
fn describe_nilable(assign_nil: bool) -> Module {
    let mut z = zoo();
    let (int32, nil_t) = (z.pb.std.int32, z.pb.std.nil);
    let one = z.pb.int(1);
    let with_dog = z.pb.fun("describe", &[("a", z.dog)], Some(int32), one);
    let two = z.pb.int(2);
    let with_nil = z.pb.fun("describe", &[("a", nil_t)], Some(int32), two);

    let maybe_dog = z.pb.union(&[z.dog, nil_t]);
    let value = if assign_nil { z.pb.nil() } else { z.new_instance(0) };
    let set = z.pb.assign_var("d", maybe_dog, value);
    let d = z.pb.var("d", maybe_dog);
    let call = z.pb.call(None, "describe", vec![d], vec![with_dog, with_nil], Some(int32));
    let program = z.pb.finish_seq(vec![set, call]);
    build(&program)
}

#[test]
fn dispatch_on_nilable_argument_tests_the_pointer() {
    let module = describe_nilable(false);
    assert!(module.find_function("describe<Dog>").is_some());
    assert!(module.find_function("describe<Nil>").is_some());
    assert!(module.to_string().contains("ptrtoint"));
    assert_eq!(run_int(&module), 1);

    assert_eq!(run_int(&describe_nilable(true)), 2);
}
