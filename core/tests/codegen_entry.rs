use basalt_core::ir::{run_main, run_main_with_output, ENTRY_FUNCTION};
use basalt_core::program::{Arg, PrimitiveOp};
use basalt_core::{
    generate_error_report, generate_module, BasaltErrorExt, CodegenErrorKind, CodegenOptions, Location, Program,
    ProgramBuilder,
};
use std::fs;
use tempfile::tempdir;

fn argv_program() -> Program {
    let mut pb = ProgramBuilder::new();
    let (int32, char_t) = (pb.std.int32, pb.std.char);
    let c_string = pb.pointer(char_t);
    let c_strings = pb.pointer(c_string);
    let value = pb.primitive("value", c_strings, &[], Some(c_string), PrimitiveOp::PointerGetValue);
    let puts = pb.external("puts", "puts", vec![Arg::new("s", c_string)], Some(int32), false);

    let argv = pb.argv(c_strings);
    let first = pb.call(Some(argv), "value", vec![], vec![value], Some(c_string));
    let print = pb.call(None, "puts", vec![first], vec![puts], Some(int32));
    let argc = pb.argc();
    pb.finish_seq(vec![print, argc])
}

#[test]
fn entry_function_receives_the_argument_vector() {
    let program = argv_program();
    let module = generate_module(&program, &CodegenOptions::default()).expect("module should generate");
    let puts = module.function(module.find_function("puts").expect("declared external"));
    assert!(puts.is_declaration());

    let args = vec!["hello".to_string(), "world".to_string()];
    let (value, output) = run_main_with_output(&module, &args).expect("program should run");
    assert_eq!(output, "hello\n");
    assert_eq!(value.as_int(), Some(2));
}

#[test]
fn program_survives_a_json_round_trip() {
    let program = argv_program();
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("argv.json");
    fs::write(&path, program.to_json().expect("encode")).expect("write program");

    let loaded = Program::load(&path).expect("decode");
    let module = generate_module(&loaded, &CodegenOptions::default()).expect("module should generate");
    let (value, output) = run_main_with_output(&module, &["x".to_string()]).expect("program should run");
    assert_eq!(output, "x\n");
    assert_eq!(value.as_int(), Some(1));
}

fn dangling_call_program() -> Program {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let root = pb.call(None, "missing", vec![], vec![], Some(int32)).at(Location::new("t.bas".to_string(), 3, 5));
    pb.finish(root)
}

#[test]
fn call_without_targets_reports_its_location() {
    let options = CodegenOptions { dump_on_error: false, ..CodegenOptions::default() };
    let err = generate_module(&dangling_call_program(), &options).unwrap_err();
    assert_eq!(err.kind(), CodegenErrorKind::InternalInconsistency);
    let loc = err.location().expect("error location");
    assert_eq!(loc.line, 3);
    assert!(generate_error_report(&err).contains("t.bas"));
}

#[test]
fn failed_generation_dumps_the_partial_module() {
    let dir = tempdir().expect("temp dir");
    let options = CodegenOptions {
        dump_on_error: true,
        dump_dir: Some(dir.path().to_path_buf()),
        ..CodegenOptions::default()
    };
    assert!(generate_module(&dangling_call_program(), &options).is_err());

    let dumps: Vec<_> = fs::read_dir(dir.path())
        .expect("read dump dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("basalt-"))
        .collect();
    assert_eq!(dumps.len(), 1);
    let text = fs::read_to_string(dumps[0].path()).expect("read dump");
    assert!(text.contains(ENTRY_FUNCTION));
}

#[test]
fn debug_info_records_a_subprogram_per_function() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let body = pb.int(9).at(Location::new("t.bas".to_string(), 2, 3));
    let f = pb.fun("nine", &[], Some(int32), body);
    let root = pb.call(None, "nine", vec![], vec![f], Some(int32)).at(Location::new("t.bas".to_string(), 5, 1));
    let program = pb.finish(root);

    let options = CodegenOptions { debug_info: true, filename: Some("t.bas".to_string()), ..CodegenOptions::default() };
    let module = generate_module(&program, &options).expect("module should generate");
    let debug = module.debug.as_ref().expect("debug info");
    assert_eq!(debug.file, "t.bas");
    let names: Vec<&str> = debug.subprograms.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&ENTRY_FUNCTION), "{:?}", names);
    assert!(names.contains(&"nine"), "{:?}", names);
    assert!(module.to_string().contains("!DISubprogram"));
    assert_eq!(run_main(&module, &[]).expect("run").as_int(), Some(9));
}

#[test]
fn out_argument_passes_the_variable_address() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let int_ptr = pb.pointer(int32);
    let fill = pb.external("fill", "fill", vec![Arg { out: true, ..Arg::new("value", int_ptr) }], Some(int32), false);
    let target = pb.var("n", int32);
    let call = pb.call(None, "fill", vec![target], vec![fill], Some(int32));
    let program = pb.finish(call);

    let module = generate_module(&program, &CodegenOptions::default()).expect("module should generate");
    let text = module.to_string();
    assert!(text.contains("declare i32 @fill(i32*)"), "{}", text);
    assert!(text.contains("alloca i32"), "{}", text);
}

#[test]
fn error_location_takes_the_program_file_when_the_node_names_none() {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let root = pb.call(None, "missing", vec![], vec![], Some(int32)).at(Location::new("", 3, 5));
    let mut program = pb.finish(root);
    program.filename = Some("prog.bas".to_string());

    let options = CodegenOptions { dump_on_error: false, ..CodegenOptions::default() };
    let err = generate_module(&program, &options).unwrap_err();
    let loc = err.location().expect("error location");
    assert_eq!(loc.file, "prog.bas");
    assert!(generate_error_report(&err).contains("prog.bas:3:5"));
}
