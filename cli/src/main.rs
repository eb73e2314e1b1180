use basalt_core::ir::{run_main_with_output, Module};
use basalt_core::{generate_error_report, generate_module, BasaltErrorExt, CodegenError, CodegenOptions, Program};
use clap::{Arg, ArgAction, ArgMatches, Command};
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Table};
use console::Style;
use log::{LevelFilter, Log, Metadata, Record};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

/// Plain stderr logger; the level comes from `--verbose`.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> ExitCode {
    let cli = Command::new("basalt")
        .version("0.1.0")
        .about("Generate and run IR modules from typed programs");

    let cli = setup_cli(cli);
    let matches = cli.get_matches();
    init_logging(matches.get_count("verbose"));
    match dispatch_commands(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", Style::new().red().bold().apply_to(generate_error_report(e.as_ref())));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Sets up the CLI with subcommands and arguments.
fn setup_cli(cli: Command) -> Command {
    let program_arg = || {
        Arg::new("file")
            .help("The typed program (JSON)")
            .required(true)
            .index(1)
    };
    let config_arg = || {
        Arg::new("config")
            .help("JSON file with code generation options")
            .short('c')
            .long("config")
            .value_parser(clap::value_parser!(String))
            .value_name("FILE")
    };
    cli.arg(
        Arg::new("verbose")
            .help("Log more (repeat for more detail)")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .global(true),
    )
    .subcommand(
        Command::new("build")
            .about("Generate the IR module for a typed program")
            .arg(program_arg())
            .arg(
                Arg::new("output")
                    .help("Write the module to this file instead of stdout")
                    .short('o')
                    .long("output")
                    .value_parser(clap::value_parser!(String))
                    .value_name("FILE"),
            )
            .arg(
                Arg::new("debug-info")
                    .help("Attach source locations to the module")
                    .long("debug-info")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("no-verify")
                    .help("Skip structural verification")
                    .long("no-verify")
                    .action(ArgAction::SetTrue),
            )
            .arg(config_arg()),
    )
    .subcommand(
        Command::new("run")
            .about("Generate a typed program and execute it")
            .arg(program_arg())
            .arg(config_arg())
            .arg(
                Arg::new("args")
                    .help("Arguments passed to the program")
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .index(2),
            ),
    )
    .subcommand(
        Command::new("stats")
            .about("Summarize the functions and globals of the generated module")
            .arg(program_arg())
            .arg(config_arg())
            .arg(
                Arg::new("json")
                    .help("Print the summary as JSON")
                    .long("json")
                    .action(ArgAction::SetTrue),
            ),
    )
}

type CliResult = Result<(), Box<dyn BasaltErrorExt>>;

/// Dispatches the command based on the parsed arguments.
fn dispatch_commands(matches: &ArgMatches) -> CliResult {
    match matches.subcommand() {
        Some(("build", sub_m)) => {
            let mut options = load_options(sub_m)?;
            if sub_m.get_flag("debug-info") {
                options.debug_info = true;
            }
            if sub_m.get_flag("no-verify") {
                options.verify = false;
            }
            let module = build(sub_m, &options)?;
            match sub_m.get_one::<String>("output") {
                Some(out) => {
                    fs::write(out, module.to_string())
                        .map_err(|e| boxed(CodegenError::input(format!("cannot write {}: {}", out, e))))?;
                    println!("{} {}", Style::new().green().apply_to("wrote"), out);
                }
                None => print!("{}", module),
            }
            Ok(())
        }
        Some(("run", sub_m)) => {
            let options = load_options(sub_m)?;
            let module = build(sub_m, &options)?;
            let args: Vec<String> = sub_m
                .get_many::<String>("args")
                .map(|vals| vals.cloned().collect())
                .unwrap_or_default();
            let (value, output) = run_main_with_output(&module, &args).map_err(|e| Box::new(e) as Box<dyn BasaltErrorExt>)?;
            print!("{}", output);
            println!("{}", value);
            Ok(())
        }
        Some(("stats", sub_m)) => {
            let options = load_options(sub_m)?;
            let module = build(sub_m, &options)?;
            if sub_m.get_flag("json") {
                let summary = serde_json::to_string_pretty(&ModuleStats::of(&module))
                    .map_err(|e| boxed(CodegenError::input(format!("cannot encode stats: {}", e))))?;
                println!("{}", summary);
            } else {
                print_stats(&module);
            }
            Ok(())
        }
        _ => {
            println!("No valid subcommand was used. Use --help for more information.");
            Ok(())
        }
    }
}

fn boxed(e: CodegenError) -> Box<dyn BasaltErrorExt> {
    Box::new(e)
}

fn load_options(sub_m: &ArgMatches) -> Result<CodegenOptions, Box<dyn BasaltErrorExt>> {
    let options = match sub_m.get_one::<String>("config") {
        Some(path) => CodegenOptions::load(Path::new(path)).map_err(boxed)?,
        None => CodegenOptions::default(),
    };
    Ok(options.from_env())
}

fn build(sub_m: &ArgMatches, options: &CodegenOptions) -> Result<Module, Box<dyn BasaltErrorExt>> {
    let file = sub_m
        .get_one::<String>("file")
        .ok_or_else(|| boxed(CodegenError::input("no program file given")))?;
    let mut program = Program::load(file).map_err(boxed)?;
    if program.filename.is_none() {
        program.filename = Some(file.clone());
    }
    generate_module(&program, options).map_err(boxed)
}

#[derive(Serialize)]
struct FunctionStats<'m> {
    name: &'m str,
    linkage: String,
    blocks: usize,
    instructions: usize,
}

#[derive(Serialize)]
struct GlobalStats<'m> {
    name: &'m str,
    linkage: String,
    ty: String,
    constant: bool,
}

#[derive(Serialize)]
struct ModuleStats<'m> {
    functions: Vec<FunctionStats<'m>>,
    globals: Vec<GlobalStats<'m>>,
}

impl<'m> ModuleStats<'m> {
    fn of(module: &'m Module) -> Self {
        let functions = module
            .functions
            .iter()
            .map(|f| FunctionStats {
                name: &f.name,
                linkage: f.linkage.to_string(),
                blocks: f.blocks.len(),
                instructions: f.instruction_count(),
            })
            .collect();
        let globals = module
            .globals
            .iter()
            .map(|g| GlobalStats { name: &g.name, linkage: g.linkage.to_string(), ty: g.ty.to_string(), constant: g.constant })
            .collect();
        ModuleStats { functions, globals }
    }
}

fn print_stats(module: &Module) {
    let mut functions = Table::new();
    functions.load_preset(UTF8_FULL).set_header(vec!["function", "linkage", "blocks", "instructions"]);
    for f in &module.functions {
        functions.add_row(vec![
            Cell::new(&f.name),
            Cell::new(f.linkage),
            Cell::new(f.blocks.len()).set_alignment(CellAlignment::Right),
            Cell::new(f.instruction_count()).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{functions}");

    let mut globals = Table::new();
    globals.load_preset(UTF8_FULL).set_header(vec!["global", "linkage", "type", "constant"]);
    for g in &module.globals {
        globals.add_row(vec![
            Cell::new(&g.name),
            Cell::new(g.linkage),
            Cell::new(&g.ty),
            Cell::new(g.constant),
        ]);
    }
    println!("{globals}");
}
