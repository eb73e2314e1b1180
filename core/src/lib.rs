pub mod codegen;
pub mod error;
pub mod ir;
pub mod location;
pub mod options;
pub mod program;

use std::fs;

pub use codegen::{CodeGen, Repr, TypedValue};
pub use error::{BasaltErrorExt, CodegenError, CodegenErrorKind, Level, Result};
pub use ir::{run_main, run_main_with_output, Module};
pub use location::Location;
pub use options::CodegenOptions;
pub use program::{Program, ProgramBuilder};

pub fn generate_error_report<E: BasaltErrorExt + ?Sized>(error: &E) -> String {
    let level = error.level();
    let location = match error.location() {
        Some(loc) => loc.to_string(),
        None => "unknown location".to_string(),
    };
    let message = error.message();

    format!("BASALT | {} | {} | {}", level, location, message)
}

/// Generate the module for a typed program and verify it.
///
/// On failure the partially built module is dumped when the options ask
/// for it. An error location without a file is given the program's.
pub fn generate_module(program: &Program, options: &CodegenOptions) -> Result<Module> {
    let file = options.filename.as_deref().or(program.filename.as_deref());
    program.validate().map_err(|e| e.in_file(file))?;
    let mut cg = CodeGen::new(program, options)?;
    if let Err(e) = cg.generate() {
        if options.dump_on_error {
            dump_module(cg.module(), options);
        }
        return Err(e.in_file(file));
    }
    let module = cg.into_module();
    if options.verify {
        if let Err(e) = ir::verify_module(&module) {
            if options.dump_on_error {
                dump_module(&module, options);
            }
            return Err(e);
        }
    }
    log::info!(
        "generated {} function(s), {} global(s)",
        module.functions.len(),
        module.globals.len()
    );
    Ok(module)
}

fn dump_module(module: &Module, options: &CodegenOptions) {
    let text = module.to_string();
    match &options.dump_dir {
        Some(dir) => {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
            let path = dir.join(format!("basalt-{}.ll", stamp));
            match fs::create_dir_all(dir).and_then(|_| fs::write(&path, &text)) {
                Ok(()) => log::error!("partial module written to {}", path.display()),
                Err(e) => log::error!("could not write module dump to {}: {}", path.display(), e),
            }
        }
        None => log::error!("partial module:\n{}", text),
    }
}
