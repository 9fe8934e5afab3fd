use std::io::{Read, Write};

use tailc::prelude::*;
use termcolor::{ColorChoice, StandardStream, WriteColor};

fn main() {
    env_logger::init();

    let options = match CodegenOptions::parse() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&options) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn read_unit(options: &CodegenOptions) -> Result<CompilationUnit> {
    let source = match &options.input {
        Some(path) => std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?,
        None => {
            let mut source = String::new();
            std::io::stdin().read_to_string(&mut source)?;
            source
        }
    };
    Ok(serde_json::from_str(&source)?)
}

fn run(options: &CodegenOptions) -> Result<()> {
    let unit = read_unit(options)?;
    log::info!(
        "compiling {} ({} binding groups)",
        unit.name,
        unit.groups.len()
    );

    let choice = if options.color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut out = StandardStream::stdout(choice);

    match options.emit {
        Emit::Js => {
            codegen_module(&unit, options).pretty_print(options.width, &mut out)?;
            writeln!(out)?;
        }
        Emit::Ir => {
            for (ident, expr) in unit.groups.iter().flat_map(|group| group.bindings.iter()) {
                print_binding(&mut out, ident, expr, options.width)?;
            }
        }
        Emit::Analysis => {
            for group in analyze_module(&unit) {
                if group.recursive {
                    writeln!(out, "; recursive group, loop: {}", group.is_tco_loop)?;
                }
                for (ident, expr) in &group.bindings {
                    print_binding(&mut out, ident, expr, options.width)?;
                }
            }
        }
    }

    out.reset()?;
    Ok(())
}

fn print_binding(out: &mut StandardStream, ident: &Ident, expr: &impl Pretty, width: usize) -> Result<()> {
    write!(out, "{} = ", ident)?;
    expr.pretty_print(width, &mut *out)?;
    writeln!(out)?;
    Ok(())
}
