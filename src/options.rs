use std::{ffi::OsString, path::PathBuf, str::FromStr};

use crate::error::{Error, Result};

/// What the driver prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    Js,
    Ir,
    Analysis,
}

impl AsRef<str> for Emit {
    fn as_ref(&self) -> &str {
        match self {
            Emit::Js => "js",
            Emit::Ir => "ir",
            Emit::Analysis => "analysis",
        }
    }
}

impl FromStr for Emit {
    type Err = &'static str;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_lowercase();
        let s: &str = &s;

        match s {
            "js" | "javascript" => Ok(Emit::Js),
            "ir" => Ok(Emit::Ir),
            "analysis" | "tco" => Ok(Emit::Analysis),
            _ => Err("expected one of js, ir, analysis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    pub width: usize,
    pub color: bool,
    /// Lower qualifying recursive groups to loops.
    pub tco: bool,
    pub emit: Emit,
    /// JSON compilation unit; stdin when absent.
    pub input: Option<PathBuf>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CodegenOptions {
    pub fn new() -> Self {
        CodegenOptions {
            width: 80,
            color: false,
            tco: true,
            emit: Emit::Js,
            input: None,
        }
    }

    pub fn set_tco(&mut self, tco: bool) {
        self.tco = tco;
    }

    pub fn set_emit(&mut self, emit: Emit) {
        self.emit = emit;
    }

    pub fn parse() -> Result<Self> {
        parse()
    }
}

pub fn parse() -> Result<CodegenOptions> {
    let mut args = pico_args::Arguments::from_env();

    if args.contains(["-h", "--help"]) {
        println!("Usage: tailc [options] [input.json]");
        println!("Options:");
        println!("  -h, --help: Print this help message");
        println!("  --emit <js|ir|analysis>: What to print (default: js)");
        println!("  --width <columns>: Line width of the IR and analysis dumps (default: 80)");
        println!("  --color: Colorize output");
        println!("  --no-tco: Keep recursive calls instead of lowering loops");
        std::process::exit(0);
    }

    parse_args(args)
}

/// Options from an explicit argument list, program name excluded.
pub fn parse_from(args: Vec<OsString>) -> Result<CodegenOptions> {
    parse_args(pico_args::Arguments::from_vec(args))
}

fn parse_args(mut args: pico_args::Arguments) -> Result<CodegenOptions> {
    let mut options = CodegenOptions::new();

    if let Some(emit) = args.opt_value_from_str::<_, String>("--emit")? {
        let emit = emit.parse::<Emit>().map_err(|_| Error::InvalidOption {
            flag: "--emit",
            value: emit,
        })?;
        options.set_emit(emit);
    }

    if let Some(width) = args.opt_value_from_str::<_, usize>("--width")? {
        options.width = width;
    }

    options.color = args.contains("--color");
    options.set_tco(!args.contains("--no-tco"));
    options.input = args.opt_free_from_str::<PathBuf>()?;

    let rest = args.finish();
    if !rest.is_empty() {
        return Err(Error::UnexpectedArguments(
            rest.into_iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        ));
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn defaults_lower_loops_to_javascript() {
        let options = parse_from(vec![]).unwrap();
        assert_eq!(options, CodegenOptions::default());
        assert!(options.tco);
        assert_eq!(options.emit, Emit::Js);
    }

    #[test]
    fn flags_and_input_are_read() {
        let options = parse_from(args(&["--emit", "analysis", "--no-tco", "--width", "100", "unit.json"])).unwrap();
        assert_eq!(options.emit, Emit::Analysis);
        assert!(!options.tco);
        assert_eq!(options.width, 100);
        assert_eq!(options.input, Some(PathBuf::from("unit.json")));
    }

    #[test]
    fn unknown_emit_target_is_rejected() {
        let err = parse_from(args(&["--emit", "wasm"])).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { flag: "--emit", .. }));
    }

    #[test]
    fn leftover_arguments_are_rejected() {
        let err = parse_from(args(&["a.json", "b.json"])).unwrap_err();
        assert!(matches!(err, Error::UnexpectedArguments(rest) if rest == vec!["b.json".to_string()]));
    }
}
