//! gen — the message description compiler.
//!
//! Usage:
//! ```text
//! gen [--language cpp|python] [files...]
//! ```
//!
//! With no files, reads one description from standard input and writes
//! generated code to standard output. With files, writes
//! `<basename>.cpp` or `<basename>.py` next to each input. Parse errors
//! are printed with file, line and column; the exit code is non-zero if
//! any input failed.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use routio::generator::{emit_cpp, emit_python, parse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Cpp,
    Python,
}

impl Language {
    fn extension(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "py",
        }
    }
}

fn output_path(input: &Path, language: Language) -> PathBuf {
    input.with_extension(language.extension())
}

fn compile(text: &str, file: &str, output_name: &str, language: Language) -> Result<String, String> {
    let description = parse(text, file).map_err(|e| e.to_string())?;
    Ok(match language {
        Language::Cpp => emit_cpp(&description, output_name),
        Language::Python => emit_python(&description),
    })
}

fn run() -> Result<(), String> {
    let mut language = Language::Cpp;
    let mut inputs: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--language" {
            let value = args.next().ok_or("--language requires a value")?;
            language = match value.as_str() {
                "cpp" => Language::Cpp,
                "python" => Language::Python,
                other => return Err(format!("Unknown output language: {other}")),
            };
        } else {
            inputs.push(arg);
        }
    }

    if inputs.is_empty() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("failed to read stdin: {e}"))?;

        let code = compile(&text, "input", "", language)?;
        print!("{code}");
        return Ok(());
    }

    for input in &inputs {
        let text = std::fs::read_to_string(input)
            .map_err(|e| format!("Failed to open input file: {input}: {e}"))?;

        let out_path = output_path(Path::new(input), language);
        let out_name = out_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let code = compile(&text, input, &out_name, language)?;

        std::fs::write(&out_path, code)
            .map_err(|e| format!("Failed to write output file: {}: {e}", out_path.display()))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
