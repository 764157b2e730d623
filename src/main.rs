use std::path::PathBuf;
use std::{env, process::ExitCode};

use magio::error::MError;
use magio::format::TextFormat;
use magio::magazine::Magazine;

fn run(input: PathBuf, output: Option<PathBuf>) -> Result<(), MError> {
    let mut magazine = Magazine::new(input)?;
    magazine.open()?;
    magazine.load()?;
    magazine.close();

    match output {
        Some(out) if out.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml")) => {
            magazine.write_as(out, TextFormat::XML)
        }
        Some(out) => magazine.write_data(out),
        None => {
            print!("{magazine}");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let mut args = env::args_os().skip(1).map(PathBuf::from);
    let Some(input) = args.next() else {
        eprintln!("usage: magio <input> [output]");
        return ExitCode::FAILURE;
    };

    match run(input, args.next()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
