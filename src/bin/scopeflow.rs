//! scopeflow driver: lower a statement script and print the IR.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use bumpalo::Bump;
use clap::Parser;
use log::info;

use scopeflow::core::{CompilationSession, DiagnosticSink};
use scopeflow::lower_script;
use scopeflow::script::check::{TestRunner, TestSpec};
use scopeflow::script::parse;

#[derive(Parser)]
#[command(name = "scopeflow", version, about = "Lower goto/break/continue through cleanup scopes")]
struct Cli {
    /// Script to lower; reads stdin when omitted
    input: Option<PathBuf>,

    /// Only print this function
    #[arg(long)]
    function: Option<String>,

    /// Validate the CHECK directives embedded in the script
    #[arg(long)]
    check: bool,

    /// Print lowering statistics to stderr
    #[arg(long)]
    stats: bool,

    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn read_input(input: Option<&PathBuf>) -> io::Result<String> {
    match input {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let text = match read_input(cli.input.as_ref()) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: failed to read input: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        let spec = TestSpec::parse(&text);
        return match TestRunner::new(cli.verbose > 0).run_test(&spec) {
            Ok(()) => {
                println!("PASS");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("FAIL: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let script = match parse(&text) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(name) = &cli.function {
        if script.function(name).is_none() {
            eprintln!("error: no function named '{}'", name);
            return ExitCode::FAILURE;
        }
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut sink = DiagnosticSink::new();
    let result = lower_script(&session, &script, &mut sink);

    if cli.stats {
        eprint!("{}", session.stats());
    }

    match result {
        Ok(functions) => {
            info!("lowered {} function(s)", functions.len());
            for func in functions
                .iter()
                .filter(|f| cli.function.as_deref().map_or(true, |name| f.name == name))
            {
                print!("{}", func);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if sink.error_count() > 0 {
                eprint!("{}", sink.render());
            } else {
                eprintln!("internal error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}
