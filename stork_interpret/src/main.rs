use log::debug;
use std::{
    env, fs,
    io::{self, Write},
    process,
};
use stork_interpret::{host::Sandbox, interpret::Interpreter, run, types::Value};

// Exit codes for a failed or unreadable program, and for bad invocation
const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 64;

fn main() {
    pretty_env_logger::init();
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() > 1 {
        eprintln!("Usage: stork [FILE]");
        process::exit(EXIT_USAGE);
    }

    let mut interpreter = match Interpreter::with_prelude(Box::new(Sandbox::new())) {
        Ok(interpreter) => interpreter,
        Err(errors) => {
            errors.iter().for_each(|e| eprintln!("{e}"));
            process::exit(EXIT_FAILURE);
        }
    };
    if args.is_empty() {
        run_repl(&mut interpreter);
    } else {
        run_file(&args[0], &mut interpreter);
    }
}

fn run_repl(interpreter: &mut Interpreter) {
    let (stdin, mut stdout) = (io::stdin(), io::stdout());
    loop {
        let mut line = String::default();
        print!(">>> ");
        if stdout.flush().is_err() {
            break;
        }
        // If zero bytes are read, then exit (usually triggered by Ctrl-D)
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => (),
        }
        match run(&line, interpreter) {
            Ok(values) => {
                if let Some(value) = values.last().filter(|v| **v != Value::Null) {
                    println!("{}", value.repr());
                }
            }
            Err(errors) => errors.iter().for_each(|e| eprintln!("{e}")),
        }
    }
}

fn run_file(file_path: &str, interpreter: &mut Interpreter) {
    let source = match fs::read_to_string(file_path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read {file_path}: {e}");
            process::exit(EXIT_FAILURE);
        }
    };
    debug!("Running {file_path}");
    if let Err(errors) = run(&source, interpreter) {
        errors.iter().for_each(|e| eprintln!("{e}"));
        process::exit(EXIT_FAILURE);
    }
}
