use std::env;
use stork_interpret::{
    host::{Output, Sandbox},
    interpret::Interpreter,
    run,
};
use wasm_bindgen::prelude::*;

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen]
pub fn init() -> String {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    format!(
        "Stork v{} on {} ({}), Copyright (c) {}",
        env!("CARGO_PKG_VERSION"),
        env::consts::OS,
        env::consts::ARCH,
        env!("CARGO_PKG_AUTHORS"),
    )
}

/// A persistent session. `println!` cannot be used with wasm, so
/// the sandbox collects printed lines and every run hands back the
/// lines it produced.
#[wasm_bindgen]
pub struct World {
    interpreter: Interpreter,
    output: Output,
}

#[wasm_bindgen]
impl World {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<World, String> {
        let (sandbox, output) = Sandbox::captured();
        let interpreter = Interpreter::with_prelude(Box::new(sandbox)).map_err(join_errors)?;
        Ok(Self {
            interpreter,
            output,
        })
    }

    pub fn run(&mut self, src: &str) -> Result<String, String> {
        // Drop anything left over from an earlier failed run
        self.output.take();
        match run(src, &mut self.interpreter) {
            Ok(_) => Ok(self.output.take().join("\n")),
            Err(errors) => Err(join_errors(errors)),
        }
    }
}

fn join_errors<E: ToString>(errors: Vec<E>) -> String {
    errors
        .into_iter()
        .fold(String::default(), |a, b| a + &b.to_string() + "\n")
        .trim()
        .to_string()
}
