#![allow(dead_code)]
use std::sync::{Arc, Mutex};

use pila::{InputPort, InterpretError, OutputPort, Vm, VmConfig};

/// What a program did.
pub struct Run {
    pub output: String,
    pub diagnostics: String,
    pub result: Result<(), InterpretError>,
}

/// A machine with in-memory ports, and the buffers behind its outputs.
pub struct Harness {
    pub vm: Vm,
    output: Arc<Mutex<Vec<u8>>>,
    diagnostics: Arc<Mutex<Vec<u8>>>,
}

fn drain(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    let mut buffer = buffer.lock().unwrap();
    let text = String::from_utf8_lossy(&buffer).into_owned();
    buffer.clear();
    text
}

impl Harness {
    pub fn new(config: VmConfig, input: &str) -> Self {
        let (output_port, output) = OutputPort::buffer();
        let (error_port, diagnostics) = OutputPort::buffer();
        let vm = Vm::new(config)
            .with_input(InputPort::text(input))
            .with_output(output_port)
            .with_error(error_port);
        Self {
            vm,
            output,
            diagnostics,
        }
    }

    /// Interprets `source` and collects what was written since the last call.
    pub fn run(&mut self, source: &str) -> Run {
        let result = self.vm.interpret(source);
        Run {
            output: drain(&self.output),
            diagnostics: drain(&self.diagnostics),
            result,
        }
    }
}

pub fn run_with(config: VmConfig, input: &str, source: &str) -> Run {
    Harness::new(config, input).run(source)
}

pub fn run(source: &str) -> Run {
    run_with(VmConfig::default(), "", source)
}
