use coil_bytecode::{Analyzer, CompiledUnit, Method};
use std::fmt::Write;

/// Renders a unit's methods and instructions, for printing when a test fails
pub fn unit_dump(unit: &CompiledUnit) -> String {
    let mut result = String::new();
    write!(
        result,
        "Unit\n----\n{}",
        unit.instructions_as_string()
    )
    .ok();
    result
}

/// Renders a method's instructions alongside the frames computed by the analyzer
pub fn method_frames(owner: &str, method: &Method) -> String {
    let mut result = format!("{}\n", method.signature());

    match Analyzer::analyze(owner, method) {
        Ok(frames) => {
            for (position, (instruction, frame)) in
                method.instructions.iter().zip(frames.iter()).enumerate()
            {
                match frame {
                    Some(frame) => writeln!(result, "{position}\t{frame}").ok(),
                    None => writeln!(result, "{position}\t(unreachable)").ok(),
                };
                writeln!(result, "\t{instruction}").ok();
            }
        }
        Err(error) => {
            writeln!(result, "analysis failed: {error}").ok();
            for (position, instruction) in method.instructions.iter().enumerate() {
                writeln!(result, "{position}\t{instruction}").ok();
            }
        }
    }

    result
}
