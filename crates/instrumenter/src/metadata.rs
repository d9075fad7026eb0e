use crate::{Error, Result};
use coil_bytecode::{AnalysisErrorKind, Analyzer, Method, compute_max_stack, compute_stack_map};
use tracing::trace;

/// Recomputes a transformed method's max stack and stack map
///
/// The method is analyzed with an unlimited stack, the same analysis that the runtime's loader
/// will apply, so a failure here means the instrumented code wouldn't load.
pub fn recompute(owner: &str, method: &mut Method) -> Result<()> {
    method.max_stack = u16::MAX;

    let frames = Analyzer::analyze(owner, method).map_err(|source| {
        if matches!(source.kind, AnalysisErrorKind::StackOverflow { .. }) {
            Error::LimitExceeded {
                method: method.signature(),
                limit: "stack slots",
                needed: u16::MAX as usize + 1,
            }
        } else {
            Error::Analysis {
                method: method.signature(),
                transformed: true,
                source,
            }
        }
    })?;

    // The analysis succeeded with a limit of u16::MAX
    method.max_stack = compute_max_stack(&frames) as u16;
    method.stack_map = compute_stack_map(&method.instructions, &frames);

    trace!(
        method = %method.signature(),
        max_stack = method.max_stack,
        max_locals = method.max_locals,
        stack_map_entries = method.stack_map.len(),
        "recomputed metadata"
    );

    Ok(())
}
