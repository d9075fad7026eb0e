use crate::{Error, MethodTransformer, Result};
use coil_bytecode::{
    AccessFlags, Analyzer, CompiledUnit, UnitFlags, UnitReader, UnitWriter, check_stack_map,
    continuation,
};
use tracing::debug;

/// Settings used to control the behaviour of the [Instrumenter]
#[derive(Clone, Debug)]
pub struct InstrumenterSettings {
    /// Whether or not units that are already flagged as instrumented should be processed again
    ///
    /// Methods that were instrumented by an earlier pass are always left unchanged, so processing
    /// a unit again only instruments eligible methods that have been added since.
    ///
    /// Default: `false`
    pub reinstrument: bool,
    /// Whether or not the serialized output should be read back and verified before it's returned
    ///
    /// Transformed methods are always analyzed before they're committed, this additionally checks
    /// the written bytes, stack maps included.
    ///
    /// Default: `true`
    pub verify_output: bool,
}

impl Default for InstrumenterSettings {
    fn default() -> Self {
        Self {
            reinstrument: false,
            verify_output: true,
        }
    }
}

/// Instruments the eligible methods of compiled units
///
/// A method is eligible when its first parameter is the continuation capability.
/// Instrumentation either succeeds for every eligible method in a unit, or the unit is left
/// unchanged and an error is returned.
#[derive(Clone, Debug, Default)]
pub struct Instrumenter {
    settings: InstrumenterSettings,
}

impl Instrumenter {
    /// Creates an instrumenter with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an instrumenter with the given settings
    pub fn with_settings(settings: InstrumenterSettings) -> Self {
        Self { settings }
    }

    /// Parses a serialized unit, instruments it, and returns the serialized result
    pub fn instrument(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut unit = UnitReader::read(bytes)?;
        self.instrument_unit(&mut unit)?;
        self.write(&unit)
    }

    /// Serializes a unit, verifying the output if [InstrumenterSettings::verify_output] is set
    pub fn write(&self, unit: &CompiledUnit) -> Result<Vec<u8>> {
        let output = UnitWriter::write(unit);

        if self.settings.verify_output {
            verify(&output)?;
        }

        Ok(output)
    }

    /// Instruments a unit in place, returning the number of instrumented methods
    ///
    /// Abstract and native methods have no body and are skipped, as are methods that have already
    /// been instrumented.
    pub fn instrument_unit(&self, unit: &mut CompiledUnit) -> Result<usize> {
        if unit.flags.contains(UnitFlags::INSTRUMENTED) && !self.settings.reinstrument {
            debug!(unit = %unit.name, "skipping, already instrumented");
            return Ok(0);
        }

        let mut transformed = Vec::new();

        for (index, method) in unit.methods.iter().enumerate() {
            if !continuation::is_eligible(&method.descriptor) {
                continue;
            }
            if method.access.has_no_body() {
                debug!(unit = %unit.name, method = %method.signature(), "skipping, no body");
                continue;
            }
            if method.access.is_instrumented() {
                debug!(
                    unit = %unit.name,
                    method = %method.signature(),
                    "skipping, already instrumented"
                );
                continue;
            }

            debug!(unit = %unit.name, method = %method.signature(), "instrumenting");
            let mut instrumented = MethodTransformer::transform(&unit.name, method)?;
            instrumented.access |= AccessFlags::INSTRUMENTED;
            transformed.push((index, instrumented));
        }

        let count = transformed.len();
        if count > 0 {
            for (index, method) in transformed {
                unit.methods[index] = method;
            }
            unit.flags |= UnitFlags::INSTRUMENTED;
        }

        debug!(unit = %unit.name, methods = count, "instrumented");
        Ok(count)
    }
}

fn verify(bytes: &[u8]) -> Result<()> {
    let unit = UnitReader::read(bytes)?;

    for method in unit.methods.iter().filter(|method| !method.access.has_no_body()) {
        let to_error = |source| Error::Analysis {
            method: method.signature(),
            transformed: method.access.is_instrumented(),
            source,
        };
        let frames = Analyzer::analyze(&unit.name, method).map_err(to_error)?;
        check_stack_map(method, &frames).map_err(to_error)?;
    }

    Ok(())
}
