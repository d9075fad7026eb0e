use anyhow::{Context, Result, bail};
use coil_bytecode::{CompiledUnit, UnitFlags, UnitReader};
use coil_instrumenter::{Instrumenter, InstrumenterSettings};
use std::{
    fs,
    path::{Path, PathBuf},
};

fn help_string() -> String {
    format!(
        "{version}

USAGE:
    coil [FLAGS] <command> <input> [OPTIONS]

COMMANDS:
    instrument   Instruments the unit's eligible methods so that they can suspend and resume
    dump         Prints the unit's methods and instructions

FLAGS:
    -v, --version            Prints version information
    -h, --help               Prints help information

INSTRUMENT OPTIONS:
    -o, --output PATH        Where to write the instrumented unit (default: overwrite <input>)
    -f, --force              Process the unit even if it has already been instrumented,
                             instrumenting any eligible methods that were added since

ARGS:
    <input>      Path to a serialized unit
",
        version = version_string()
    )
}

fn version_string() -> String {
    format!("Coil {}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug)]
enum Command {
    Instrument {
        input: PathBuf,
        output: Option<PathBuf>,
        force: bool,
    },
    Dump {
        input: PathBuf,
    },
}

#[derive(Debug, Default)]
struct CoilArgs {
    help: bool,
    version: bool,
    command: Option<Command>,
}

fn parse_arguments() -> Result<CoilArgs> {
    let mut args = pico_args::Arguments::from_env();

    let help = args.contains(["-h", "--help"]);
    let version = args.contains(["-v", "--version"]);
    let force = args.contains(["-f", "--force"]);
    let output: Option<PathBuf> = args.opt_value_from_str(["-o", "--output"])?;

    let command = match args.subcommand()?.as_deref() {
        Some("instrument") => Some(Command::Instrument {
            input: args.free_from_str()?,
            output,
            force,
        }),
        Some("dump") => {
            if output.is_some() || force {
                bail!("'dump' doesn't accept --output or --force");
            }
            Some(Command::Dump {
                input: args.free_from_str()?,
            })
        }
        Some(other) => bail!("Unknown command: {other}"),
        None => None,
    };

    let remaining = args.finish();
    if let Some(unused) = remaining.first() {
        bail!("Unsupported argument: {}", unused.to_string_lossy());
    }

    Ok(CoilArgs {
        help,
        version,
        command,
    })
}

fn main() -> Result<()> {
    let args = match parse_arguments() {
        Ok(args) => args,
        Err(error) => {
            bail!("{}\n\n{}", help_string(), error);
        }
    };

    if args.help {
        println!("{}", help_string());
        return Ok(());
    }

    if args.version {
        println!("{}", version_string());
        return Ok(());
    }

    match args.command {
        Some(Command::Instrument {
            input,
            output,
            force,
        }) => instrument(&input, output.as_deref().unwrap_or(&input), force),
        Some(Command::Dump { input }) => dump(&input),
        None => bail!("{}\n\nMissing command", help_string()),
    }
}

fn instrument(input: &Path, output: &Path, force: bool) -> Result<()> {
    let bytes = read_input(input)?;
    let mut unit = read_unit(input, &bytes)?;

    if unit.flags.contains(UnitFlags::INSTRUMENTED) && !force {
        println!(
            "'{}' has already been instrumented, use --force to instrument it again",
            unit.name
        );
        return Ok(());
    }

    let instrumenter = Instrumenter::with_settings(InstrumenterSettings {
        reinstrument: force,
        ..Default::default()
    });
    let count = instrumenter
        .instrument_unit(&mut unit)
        .with_context(|| format!("Failed to instrument '{}'", input.display()))?;
    let instrumented = instrumenter
        .write(&unit)
        .with_context(|| format!("Failed to verify the instrumented '{}'", input.display()))?;

    fs::write(output, &instrumented)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;

    println!("Instrumented {count} method(s) in '{}'", unit.name);

    Ok(())
}

fn dump(input: &Path) -> Result<()> {
    let bytes = read_input(input)?;
    let unit = read_unit(input, &bytes)?;

    print!("{unit}");

    Ok(())
}

fn read_input(input: &Path) -> Result<Vec<u8>> {
    fs::read(input).with_context(|| format!("Failed to read '{}'", input.display()))
}

fn read_unit(input: &Path, bytes: &[u8]) -> Result<CompiledUnit> {
    UnitReader::read(bytes).with_context(|| format!("Failed to parse '{}'", input.display()))
}
