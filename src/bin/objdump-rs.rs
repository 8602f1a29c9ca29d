//! Thin CLI driver: reads an ELF file, disassembles its executable sections,
//! and prints the result. Carries no parsing or decoding logic of its own —
//! that all lives in the library.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use x64dis::{disassemble_section, DisasOptions, Elf};

#[derive(Parser)]
#[command(name = "objdump-rs", version, about = "Disassemble ELF x86-64 binaries in Intel syntax")]
struct Args {
    /// Disassemble executable sections.
    #[arg(short = 'd', long = "disassemble")]
    disassemble: bool,

    /// File to read.
    file: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();

    match run(&args) {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::warn!("objdump-rs: {e}");
            eprintln!("objdump-rs: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> x64dis::Result<Vec<String>> {
    let bytes = fs::read(&args.file)?;
    let elf = Elf::parse(&bytes)?;

    if !args.disassemble {
        return Ok(vec![format!("{:?}", elf.header)]);
    }

    let options = DisasOptions::default();
    let mut lines = Vec::new();
    for section_index in elf.executable_sections().collect::<Vec<_>>() {
        let sh = &elf.section_headers[section_index];
        lines.push(format!("Disassembly of section {}:", sh.name));
        lines.push(String::new());
        lines.extend(disassemble_section(&elf, section_index, &options)?);
    }
    Ok(lines)
}
