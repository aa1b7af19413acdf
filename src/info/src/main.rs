use std::path::Path;

use anyhow::{self as any, Context};
use clap::{App, Arg};
use log::debug;

fn print_interface(label: &str, vars: &[spv::InterfaceVariable]) {
    for var in vars.iter() {
        let slot = match (var.location, var.built_in()) {
            (Some(location), _) => format!("location {}", location),
            (None, Some(built_in)) => format!("{:?}", built_in),
            (None, None) => "-".to_owned(),
        };
        println!(
            "    {} %{} {:<12} {}",
            label, var.variable, slot, var.name.as_deref().unwrap_or(""),
        );
    }
}

fn print_verbose(module: &spv::Module) {
    let (major, minor) = module.version();
    println!();
    println!("SPIR-V version: {}.{}", major, minor);
    println!("Generator: {:#010x}", module.generator());
    for (raw, cap) in module.capabilities() {
        match cap {
            Some(cap) => println!("Capability: {:?}", cap),
            None => println!("Capability: {}", raw),
        }
    }
    for ext in module.extensions() {
        println!("Extension: {}", ext);
    }
    for entry in module.enumerate_entry_points() {
        println!(
            "Entry point \"{}\": {}",
            entry.name, entry.stage.name().unwrap_or("Unknown"),
        );
        if let Some([x, y, z]) = entry.local_size {
            println!("    local size {} x {} x {}", x, y, z);
        }
        print_interface("in ", &entry.inputs);
        print_interface("out", &entry.outputs);
    }
    for block in module.enumerate_push_constants() {
        println!(
            "Push constants \"{}\": offset {}, size {}",
            block.name.as_deref().unwrap_or(""), block.offset, block.size,
        );
        for member in block.members.iter() {
            println!(
                "    {:>4} {:>4} {}",
                member.offset, member.size, member.name.as_deref().unwrap_or(""),
            );
        }
    }
    for diag in module.diagnostics() {
        println!("warning: {}", diag);
    }
}

fn print_module(module: &spv::Module, verbose: bool) {
    println!("Entry point: {}", module.entry_point_name().unwrap_or("(none)"));
    println!("Source language: {}", module.source_language());
    println!("Stage: {}", module.shader_stage().name().unwrap_or("Unknown"));
    println!();
    println!("{:>4} {:>8} {:>6}  {:<22} {}", "Set", "Binding", "Count", "Type", "Name");
    for binding in module.enumerate_descriptor_bindings() {
        let count = if binding.is_unbounded() {
            "[]".to_owned()
        } else {
            binding.count.to_string()
        };
        println!(
            "{:>4} {:>8} {:>6}  {:<22} {}",
            binding.set, binding.binding, count,
            binding.descriptor_type.to_string(), binding.name(),
        );
    }
    if verbose {
        print_verbose(module);
    }
}

fn run(path: &Path, verbose: bool) -> any::Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    debug!("read {} bytes from {}", bytes.len(), path.display());
    let module = spv::parse_bytes(&bytes)
        .with_context(|| format!("failed to parse `{}`", path.display()))?;
    print_module(&module, verbose);
    Ok(())
}

fn main() -> any::Result<()> {
    env_logger::init();
    let matches = App::new("spirv-info")
        .about("Prints the reflection data of a SPIR-V module")
        .arg(Arg::with_name("SHADER")
            .help("Path to a SPIR-V binary")
            .required(true)
            .index(1))
        .arg(Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .help("Also print entry points, interfaces, push constants and diagnostics"))
        .get_matches();

    let path = Path::new(matches.value_of_os("SHADER").unwrap_or_default());
    run(path, matches.is_present("verbose"))
}
