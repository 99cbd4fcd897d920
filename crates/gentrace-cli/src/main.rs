use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use gentrace_core::{
    init_tracing_with, DepthPolicy, FileTracer, GentraceConfig, NameFormat, SpanStrategy, Tracer,
};
use tracing::info;

fn build_cli() -> Command {
    Command::new("gentrace")
        .version(gentrace_core::VERSION)
        .about("Instrument effect generator programs with stack frames and tracing spans")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("JSON configuration file")
                .global(true),
        )
        .arg(
            Arg::new("spans")
                .long("spans")
                .help("Enable span instrumentation")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-source-trace")
                .long("no-source-trace")
                .help("Disable stack frame instrumentation")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("pure")
                .long("pure")
                .help("Annotate pure library calls")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("name-format")
                .long("name-format")
                .value_name("FORMAT")
                .help("Span name format")
                .value_parser(["function", "location", "full"])
                .global(true),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("N")
                .help("Only instrument spans up to this nesting depth")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("transform")
                .about("Transform a single file")
                .arg(Arg::new("file").value_name("FILE").required(true).index(1))
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("PATH")
                        .help("Write the result here instead of stdout"),
                )
                .arg(
                    Arg::new("map")
                        .long("map")
                        .help("Write a source map next to the output file")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("trace")
                .about("Transform a source tree into an output directory")
                .arg(Arg::new("source").value_name("SRC_DIR").required(true).index(1))
                .arg(Arg::new("output").value_name("OUT_DIR").required(true).index(2))
                .arg(
                    Arg::new("map")
                        .long("map")
                        .help("Write .map files for transformed sources")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("config").about("Print the resolved configuration as JSON"))
}

/// Configuration file (or defaults) with command-line overrides applied
fn resolve_config(matches: &ArgMatches) -> Result<GentraceConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => GentraceConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => GentraceConfig::default(),
    };

    let options = &mut config.options;
    if matches.get_flag("spans") {
        options.spans.enabled = true;
    }
    if matches.get_flag("no-source-trace") {
        options.source_trace = false;
    }
    if matches.get_flag("pure") {
        options.pure_calls.enabled = true;
    }
    if let Some(format) = matches.get_one::<String>("name-format") {
        options.spans.name_format = match format.as_str() {
            "location" => NameFormat::Location,
            "full" => NameFormat::Full,
            _ => NameFormat::Function,
        };
    }
    if let Some(depth) = matches.get_one::<usize>("max-depth").copied() {
        match &mut options.spans.strategy {
            Some(SpanStrategy::Depth(policy)) => policy.global_max_depth = Some(depth),
            Some(SpanStrategy::Override(_)) => {
                bail!("--max-depth cannot be combined with an override span strategy")
            }
            None => {
                options.spans.strategy = Some(SpanStrategy::Depth(DepthPolicy {
                    global_max_depth: Some(depth),
                    ..Default::default()
                }))
            }
        }
    }

    Ok(config)
}

fn run_transform(mut config: GentraceConfig, matches: &ArgMatches) -> Result<()> {
    let file = matches
        .get_one::<String>("file")
        .context("Missing input file")?;
    let out = matches.get_one::<String>("out").map(PathBuf::from);
    let write_map = matches.get_flag("map");
    config.options.source_maps = write_map && out.is_some();

    let source = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    let tracer = Tracer::new(config.options)?;
    let output = tracer.transform(&source, &file.replace('\\', "/"))?;
    info!(file = %file, transformed = output.transformed, "transform finished");

    match out {
        Some(path) => {
            write_file(&path, &output.code)?;
            if let (true, Some(map)) = (write_map, &output.map) {
                let mut map_path = path.into_os_string();
                map_path.push(".map");
                write_file(Path::new(&map_path), map)?;
            }
        }
        None => print!("{}", output.code),
    }

    Ok(())
}

fn run_trace(mut config: GentraceConfig, matches: &ArgMatches) -> Result<()> {
    let source = matches
        .get_one::<String>("source")
        .context("Missing source directory")?;
    let output = matches
        .get_one::<String>("output")
        .context("Missing output directory")?;
    let write_maps = matches.get_flag("map");
    config.options.source_maps = write_maps;

    let tracer = FileTracer::from_config(&config)?.write_maps(write_maps);
    let summary = tracer
        .transform_directory(source, output)
        .with_context(|| format!("Failed to trace {} into {}", source, output))?;

    println!(
        "Processed {} file(s): {} transformed, {} copied",
        summary.files_processed, summary.files_transformed, summary.files_copied
    );
    for stat in &summary.rule_stats {
        info!(
            rule = %stat.rule_name,
            applications = stat.applications,
            transformations = stat.transformations,
            success_rate = stat.success_rate(),
            time_us = stat.total_time_us,
            "rule totals"
        );
    }
    for error in &summary.errors {
        eprintln!("{}", error);
    }
    if !summary.success() {
        bail!("{} file(s) failed", summary.errors.len());
    }

    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let Some((command, sub)) = matches.subcommand() else {
        bail!("A subcommand is required");
    };

    init_tracing_with(if sub.get_flag("verbose") {
        "gentrace_core=debug"
    } else {
        "gentrace_core=warn"
    });

    let config = resolve_config(sub)?;

    match command {
        "transform" => run_transform(config, sub),
        "trace" => run_trace(config, sub),
        "config" => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        other => bail!("Unknown subcommand: {}", other),
    }
}
