// Scenario Runner - Load and execute scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/baseline.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/baseline.yaml --seed 1234 --out report.yaml

use desist::{LogSink, SimConfig, Simulation, SimulationReport};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Scenario file format: metadata plus a (partial) simulation config
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    meta: ScenarioMeta,

    /// Anything left out keeps its default
    #[serde(default)]
    config: SimConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
    hypothesis: Option<String>,
}

struct Options {
    seed: Option<u64>,
    out: Option<PathBuf>,
}

fn main() {
    SimpleLogger::new().with_level(LevelFilter::Warn).env().init().unwrap();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml | directory/> [--seed SEED] [--out FILE]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} scenarios/baseline.yaml", args[0]);
        eprintln!("  {} scenarios/", args[0]);
        eprintln!("  {} scenarios/blackhole_20.yaml --seed 7 --out report.yaml", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    let options = parse_options(&args[2..]);

    if path.is_file() {
        let report = run_scenario_file(path, options.seed);
        if let Some(ref out) = options.out {
            write_report(out, &report);
        }
    } else if path.is_dir() {
        if options.out.is_some() {
            eprintln!("--out is only supported for a single scenario file");
            std::process::exit(1);
        }
        run_scenario_directory(path, options.seed);
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    }
}

fn parse_options(args: &[String]) -> Options {
    let mut options = Options { seed: None, out: None };
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter.next().unwrap_or_else(|| {
            eprintln!("Missing value for {}", flag);
            std::process::exit(1);
        });
        match flag.as_str() {
            "--seed" => options.seed = Some(parse_seed(value)),
            "--out" => options.out = Some(PathBuf::from(value)),
            other => {
                eprintln!("Unknown option: {}", other);
                std::process::exit(1);
            }
        }
    }
    options
}

fn run_scenario_directory(dir: &Path, seed: Option<u64>) {
    let mut scenarios = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext == Some("yaml") || ext == Some("yml") {
                scenarios.push(path);
            }
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    let mut rows = Vec::new();
    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!("\n{}/{} Running: {}\n", i + 1, scenarios.len(), scenario_path.display());
        let report = run_scenario_file(scenario_path, seed);
        rows.push((scenario_path.clone(), report));
    }

    println!("\n{:<32} {:>8} {:>10} {:>10} {:>8}", "Scenario", "PDR", "Delivered", "Dropped", "Alive");
    println!("{}", "-".repeat(72));
    for (path, report) in &rows {
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("?");
        println!(
            "{:<32} {:>8.3} {:>10} {:>10} {:>5}/{}",
            name,
            report.packet_delivery_ratio,
            report.packets_delivered,
            report.total_drops(),
            report.nodes_alive,
            report.num_nodes
        );
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
}

fn run_scenario_file(path: &Path, seed: Option<u64>) -> SimulationReport {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    println!("\n╔════════════════════════════════════════════════════════╗");
    match scenario.meta.name {
        Some(ref name) => println!("║  {}", name),
        None => println!(
            "║  Scenario: {}",
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("?")
        ),
    }
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    if let Some(ref hypothesis) = scenario.meta.hypothesis {
        println!("Hypothesis:");
        println!("  {}\n", hypothesis);
    }

    let mut config = scenario.config;
    if let Some(seed) = seed {
        config.seed = seed;
    }

    println!("Configuration:");
    println!("  Horizon: {}", config.horizon);
    println!("  Nodes: {}", config.topology.num_nodes);
    println!("  Area: {} x {}", config.topology.width, config.topology.height);
    println!(
        "  Attackers: {:.0}% blackhole, {:.0}% selfish, {:.0}% rank",
        config.attackers.blackhole * 100.0,
        config.attackers.selfish * 100.0,
        config.attackers.rank_attacker * 100.0
    );
    println!("\nStarting simulation...\n");

    let mut sim = Simulation::new(config).unwrap_or_else(|e| {
        eprintln!("Invalid configuration in {}: {}", path.display(), e);
        std::process::exit(1);
    });
    sim = sim.with_sink(Box::new(LogSink));

    let report = sim.run();
    report.print_summary();

    println!("\n✓ Scenario complete!\n");
    report
}

fn write_report(path: &Path, report: &SimulationReport) {
    let yaml = serde_yaml::to_string(report).unwrap_or_else(|e| {
        eprintln!("Failed to serialize report: {}", e);
        std::process::exit(1);
    });
    fs::write(path, yaml).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path.display(), e);
        std::process::exit(1);
    });
    println!("Report written to {}", path.display());
}

fn parse_seed(value: &str) -> u64 {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.unwrap_or_else(|e| {
        eprintln!("Invalid seed {}: {}", value, e);
        std::process::exit(1);
    })
}
