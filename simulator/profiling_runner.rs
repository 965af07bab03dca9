// Profiling Runner - Scenario runner with timing instrumentation
//
// Usage:
//   cargo run --bin profiling_runner --release scenarios/baseline.yaml

use desist::{SimConfig, Simulation};
use std::env;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

fn main() {
    std::env::set_var("RUST_LOG", "error");
    let _ = simple_logger::init_with_env();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scenario.yaml>", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} scenarios/baseline.yaml", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  PROFILING RUNNER                                      ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let total_start = Instant::now();

    // Time: Loading YAML
    let load_start = Instant::now();
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let load_time = load_start.elapsed();
    println!("  ✓ File read: {:?}", load_time);

    // Time: Parsing YAML
    let parse_start = Instant::now();

    #[derive(Debug, serde::Deserialize)]
    struct ScenarioFile {
        #[serde(default)]
        config: SimConfig,
    }

    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let parse_time = parse_start.elapsed();
    println!("  ✓ YAML parsed: {:?}", parse_time);

    // Time: Topology, roles and node setup
    let setup_start = Instant::now();
    let mut sim = Simulation::new(scenario.config).unwrap_or_else(|e| {
        eprintln!("Invalid configuration in {}: {}", path.display(), e);
        std::process::exit(1);
    });
    let setup_time = setup_start.elapsed();
    println!("  ✓ Simulation built: {:?}", setup_time);

    println!("\nConfiguration:");
    println!("  Horizon: {}", sim.config().horizon);
    println!("  Nodes: {}", sim.topology().len());
    println!("  Average degree: {:.1}", sim.topology().average_degree());

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SIMULATION                                            ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    let sim_start = Instant::now();
    let report = sim.run();
    let sim_time = sim_start.elapsed();

    report.print_summary();

    let total_time = total_start.elapsed();

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  PROFILING RESULTS                                     ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    println!("Time Breakdown:");
    print_timing("  File I/O", load_time, total_time);
    print_timing("  YAML Parsing", parse_time, total_time);
    print_timing("  Setup", setup_time, total_time);
    print_timing("  Simulation", sim_time, total_time);
    println!("  ─────────────────────────────────────────");
    println!("  Total:           {:>10.3?}  (100.0%)", total_time);

    let transmissions: u64 = report.transmissions.values().sum();
    let decisions =
        report.decisions.forwarding + report.decisions.parent_selection + report.decisions.reporting;

    println!("\nSimulation Metrics:");
    println!("  Virtual time:    {:>10.0}", report.horizon);
    println!("  Nodes:           {:>10}", report.num_nodes);
    println!("  Transmissions:   {:>10}", transmissions);
    println!("  Decisions:       {:>10}", decisions);
    println!();

    if sim_time.as_secs_f64() > 0.0 {
        let secs = sim_time.as_secs_f64();
        println!("Performance:");
        println!("  Virtual time/s:  {:>10.1}", report.horizon / secs);
        println!("  Transmissions/s: {:>10.0}", transmissions as f64 / secs);

        if transmissions > 0 {
            let ns_per_tx = sim_time.as_nanos() / transmissions as u128;
            println!("  Time/transmission: {:>8}ns", ns_per_tx);
        }
    }

    println!("\n✓ Profiling complete!\n");
}

fn print_timing(label: &str, time: Duration, total: Duration) {
    let percent = (time.as_secs_f64() / total.as_secs_f64()) * 100.0;
    println!("  {:<15}  {:>10.3?}  ({:>5.1}%)", label, time, percent);
}
