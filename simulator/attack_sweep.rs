//! Sweep attacker mixes over one topology and compare delivery
//!
//! Run with: cargo run --release --example attack_sweep [seed]

use desist::{DropReason, SimConfig, Simulation};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

fn main() {
    SimpleLogger::new().with_level(LevelFilter::Warn).env().init().unwrap();

    let seed: u64 = std::env::args()
        .nth(1)
        .map(|s| {
            s.parse().unwrap_or_else(|e| {
                eprintln!("Invalid seed {}: {}", s, e);
                std::process::exit(1);
            })
        })
        .unwrap_or(42);

    // (label, blackhole, selfish, rank attacker)
    let mixes = [
        ("none", 0.0, 0.0, 0.0),
        ("blackhole 10%", 0.1, 0.0, 0.0),
        ("blackhole 20%", 0.2, 0.0, 0.0),
        ("blackhole 30%", 0.3, 0.0, 0.0),
        ("selfish 20%", 0.0, 0.2, 0.0),
        ("rank 10%", 0.0, 0.0, 0.1),
        ("mixed default", 0.1, 0.1, 0.05),
    ];

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  ATTACK SWEEP (seed {:<10})                         ║", seed);
    println!("╚════════════════════════════════════════════════════════╝\n");

    println!(
        "{:<16} {:>7} {:>9} {:>9} {:>9} {:>9} {:>8}",
        "Mix", "PDR", "Delivered", "Blackhole", "Selfish", "NoRoute", "Reports"
    );
    println!("{}", "-".repeat(74));

    let mut baseline_pdr = None;
    for (label, blackhole, selfish, rank_attacker) in mixes {
        let mut config = SimConfig {
            seed,
            ..SimConfig::default()
        };
        config.attackers.blackhole = blackhole;
        config.attackers.selfish = selfish;
        config.attackers.rank_attacker = rank_attacker;

        let mut sim = Simulation::new(config).unwrap_or_else(|e| {
            eprintln!("Invalid configuration for {}: {}", label, e);
            std::process::exit(1);
        });
        let report = sim.run();

        println!(
            "{:<16} {:>7.3} {:>9} {:>9} {:>9} {:>9} {:>8}",
            label,
            report.packet_delivery_ratio,
            report.packets_delivered,
            report.drops_for(DropReason::Blackhole),
            report.drops_for(DropReason::Selfish),
            report.drops_for(DropReason::NoRoute),
            report.reports_true + report.reports_false
        );

        match baseline_pdr {
            None => baseline_pdr = Some(report.packet_delivery_ratio),
            Some(base) => info!("{}: pdr {:+.3} against no attackers", label, report.packet_delivery_ratio - base),
        }
    }

    println!("\n✓ Sweep complete!\n");
}
