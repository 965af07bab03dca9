use log::{info, LevelFilter};
use rand::Rng;
use simple_logger::SimpleLogger;

use desist::{LogSink, SimConfig, Simulation};

fn main() {
    SimpleLogger::new().with_level(LevelFilter::Info).env().init().unwrap();

    info!("starting");

    let seed: u64 = rand::thread_rng().gen();
    let config = SimConfig {
        seed,
        ..SimConfig::default()
    };

    let mut sim = match Simulation::new(config) {
        Ok(sim) => sim.with_sink(Box::new(LogSink)),
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let report = sim.run();
    report.print_summary();

    info!(
        "seed {} done: pdr {:.3}, {} of {} nodes alive",
        report.seed, report.packet_delivery_ratio, report.nodes_alive, report.num_nodes
    );
}
