use swarm::Simulation;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut simulation = Simulation::new();
    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<u32>() {
            Ok(count) => simulation = simulation.with_particle_count(count),
            Err(_) => {
                eprintln!("usage: swarm [PARTICLE_COUNT]");
                std::process::exit(2);
            }
        }
    }

    if let Err(e) = simulation.run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
