use std::process::exit;
use std::time::Instant;

use tectosim::mesh::StructuredGenerator;
use tectosim::{config::Param, output, simulation};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() == 2 && (args[1] == "-h" || args[1] == "--help") {
        print!("{}", Param::help());
        exit(0);
    }
    if args.len() != 2 {
        eprintln!("Usage: {} config_file", args[0]);
        exit(-1);
    }

    let param = match Param::from_file(&args[1]) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };
    param.print_summary();

    let start = Instant::now();
    let source = StructuredGenerator;

    let result = (|| -> Result<(), String> {
        let mut var = if param.sim.is_restarting {
            simulation::restart(&param)?
        } else {
            let mut var = simulation::init(&param, &source)?;
            output::output(&param, &var, &start);
            var.frame += 1;
            var
        };
        simulation::run(&param, &mut var, &source, &start)
    })();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
