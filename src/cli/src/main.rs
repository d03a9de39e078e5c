use clap::{Parser, Subcommand};
use std::{path::PathBuf, process};

use uhdm2rtlil::error::CollectingHandler;
use uhdm2rtlil::xlate::{lower_module, Config, Translator};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a `.hdl` fixture file's procedural blocks into an RTLIL module.
    #[command()]
    Lower(LowerOpts),
}

#[derive(Parser)]
struct LowerOpts {
    /// The `.hdl` fixture file to lower
    #[arg(short, long)]
    input: PathBuf,
    /// Print the resulting module
    #[arg(short, long)]
    print: bool,
    /// Accept assume/cover/restrict/immediate_assume instead of flagging them
    #[arg(long)]
    allow_formal: bool,
}

fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();
    let args = Cli::parse();

    match args.command {
        Commands::Lower(opts) => {
            let file = match std::fs::read_to_string(&opts.input) {
                Ok(f) => f,
                Err(e) => {
                    log::error!("could not read {}: {}", opts.input.display(), e);
                    process::exit(1);
                }
            };

            let hdl_module = match uhdm2rtlil::hdl::parse_fixture(&file) {
                Ok(m) => m,
                Err(e) => {
                    log::error!("could not parse {}: {}", opts.input.display(), e);
                    process::exit(1);
                }
            };

            let config = Config {
                allow_formal: opts.allow_formal,
                ..Config::default()
            };
            let handler = CollectingHandler::new();
            let mut translator = Translator::new(config, Box::new(handler));

            let module = lower_module(&hdl_module, &mut translator);

            if opts.print {
                println!("{:#?}", module);
            }

            log::info!("lowered {} procedural block(s)", hdl_module.procs.len());
            log::info!("  wires: {}", module.wires().len());
            log::info!("  processes: {}", module.processes().len());
            log::info!("  memories: {}", module.memories().len());

            process::exit(0);
        }
    }
}
