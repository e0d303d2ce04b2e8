use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

use hardmon::commands;

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .help("Output as JSON")
        .action(clap::ArgAction::SetTrue)
}

fn gpu_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session")
                .long("session")
                .help("Use the metrics-session backend instead of the layered one")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("adapter")
                .short('a')
                .long("adapter")
                .value_name("NAME")
                .help("Pick the session adapter whose name contains NAME"),
        )
}

fn build_cli() -> Command {
    Command::new("hardmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CPU and GPU silicon telemetry")
        .subcommand(
            Command::new("topology")
                .about("Show the package / core / thread tree")
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("cpu")
                .about("Read CPU temperatures, power and clocks once")
                .arg(json_arg()),
        )
        .subcommand(gpu_args(
            Command::new("gpu")
                .about("Read GPU temperatures, power, fan and clocks once")
                .arg(json_arg()),
        ))
        .subcommand(gpu_args(
            Command::new("watch")
                .about("Poll CPU and GPU continuously")
                .arg(
                    Arg::new("interval")
                        .short('i')
                        .long("interval")
                        .value_name("MS")
                        .help("Poll interval in milliseconds (defaults to the configured one)")
                        .value_parser(clap::value_parser!(u64).range(50..)),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_name("N")
                        .help("Stop after N cycles")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("cpu-only")
                        .long("cpu-only")
                        .help("Poll only the CPU")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with("gpu-only"),
                )
                .arg(
                    Arg::new("gpu-only")
                        .long("gpu-only")
                        .help("Poll only the GPU")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(json_arg()),
        ))
        .subcommand(
            Command::new("config")
                .about("Show or change configuration (use 'hardmon config --help' for subcommands)")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("show").about("Print the current configuration"))
                .subcommand(
                    Command::new("set-adapter")
                        .about("Set the session-path adapter name filter (empty clears it)")
                        .arg(
                            Arg::new("name")
                                .help("Substring of the adapter name")
                                .required(true)
                                .index(1),
                        ),
                )
                .subcommand(
                    Command::new("set-backend")
                        .about("Choose the GPU backend")
                        .arg(
                            Arg::new("backend")
                                .help("layered or session")
                                .required(true)
                                .value_parser(["layered", "session"])
                                .index(1),
                        ),
                ),
        )
}

fn dispatch(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("topology", sub_matches)) => commands::topology(sub_matches),
        Some(("cpu", sub_matches)) => commands::cpu(sub_matches),
        Some(("gpu", sub_matches)) => commands::gpu(sub_matches),
        Some(("watch", sub_matches)) => commands::watch(sub_matches),
        Some(("config", sub_matches)) => commands::config::execute(sub_matches),
        _ => {
            println!("Welcome to hardmon!");
            println!("Use 'hardmon --help' for more information.");
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    hardmon::init_logging();

    let matches = build_cli().get_matches();
    dispatch(&matches)
}
