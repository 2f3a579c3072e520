#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use std::process;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use attila::{config, logger, Result, Server};

fn main() {
    let app = App::new("attila")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .about("Meta control plane for fleets of Nomad regions")
        .subcommand(
            SubCommand::with_name("server")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .about("Run and manage an attila server")
                .subcommand(
                    SubCommand::with_name("run")
                        .about("Run an attila server until signalled to stop")
                        .arg(
                            Arg::with_name("config")
                                .short("c")
                                .long("config")
                                .takes_value(true)
                                .multiple(true)
                                .number_of_values(1)
                                .help("Path to a config file; later files override earlier ones"),
                        ),
                ),
        );

    let args = app.get_matches();
    if let Err(e) = run(&args) {
        // the logger may not be up yet, so report on stderr as well
        eprintln!("attila error: {}", attila::error_chain_text(&e));
        error!("{}", attila::error_chain_text(&e));
        process::exit(1);
    }
    process::exit(0);
}

fn run(args: &ArgMatches<'_>) -> Result<()> {
    match args.subcommand() {
        ("server", Some(server_args)) => match server_args.subcommand() {
            ("run", Some(run_args)) => server_run(run_args),
            _ => unreachable!("clap enforces a server subcommand"),
        },
        _ => unreachable!("clap enforces a subcommand"),
    }
}

fn server_run(args: &ArgMatches<'_>) -> Result<()> {
    let paths: Vec<&str> = args.values_of("config").map(|v| v.collect()).unwrap_or_default();

    let cfg = config::load(&paths)?;
    cfg.validate()?;
    logger::setup(&cfg.log())?;

    actix_rt::System::new("attila").block_on(async move {
        let mut server = Server::new(&cfg)?;
        server.start()?;
        info!("attila server running regions={}", server.region_num());
        server.wait_for_signals().await
    })
}
