use std::io::Result;
use std::process;

use clap::{App, Arg, ArgMatches};
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};

use ribd::config::{ConfigError, RouterConfig};
use ribd::handler::serve;

fn main() -> Result<()> {
    let matches = App::new("ribd")
        .version("0.1")
        .about("BGP-style route processor")
        .arg(
            Arg::with_name("asn")
                .help("Local AS number")
                .index(1)
                .required_unless("configpath"),
        )
        .arg(
            Arg::with_name("neighbors")
                .help("Neighbor tokens: <address>-<cust|peer|prov>")
                .index(2)
                .multiple(true),
        )
        .arg(
            Arg::with_name("configpath")
                .short("c")
                .long("config-path")
                .help("Path to a router config file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("socketdir")
                .short("d")
                .long("socket-dir")
                .help("Directory holding the per-neighbor sockets")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of logging verbosity"),
        )
        .get_matches();

    let (ribd_level, other_level) = match matches.occurrences_of("v") {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("ribd"), ribd_level)
        .filter(None, other_level)
        .init();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };
    debug!(
        "AS {}, {} neighbor(s), sockets in {}",
        config.local_as,
        config.neighbors.len(),
        config.socket_dir
    );

    serve(config)?;
    info!("Shut down cleanly");
    Ok(())
}

fn load_config(matches: &ArgMatches) -> std::result::Result<RouterConfig, ConfigError> {
    let mut config = if let Some(path) = matches.value_of("configpath") {
        RouterConfig::from_file(path)?
    } else {
        let local_as = matches
            .value_of("asn")
            .unwrap_or_default()
            .parse()
            .map_err(|_| ConfigError::Invalid("AS number must be an integer".to_string()))?;
        let tokens: Vec<&str> = matches
            .values_of("neighbors")
            .map(Iterator::collect)
            .unwrap_or_default();
        RouterConfig::from_tokens(local_as, &tokens)?
    };
    if let Some(dir) = matches.value_of("socketdir") {
        config.socket_dir = dir.to_string();
    }
    Ok(config)
}
