use super::*;
use hardy_bpv6_agent::{link, router};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    // Logging level
    pub log_level: String,

    // Flattened daemon settings
    #[serde(flatten)]
    pub agent: hardy_bpv6_agent::config::Config,

    // Links, each served by the null convergence layer
    pub links: Vec<link::Config>,

    // Static routes
    pub routes: Vec<router::Route>,

    // Local endpoints that log what they receive
    pub registrations: Vec<bpv6::EidPattern>,
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optflag("h", "help", "print this help menu")
        .optflag("v", "version", "print the version information")
        .optopt("c", "config", "use a custom configuration file", "FILE");
    opts
}

pub fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("dtn", "Hardy", env!("CARGO_PKG_NAME")).map_or_else(
        || {
            #[cfg(all(target_os = "linux", not(feature = "packaged-installation")))]
            return std::path::Path::new("/etc/opt").join(env!("CARGO_PKG_NAME"));

            #[cfg(all(
                unix,
                not(all(target_os = "linux", not(feature = "packaged-installation")))
            ))]
            return std::path::Path::new("/etc").join(env!("CARGO_PKG_NAME"));

            #[cfg(windows)]
            return std::env::current_exe()
                .trace_expect("Failed to get current executable path")
                .join(env!("CARGO_PKG_NAME"));

            #[cfg(not(any(unix, windows)))]
            compile_error!("No idea how to determine default config directory for target platform");
        },
        |proj_dirs| proj_dirs.config_local_dir().to_path_buf(),
    )
}

/// Parses the command line and loads the configuration, returning `None`
/// if the program should just exit.
pub fn init() -> anyhow::Result<Option<(Config, String)>> {
    let opts = options();
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_default();
    let flags = opts
        .parse(args.iter().skip(1))
        .context("Failed to parse command line args")?;
    if flags.opt_present("h") {
        let brief = format!(
            "{} {} - {}\n\nUsage: {} [options]",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION"),
            program
        );
        print!("{}", opts.usage(&brief));
        return Ok(None);
    }
    if flags.opt_present("v") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(None);
    }

    let mut b = ::config::Config::builder();

    let config_source: String;
    if let Some(source) = flags.opt_str("config") {
        config_source = format!("Using configuration file '{source}' specified on command line");
        b = b.add_source(::config::File::with_name(&source))
    } else if let Ok(source) = std::env::var("HARDY_BPV6_SERVER_CONFIG_FILE") {
        config_source = format!(
            "Using configuration file '{source}' specified by HARDY_BPV6_SERVER_CONFIG_FILE environment variable"
        );
        b = b.add_source(::config::File::with_name(&source))
    } else {
        let path = config_dir().join(format!("{}.yaml", env!("CARGO_PKG_NAME")));
        config_source = format!("Using configuration file '{}'", path.display());
        b = b.add_source(::config::File::from(path).required(false))
    }

    b = b.add_source(::config::Environment::with_prefix("HARDY_BPV6_SERVER"));

    let config = b
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(Some((config, config_source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yaml() {
        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from_str(
                r#"
log_level: debug
local_eid: "dtn://node1"
links:
  - name: peer
    mtu: 1500
routes:
  - pattern: "dtn://node2/*"
    link: peer
registrations:
  - "dtn://node1/app"
"#,
                ::config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.agent.local_eid.as_str(), "dtn://node1");
        assert!(config.agent.status_reports);
        assert_eq!(config.links.len(), 1);
        assert_eq!(config.links[0].mtu, 1500);
        assert!(config.links[0].reliable);
        assert_eq!(config.routes[0].link, "peer");
        assert_eq!(config.registrations[0].as_str(), "dtn://node1/app");
    }
}
