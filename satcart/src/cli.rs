use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::time::Duration;

use satcart_lib::LinkConfig;
use satcart_lib::utils::Utils;

use crate::config::SatcartConfig;

/// Settings after the command line, the environment and the config file
/// have been layered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedConfig {
    pub link: LinkConfig,
    pub console: bool,
    pub quiet: bool,
}

#[derive(Parser, Debug)]
#[command(
    author,
    about = "Sega Saturn USB flash cartridge tool",
    long_about = None,
    disable_version_flag = true,
    group(ArgGroup::new("transfer").args(["download", "upload", "execute"]))
)]
pub struct Cli {
    /// JSON configuration file path
    #[arg(long = "config", short = 'f')]
    pub config: Option<String>,

    /// USB vendor ID in hex (default: 0x0403)
    #[arg(short = 'v', short_alias = 'V', value_parser = parse_usb_id)]
    pub vid: Option<u16>,

    /// USB product ID in hex (default: 0x6001)
    #[arg(short = 'p', short_alias = 'P', value_parser = parse_usb_id)]
    pub pid: Option<u16>,

    /// Serial device to use instead of looking the cartridge up by VID/PID
    #[arg(long = "port")]
    pub port: Option<String>,

    /// Serial port baud rate (default: 1000000)
    #[arg(long = "baud")]
    pub baud: Option<u32>,

    /// Download cartridge memory to a file
    #[arg(short = 'd', short_alias = 'D', num_args = 3, value_names = ["FILE", "ADDRESS", "SIZE"])]
    pub download: Option<Vec<String>>,

    /// Upload a file to cartridge memory
    #[arg(short = 'u', short_alias = 'U', num_args = 2, value_names = ["FILE", "ADDRESS"])]
    pub upload: Option<Vec<String>>,

    /// Upload a file and execute it
    #[arg(short = 'x', short_alias = 'X', num_args = 2, value_names = ["FILE", "ADDRESS"])]
    pub execute: Option<Vec<String>>,

    /// Show the cartridge console output after any command
    #[arg(short = 'c', short_alias = 'C')]
    pub console: bool,

    /// Suppress progress bar output
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// One transfer requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    Download {
        path: PathBuf,
        address: u32,
        size: u32,
    },
    Upload {
        path: PathBuf,
        address: u32,
    },
    Execute {
        path: PathBuf,
        address: u32,
    },
}

fn parse_usb_id(s: &str) -> std::result::Result<u16, String> {
    Utils::parse_usb_id(s).map_err(|e| format!("invalid USB ID '{}': {}", s, e))
}

fn parse_number(what: &str, s: &str) -> Result<u32> {
    Utils::str_to_u32(s).with_context(|| format!("Invalid {} '{}'", what, s))
}

impl Cli {
    pub fn transfer(&self) -> Result<Option<Transfer>> {
        if let Some(values) = &self.download {
            let [path, address, size] = values.as_slice() else {
                bail!("-d takes <file> <address> <size>");
            };
            return Ok(Some(Transfer::Download {
                path: PathBuf::from(path),
                address: parse_number("address", address)?,
                size: parse_number("size", size)?,
            }));
        }
        if let Some(values) = &self.upload {
            let [path, address] = values.as_slice() else {
                bail!("-u takes <file> <address>");
            };
            return Ok(Some(Transfer::Upload {
                path: PathBuf::from(path),
                address: parse_number("address", address)?,
            }));
        }
        if let Some(values) = &self.execute {
            let [path, address] = values.as_slice() else {
                bail!("-x takes <file> <address>");
            };
            return Ok(Some(Transfer::Execute {
                path: PathBuf::from(path),
                address: parse_number("address", address)?,
            }));
        }
        Ok(None)
    }
}

/// Merge CLI arguments, environment variables and the config file, in that
/// order of precedence. `env` looks up one environment variable.
pub fn merge_config<F>(args: &Cli, config: Option<SatcartConfig>, env: F) -> Result<MergedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base_config = config.unwrap_or_else(SatcartConfig::with_defaults);
    let base_link = base_config
        .link_config()
        .map_err(|e| anyhow!("Invalid config: {}", e))?;

    let env_id = |key: &str| -> Result<Option<u16>> {
        env(key)
            .map(|value| {
                Utils::parse_usb_id(&value)
                    .with_context(|| format!("Invalid {} environment variable '{}'", key, value))
            })
            .transpose()
    };

    let vid = match args.vid {
        Some(vid) => vid,
        None => env_id("VID")?.unwrap_or(base_link.vid),
    };
    let pid = match args.pid {
        Some(pid) => pid,
        None => env_id("PID")?.unwrap_or(base_link.pid),
    };
    let port = args
        .port
        .clone()
        .or_else(|| env("SATCART_PORT"))
        .or(base_link.port);
    let baud = args.baud.unwrap_or(base_link.baud);
    if baud == 0 {
        bail!("Baud rate must be non-zero");
    }

    Ok(MergedConfig {
        link: LinkConfig {
            vid,
            pid,
            port,
            baud,
            read_timeout: Duration::from_millis(base_config.read_timeout_ms),
        },
        console: args.console || base_config.console,
        quiet: args.quiet || base_config.quiet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("satcart").chain(args.iter().copied())).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn download_arguments() {
        let cli = parse(&["-d", "dump.bin", "0x06004000", "256"]);
        assert_eq!(
            cli.transfer().unwrap(),
            Some(Transfer::Download {
                path: PathBuf::from("dump.bin"),
                address: 0x0600_4000,
                size: 256
            })
        );
    }

    #[test]
    fn upper_case_flags() {
        let cli = parse(&["-V", "1209", "-P", "0x0001", "-X", "game.bin", "0x06004000", "-C"]);
        assert_eq!(cli.vid, Some(0x1209));
        assert_eq!(cli.pid, Some(0x0001));
        assert!(cli.console);
        assert!(matches!(
            cli.transfer().unwrap(),
            Some(Transfer::Execute { address: 0x0600_4000, .. })
        ));
    }

    #[test]
    fn wrong_argument_count_is_a_usage_error() {
        assert!(Cli::try_parse_from(["satcart", "-d", "dump.bin", "0x0"]).is_err());
        assert!(Cli::try_parse_from(["satcart", "-u", "a.bin"]).is_err());
    }

    #[test]
    fn one_transfer_per_invocation() {
        assert!(Cli::try_parse_from(["satcart", "-u", "a", "0", "-x", "b", "0"]).is_err());
    }

    #[test]
    fn bad_address_is_reported() {
        let cli = parse(&["-u", "a.bin", "0xZZ"]);
        assert!(cli.transfer().is_err());
    }

    #[test]
    fn defaults_without_config() {
        let merged = merge_config(&parse(&["-c"]), None, no_env).unwrap();
        assert_eq!(merged.link, LinkConfig::default());
        assert!(merged.console);
        assert!(!merged.quiet);
    }

    #[test]
    fn precedence_cli_then_env_then_file() {
        let config: SatcartConfig = serde_json::from_str(
            r#"{ "vid": "0x1111", "pid": "0x2222", "port": "/dev/file", "quiet": true }"#,
        )
        .unwrap();
        let env = |key: &str| match key {
            "VID" => Some("3333".to_string()),
            "SATCART_PORT" => Some("/dev/env".to_string()),
            _ => None,
        };

        let merged = merge_config(&parse(&["-v", "4444"]), Some(config.clone()), env).unwrap();
        assert_eq!(merged.link.vid, 0x4444);
        assert_eq!(merged.link.pid, 0x2222);
        assert_eq!(merged.link.port.as_deref(), Some("/dev/env"));
        assert!(merged.quiet);

        let merged = merge_config(&parse(&[]), Some(config), env).unwrap();
        assert_eq!(merged.link.vid, 0x3333);
    }

    #[test]
    fn malformed_env_id_is_an_error() {
        let env = |key: &str| (key == "PID").then(|| "nothex".to_string());
        assert!(merge_config(&parse(&[]), None, env).is_err());
    }
}
