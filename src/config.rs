//! Interface parameters and the steps that apply them.
//!
//! The configuration itself is done by an external collaborator behind the
//! [`Configurator`] trait. [`IpCommand`] shells out to iproute2; tests plug in
//! recorders.
use crate::error::{Error, FatalConfigurationError, OpenError};
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_NAME: &str = "tun0";
pub const DEFAULT_PREFIX: u8 = 24;
pub const DEFAULT_MTU: u32 = 1500;

/// Host route installed at startup to prove the interface is usable
pub const DIAGNOSTIC_ROUTE: Route = Route {
    destination: Ipv4Addr::new(172, 16, 0, 17),
    prefix: 32,
};

/// Ordered configuration steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Address,
    Mtu,
    LinkUp,
    Route,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Address => write!(f, "address"),
            Step::Mtu => write!(f, "mtu"),
            Step::LinkUp => write!(f, "link up"),
            Step::Route => write!(f, "route"),
        }
    }
}

/// An IPv4 destination prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub destination: Ipv4Addr,
    pub prefix: u8,
}

impl Route {
    pub const fn host(destination: Ipv4Addr) -> Self {
        Route {
            destination,
            prefix: 32,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.destination, self.prefix)
    }
}

#[derive(Debug, Error)]
#[error("invalid route `{0}`, expected a.b.c.d[/prefix]")]
pub struct ParseRouteError(String);

impl FromStr for Route {
    type Err = ParseRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRouteError(s.to_string());
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| err())?),
            None => (s, 32),
        };
        if prefix > 32 {
            return Err(err());
        }
        Ok(Route {
            destination: addr.parse().map_err(|_| err())?,
            prefix,
        })
    }
}

/// Everything needed to create and configure one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub prefix: u8,
    pub mtu: u32,
    pub diagnostic_route: Option<Route>,
}

impl Config {
    pub fn new(name: &str, address: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Config {
            name: name.to_string(),
            address,
            gateway,
            prefix: DEFAULT_PREFIX,
            mtu: DEFAULT_MTU,
            diagnostic_route: Some(DIAGNOSTIC_ROUTE),
        }
    }

    pub fn prefix(mut self, prefix: u8) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Route installed as the last step; `None` skips it
    pub fn diagnostic_route(mut self, route: Option<Route>) -> Self {
        self.diagnostic_route = route;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(
            DEFAULT_NAME,
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
        )
    }
}

/// Applies network parameters to an existing interface. Every call is one
/// synchronous operation; an `Err` means the step did not take effect.
pub trait Configurator {
    fn assign_address(&self, name: &str, address: Ipv4Addr, prefix: u8) -> io::Result<()>;
    fn set_mtu(&self, name: &str, mtu: u32) -> io::Result<()>;
    fn link_up(&self, name: &str) -> io::Result<()>;
    fn add_route(&self, name: &str, route: Route, gateway: Ipv4Addr) -> io::Result<()>;
}

/// Runs iproute2's `ip` for each step
#[derive(Debug, Clone)]
pub struct IpCommand {
    program: OsString,
}

impl Default for IpCommand {
    fn default() -> Self {
        IpCommand::with_program("ip")
    }
}

impl IpCommand {
    pub fn with_program(program: impl Into<OsString>) -> Self {
        IpCommand {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> io::Result<()> {
        tracing::debug!(program = ?self.program, ?args, "running");
        let output = Command::new(&self.program).args(args).output()?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("`ip {}` {}: {}", args.join(" "), output.status, stderr.trim()),
        ))
    }
}

impl Configurator for IpCommand {
    fn assign_address(&self, name: &str, address: Ipv4Addr, prefix: u8) -> io::Result<()> {
        let cidr = format!("{address}/{prefix}");
        self.run(&["addr", "add", &cidr, "dev", name])
    }

    fn set_mtu(&self, name: &str, mtu: u32) -> io::Result<()> {
        self.run(&["link", "set", name, "mtu", &mtu.to_string()])
    }

    fn link_up(&self, name: &str) -> io::Result<()> {
        self.run(&["link", "set", name, "up"])
    }

    fn add_route(&self, name: &str, route: Route, gateway: Ipv4Addr) -> io::Result<()> {
        let dst = route.to_string();
        let via = gateway.to_string();
        self.run(&["route", "add", &dst, "via", &via, "dev", name])
    }
}

/// Run the configuration steps for interface `name` in order, stopping at
/// the first failure. A failed diagnostic route comes back as
/// [`OpenError::Fatal`].
pub fn apply<C: Configurator + ?Sized>(
    configurator: &C,
    name: &str,
    config: &Config,
) -> Result<(), OpenError> {
    let step_err = |step: Step| {
        move |source: io::Error| {
            tracing::warn!(device = name, %step, error = %source, "configuration failed");
            Error::Configuration { step, source }
        }
    };

    configurator
        .assign_address(name, config.address, config.prefix)
        .map_err(step_err(Step::Address))?;
    configurator
        .set_mtu(name, config.mtu)
        .map_err(step_err(Step::Mtu))?;
    configurator
        .link_up(name)
        .map_err(step_err(Step::LinkUp))?;

    if let Some(route) = config.diagnostic_route {
        configurator
            .add_route(name, route, config.gateway)
            .map_err(|source| {
                tracing::error!(device = name, %route, error = %source, "diagnostic route failed");
                FatalConfigurationError {
                    route,
                    gateway: config.gateway,
                    source,
                }
            })?;
    }

    tracing::info!(
        device = name,
        address = %config.address,
        prefix = config.prefix,
        mtu = config.mtu,
        "interface configured"
    );
    Ok(())
}
