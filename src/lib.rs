//! Linux tun interfaces as blocking, closable packet channels.
//!
//! ```no_run
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use tunwire::{Channel, Config};
//!
//! let config = Config::new("tun0", Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1));
//! let channel = Arc::new(Channel::open(&config)?);
//!
//! let reader = Arc::clone(&channel);
//! let handle = std::thread::spawn(move || {
//!     let mut buf = [0u8; 1504];
//!     loop {
//!         match reader.read(&mut buf) {
//!             Ok(n) => println!("{} byte frame", n),
//!             Err(e) if e.is_terminal() => break,
//!             Err(e) => return Err(e),
//!         }
//!     }
//!     Ok(())
//! });
//!
//! channel.close()?;
//! handle.join().unwrap()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod marker;


pub use channel::{Channel, State};
pub use config::{Config, Configurator, IpCommand, Route, Step};
pub use device::{Device, Tun};
pub use error::{Error, FatalConfigurationError, OpenError};
pub use marker::{Injector, StopMarker, UdpInjector};
