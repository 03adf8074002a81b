//! The device channel: a tun handle exposed as a duplex stream of IP frames.
//!
//! A reader thread loops on [`Channel::read`] while some other thread
//! eventually calls [`Channel::close`]. The blocking read cannot be
//! interrupted, so `close` sends the channel's [`StopMarker`] through the
//! interface first; the reader sees it and gets [`Error::Closing`].
use crate::config::{self, Config, Configurator, IpCommand};
use crate::device::{Device, Tun};
use crate::error::{Error, OpenError};
use crate::marker::{Injector, StopMarker, UdpInjector};
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of a channel. Transitions only go forward and only `close`
/// triggers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    Closing,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Open => write!(f, "OPEN"),
            State::Closing => write!(f, "CLOSING"),
            State::Closed => write!(f, "CLOSED"),
        }
    }
}

enum Slot<D> {
    // in-flight reads and writes hold their own clone, so the descriptor is
    // never closed underneath a syscall
    Open(Arc<D>),
    Closing,
    Closed,
}

pub struct Channel<D: Device = Tun> {
    name: Option<String>,
    address: Ipv4Addr,
    gateway: Ipv4Addr,
    marker: StopMarker,
    injector: Box<dyn Injector>,
    slot: Mutex<Slot<D>>,
}

impl Channel<Tun> {
    /// Create the interface described by `config`, configure it with `ip`,
    /// and wrap it.
    pub fn open(config: &Config) -> Result<Self, OpenError> {
        Self::open_with(config, &IpCommand::default())
    }

    pub fn open_with<C: Configurator + ?Sized>(
        config: &Config,
        configurator: &C,
    ) -> Result<Self, OpenError> {
        let tun = Tun::new(&config.name).map_err(|e| {
            tracing::warn!(device = %config.name, error = %e, "tunnel device creation failed");
            Error::DeviceCreation(e)
        })?;
        let name = tun.name().to_string();
        Self::configure(tun, &name, config, configurator)
    }

    /// Wrap a tun descriptor created and configured elsewhere. No interface
    /// setup happens here.
    pub fn from_fd(
        fd: OwnedFd,
        name: &str,
        address: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> Result<Self, Error> {
        let tun = Tun::from_fd(fd, name).map_err(Error::DeviceCreation)?;
        Ok(Self::new(tun, Some(name.to_string()), address, gateway))
    }
}

impl<D: Device> Channel<D> {
    pub fn new(device: D, name: Option<String>, address: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Channel {
            name,
            address,
            gateway,
            marker: StopMarker::new(address, gateway),
            injector: Box::new(UdpInjector),
            slot: Mutex::new(Slot::Open(Arc::new(device))),
        }
    }

    /// Apply `config` to the interface behind `device`. On any failure the
    /// device is released before the error is returned.
    pub fn configure<C: Configurator + ?Sized>(
        device: D,
        name: &str,
        config: &Config,
        configurator: &C,
    ) -> Result<Self, OpenError> {
        if let Err(err) = config::apply(configurator, name, config) {
            if let Err(e) = device.release() {
                tracing::warn!(device = name, error = %e, "releasing unconfigured device failed");
            }
            return Err(err);
        }
        Ok(Self::new(
            device,
            Some(name.to_string()),
            config.address,
            config.gateway,
        ))
    }

    /// Replace the way `close` delivers the stop marker
    pub fn with_injector(mut self, injector: Box<dyn Injector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn state(&self) -> State {
        match &*self.lock() {
            Slot::Open(_) => State::Open,
            Slot::Closing => State::Closing,
            Slot::Closed => State::Closed,
        }
    }

    #[cfg(test)]
    pub(crate) fn marker(&self) -> &StopMarker {
        &self.marker
    }

    /// Block until a frame arrives and copy it into `buf`.
    ///
    /// Returns [`Error::Closing`] when the frame is this channel's stop
    /// marker; the marker's bytes are wiped from `buf`. After `close`
    /// returns [`Error::Closed`].
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let device = self.device()?;
        let n = match device.recv(buf) {
            Ok(n) => n,
            Err(_) if self.state() != State::Open => return Err(Error::Closed),
            Err(e) => return Err(e.into()),
        };
        if self.marker.matches(&buf[..n]) {
            buf[..n].fill(0);
            tracing::debug!(device = self.label(), "stop marker received");
            return Err(Error::Closing);
        }
        Ok(n)
    }

    /// Hand `buf` to the device as one frame.
    pub fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        Ok(self.device()?.send(buf)?)
    }

    /// Wake any blocked reader with the stop marker, then release the
    /// handle. Only the release result is reported; a marker that could not
    /// be sent is logged. A second call gets [`Error::Closed`].
    pub fn close(&self) -> Result<(), Error> {
        let device = {
            let mut slot = self.lock();
            match std::mem::replace(&mut *slot, Slot::Closing) {
                Slot::Open(device) => device,
                previous => {
                    *slot = previous;
                    return Err(Error::Closed);
                }
            }
        };

        tracing::debug!(device = self.label(), "sending stop marker");
        if let Err(e) = self.injector.inject(&self.marker) {
            tracing::warn!(device = self.label(), error = %e, "failed to send stop marker");
        }

        let result = match Arc::try_unwrap(device) {
            Ok(device) => device.release().map_err(Error::from),
            Err(in_flight) => {
                // the last in-flight call closes the descriptor on return
                tracing::debug!(device = self.label(), "I/O in flight, deferring release");
                drop(in_flight);
                Ok(())
            }
        };

        *self.lock() = Slot::Closed;
        tracing::info!(device = self.label(), "channel closed");
        result
    }

    fn device(&self) -> Result<Arc<D>, Error> {
        match &*self.lock() {
            Slot::Open(device) => Ok(Arc::clone(device)),
            Slot::Closing | Slot::Closed => Err(Error::Closed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<D>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl<D: Device> fmt::Debug for Channel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("gateway", &self.gateway)
            .field("state", &self.state())
            .finish()
    }
}

/// Stream view: the stop marker reads as end-of-stream.
impl<D: Device> io::Read for &Channel<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Channel::<D>::read(self, buf) {
            Ok(n) => Ok(n),
            Err(Error::Closing) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl<D: Device> io::Write for &Channel<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Channel::<D>::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
