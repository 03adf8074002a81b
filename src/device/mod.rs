pub mod ifreq;
mod tun;

// Import and re-export
pub use self::tun::Tun;

// Mock device for testing
#[cfg(test)]
pub mod mock;
#[cfg(test)]
pub use self::mock::MockDevice;

/// A trait for network device I/O
pub trait Device: Send + Sync {
    /// Receive one frame from the device, blocking until one is available
    fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Send one frame to the device
    fn send(&self, buf: &[u8]) -> std::io::Result<usize>;

    /// Release the underlying handle and report what the OS said about it
    fn release(self) -> std::io::Result<()>
    where
        Self: Sized;
}
