use crate::device::ifreq::{self, IfReq, IFF_NO_PI, IFF_TUN};
use crate::Device;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Control device every tunnel interface is cloned from
pub const TUN_PATH: &str = "/dev/net/tun";

nix::ioctl_readwrite_bad!(
    tun_set_iff,
    nix::request_code_write!(b'T', 202, std::mem::size_of::<libc::c_int>()),
    IfReq
);

/// Layer 3 frames, no packet information header. The stop marker is an IP
/// datagram, so layer 2 interfaces are never requested.
pub const TUN_FLAGS: u16 = IFF_TUN | IFF_NO_PI;

// Tun wraps a real tun device
#[derive(Debug)]
pub struct Tun {
    file: File,
    name: String,
}

impl Tun {
    /// Create (or attach to) the tun interface `name`.
    ///
    /// Errors carry the OS error untouched so EPERM/EACCES (no privilege) can be
    /// told apart from EBUSY/EINVAL (bad or taken name).
    pub fn new(name: &str) -> io::Result<Self> {
        let mut req = ifreq::encode(name, TUN_FLAGS)?;
        let file = OpenOptions::new().read(true).write(true).open(TUN_PATH)?;

        // the kernel writes the final name back into the record
        unsafe { tun_set_iff(file.as_raw_fd(), &mut req) }?;

        let name = ifreq::name(&req);
        tracing::debug!(device = %name, "attached tunnel interface");
        Ok(Self { file, name })
    }

    /// Wrap a descriptor opened and attached by someone else, e.g. a
    /// privileged helper that handed it over. The descriptor is switched to
    /// blocking mode.
    pub fn from_fd(fd: OwnedFd, name: &str) -> io::Result<Self> {
        set_blocking(fd.as_fd())?;
        Ok(Self {
            file: File::from(fd),
            name: name.to_string(),
        })
    }

    /// Interface name as the kernel knows it
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRawFd for Tun {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Device for Tun {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf) // Direct passthrough
    }

    fn release(self) -> io::Result<()> {
        // File's Drop swallows close(2) errors; do it by hand to report them
        nix::unistd::close(self.file)?;
        Ok(())
    }
}

fn set_blocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    if flags.contains(OFlag::O_NONBLOCK) {
        fcntl(fd, FcntlArg::F_SETFL(flags - OFlag::O_NONBLOCK))?;
    }
    Ok(())
}
