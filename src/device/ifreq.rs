//! `struct ifreq` encoding for the `TUNSETIFF` control request.
//!
//! The kernel copies exactly [`IFREQ_LEN`] bytes from the pointer handed to the
//! ioctl: a NUL-padded interface name, the 16-bit flags word, then the unused
//! remainder of the `ifr_ifru` union. Everything else in the crate goes through
//! [`encode`] so this is the only place the layout lives.
use std::io;

/// Width of the `ifr_name` field, including the terminating NUL.
pub const IFNAMSIZ: usize = 16;
/// Total size of `struct ifreq` on Linux.
pub const IFREQ_LEN: usize = 40;
/// Byte offset of `ifr_flags` inside the record.
pub const FLAGS_OFFSET: usize = IFNAMSIZ;

/// Layer 3 device: frames are bare IP packets.
pub const IFF_TUN: u16 = 0x0001;
/// Do not prepend the 4-byte packet information header.
pub const IFF_NO_PI: u16 = 0x1000;

pub type IfReq = [u8; IFREQ_LEN];

/// Build the request record for `name` with the given mode flags.
///
/// An empty name asks the kernel to pick one (`tun%d`); read it back with
/// [`name`] after the ioctl returns.
pub fn encode(name: &str, flags: u16) -> io::Result<IfReq> {
    let bytes = name.as_bytes();
    if bytes.len() >= IFNAMSIZ {
        return Err(invalid_name(name, "longer than 15 bytes"));
    }
    if bytes.contains(&0) {
        return Err(invalid_name(name, "contains NUL"));
    }

    let mut req = [0u8; IFREQ_LEN];
    req[..bytes.len()].copy_from_slice(bytes);
    req[FLAGS_OFFSET..FLAGS_OFFSET + 2].copy_from_slice(&flags.to_ne_bytes());
    Ok(req)
}

/// Interface name stored in a request record, up to the first NUL.
pub fn name(req: &IfReq) -> String {
    let field = &req[..IFNAMSIZ];
    let end = field.iter().position(|&b| b == 0).unwrap_or(IFNAMSIZ);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Flags word stored in a request record.
pub fn flags(req: &IfReq) -> u16 {
    u16::from_ne_bytes([req[FLAGS_OFFSET], req[FLAGS_OFFSET + 1]])
}

fn invalid_name(name: &str, why: &str) -> io::Error {
    // same errno the kernel answers for a bad ifr_name
    tracing::debug!(interface = name, why, "rejecting interface name");
    io::Error::from_raw_os_error(libc::EINVAL)
}
