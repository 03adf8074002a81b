//! Stop marker: the frame `close` pushes through the interface so a reader
//! stuck in a blocking `read` wakes up and learns the channel is going away.
//!
//! The marker is an IPv4/UDP datagram from the channel address to the gateway,
//! destination port [`MARKER_PORT`], whose payload is [`MAGIC`] followed by a
//! random token drawn when the channel is built. Sending it from a local
//! socket makes the kernel route it out of the tun interface, straight into
//! the read path. Nothing but this channel knows the token, so application
//! traffic cannot match by accident.
use etherparse::{IpNumber, Ipv4HeaderSlice, PacketBuilder, UdpHeaderSlice};
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

pub const MARKER_PORT: u16 = 2222;
pub const MAGIC: &[u8; 8] = b"TUNWSTOP";
pub const TOKEN_LEN: usize = 16;
pub const PAYLOAD_LEN: usize = MAGIC.len() + TOKEN_LEN;

const UDP_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopMarker {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    token: [u8; TOKEN_LEN],
}

impl StopMarker {
    /// Marker for a channel at `address` with peer `gateway`, fresh token
    pub fn new(address: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self::with_token(address, gateway, rand::random())
    }

    pub fn with_token(address: Ipv4Addr, gateway: Ipv4Addr, token: [u8; TOKEN_LEN]) -> Self {
        StopMarker {
            source: address,
            destination: gateway,
            token,
        }
    }

    pub fn source(&self) -> Ipv4Addr {
        self.source
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    /// UDP payload carried by the marker
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..MAGIC.len()].copy_from_slice(MAGIC);
        payload[MAGIC.len()..].copy_from_slice(&self.token);
        payload
    }

    /// The complete IPv4 frame as it shows up on the read side
    pub fn frame(&self) -> io::Result<Vec<u8>> {
        let builder = PacketBuilder::ipv4(self.source.octets(), self.destination.octets(), 64)
            .udp(MARKER_PORT, MARKER_PORT);
        let payload = self.payload();
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder
            .write(&mut frame, &payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(frame)
    }

    /// Whether `packet` is this marker. The UDP source port and checksums are
    /// ignored since the kernel picks them.
    pub fn matches(&self, packet: &[u8]) -> bool {
        let ip = match Ipv4HeaderSlice::from_slice(packet) {
            Ok(h) if h.protocol() == IpNumber::UDP => h,
            _ => return false,
        };
        if ip.source_addr() != self.source || ip.destination_addr() != self.destination {
            return false;
        }

        let end = ip.total_len() as usize;
        let start = ip.slice().len() + UDP_HEADER_LEN;
        if end > packet.len() || end != start + PAYLOAD_LEN {
            return false;
        }

        let udp = match UdpHeaderSlice::from_slice(&packet[ip.slice().len()..end]) {
            Ok(h) => h,
            _ => return false,
        };
        udp.destination_port() == MARKER_PORT
            && udp.length() as usize == UDP_HEADER_LEN + PAYLOAD_LEN
            && packet[start..end] == self.payload()
    }
}

/// Gets a stop marker onto the interface's read path.
pub trait Injector: Send + Sync {
    fn inject(&self, marker: &StopMarker) -> io::Result<()>;
}

/// Sends the marker payload from a UDP socket bound to the channel address,
/// letting the kernel route it through the interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpInjector;

impl Injector for UdpInjector {
    fn inject(&self, marker: &StopMarker) -> io::Result<()> {
        let socket = UdpSocket::bind(SocketAddrV4::new(marker.source(), 0))?;
        let peer = SocketAddrV4::new(marker.destination(), MARKER_PORT);
        let sent = socket.send_to(&marker.payload(), peer)?;
        if sent != PAYLOAD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "stop marker datagram truncated",
            ));
        }
        Ok(())
    }
}
