use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Largest datagram the protocol produces or accepts.
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Anything that can put a datagram on the wire.
pub trait Transport {
    fn send(&mut self, addr: SocketAddr, data: &[u8]) -> io::Result<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Non-blocking UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: TransportStats,
    recv_buffer: Vec<u8>,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: TransportStats::default(),
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Drains every datagram waiting on the socket.
    pub fn poll(&mut self) -> io::Result<Vec<(SocketAddr, Vec<u8>)>> {
        let mut datagrams = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;
                    datagrams.push((addr, self.recv_buffer[..size].to_vec()));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(datagrams)
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, addr: SocketAddr, data: &[u8]) -> io::Result<usize> {
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Datagram exceeds maximum size",
            ));
        }

        let bytes = self.socket.send_to(data, addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }
}
