mod bitbuf;
pub mod channel;
pub mod demux;
pub mod encoder;
pub mod fragment;
pub mod protocol;
mod transport;

pub use bitbuf::{BitBuffer, BufferError};
pub use channel::{Channel, ChannelConfig, ChannelError, ChannelStats, Delivery};
pub use demux::{Inbound, Networking};
pub use fragment::{FragmentError, FragmentPool};
pub use transport::{MAX_DATAGRAM_SIZE, Transport, TransportStats, UdpTransport};
