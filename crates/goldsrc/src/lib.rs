pub mod assets;
pub mod client;
pub mod delta;
pub mod net;

pub use assets::{AssetStore, DirectoryAssets, MemoryAssets};
pub use client::{
    Client, ClientConfig, ClientError, ClientEvent, ClientHooks, ConnectionState,
    DisconnectReason, Entities, NoHooks, ProtocolError, Resources, Session,
};
pub use delta::{Delta, DeltaError, Entity, EntityShape, Table, UserCmd};
pub use net::protocol::{DEFAULT_PORT, PROTOCOL_VERSION};
pub use net::{
    BitBuffer, BufferError, Channel, ChannelConfig, ChannelError, Delivery, Inbound,
    MAX_DATAGRAM_SIZE, Networking, Transport, UdpTransport,
};
