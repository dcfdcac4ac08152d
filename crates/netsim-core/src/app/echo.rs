//! UDP echo applications.

use std::net::SocketAddrV4;

use crate::app::{AppContext, Application};
use crate::packet::Packet;
use crate::units::{Bytes, Nanosecs, Secs};

/// Listens on `port` and sends every datagram back to where it came from.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct EchoServer {
    port: u16,
    #[new(default)]
    nr_echoed: u64,
}

impl EchoServer {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Application for EchoServer {
    fn name(&self) -> &'static str {
        "echo-server"
    }

    fn start(&mut self, ctx: &mut AppContext<'_>) {
        ctx.bind(self.port);
    }

    fn stop(&mut self, ctx: &mut AppContext<'_>) {
        ctx.unbind(self.port);
        log::debug!("echo server on node {} echoed {} packets", ctx.node(), self.nr_echoed);
    }

    fn on_receive(&mut self, packet: &Packet, ctx: &mut AppContext<'_>) {
        log::info!(
            "At time {}s server received {} bytes from {} port {}",
            ctx.now().as_secs_f64(),
            packet.size.into_u64(),
            packet.src.ip(),
            packet.src.port()
        );
        ctx.send_to(self.port, packet.src, packet.size);
        self.nr_echoed += 1;
        log::info!(
            "At time {}s server sent {} bytes to {} port {}",
            ctx.now().as_secs_f64(),
            packet.size.into_u64(),
            packet.src.ip(),
            packet.src.port()
        );
    }
}

/// Sends `max_packets` datagrams of `packet_size` bytes to `remote`, one every `interval`,
/// starting as soon as it is activated.
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct EchoClient {
    remote: SocketAddrV4,
    #[builder(default = 1)]
    max_packets: u32,
    #[builder(default = Nanosecs::from(Secs::new(1)), setter(into))]
    interval: Nanosecs,
    #[builder(default = Bytes::new(1024), setter(into))]
    packet_size: Bytes,
    #[builder(default, setter(skip))]
    local_port: Option<u16>,
    #[builder(default, setter(skip))]
    nr_sent: u32,
    #[builder(default, setter(skip))]
    nr_received: u32,
}

impl EchoClient {
    pub fn remote(&self) -> SocketAddrV4 {
        self.remote
    }

    pub fn nr_sent(&self) -> u32 {
        self.nr_sent
    }

    pub fn nr_received(&self) -> u32 {
        self.nr_received
    }

    fn send(&mut self, port: u16, ctx: &mut AppContext<'_>) {
        ctx.send_to(port, self.remote, self.packet_size);
        self.nr_sent += 1;
        log::info!(
            "At time {}s client sent {} bytes to {} port {}",
            ctx.now().as_secs_f64(),
            self.packet_size.into_u64(),
            self.remote.ip(),
            self.remote.port()
        );
        if self.nr_sent < self.max_packets {
            ctx.set_timer(self.interval, 0);
        }
    }
}

impl Application for EchoClient {
    fn name(&self) -> &'static str {
        "echo-client"
    }

    fn start(&mut self, ctx: &mut AppContext<'_>) {
        let port = ctx.bind_ephemeral();
        self.local_port = Some(port);
        if self.max_packets > 0 {
            self.send(port, ctx);
        }
    }

    fn stop(&mut self, ctx: &mut AppContext<'_>) {
        if let Some(port) = self.local_port.take() {
            ctx.unbind(port);
        }
    }

    fn on_timer(&mut self, _token: u64, ctx: &mut AppContext<'_>) {
        if let Some(port) = self.local_port {
            if self.nr_sent < self.max_packets {
                self.send(port, ctx);
            }
        }
    }

    fn on_receive(&mut self, packet: &Packet, ctx: &mut AppContext<'_>) {
        self.nr_received += 1;
        log::info!(
            "At time {}s client received {} bytes from {} port {}",
            ctx.now().as_secs_f64(),
            packet.size.into_u64(),
            packet.src.ip(),
            packet.src.port()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::app::AppCommand;
    use crate::network::types::NodeId;
    use crate::packet::PacketId;

    const SERVER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9);

    #[test]
    fn client_sends_then_rearms() {
        let mut client = EchoClient::builder()
            .remote(SERVER)
            .max_packets(2)
            .build();
        let mut port = 49153;
        let mut ctx = AppContext::new(Nanosecs::ZERO, NodeId::ZERO, &[], &mut port);
        client.start(&mut ctx);
        client.on_timer(0, &mut ctx);
        // The packet limit is reached, so neither this timer nor a stray one sends anything.
        client.on_timer(0, &mut ctx);
        client.stop(&mut ctx);
        let send = AppCommand::Send {
            src_port: 49153,
            dst: SERVER,
            size: Bytes::new(1024),
        };
        assert_eq!(
            ctx.into_commands(),
            vec![
                AppCommand::Bind { port: 49153 },
                send.clone(),
                AppCommand::SetTimer {
                    delay: Secs::new(1).into(),
                    token: 0
                },
                send,
                AppCommand::Unbind { port: 49153 },
            ]
        );
        assert_eq!(client.nr_sent(), 2);
    }

    #[test]
    fn server_echoes_to_sender() {
        let mut server = EchoServer::new(9);
        let mut port = 49153;
        let mut ctx = AppContext::new(Nanosecs::ZERO, NodeId::ZERO, &[], &mut port);
        let from = SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153);
        server.start(&mut ctx);
        server.on_receive(
            &Packet {
                id: PacketId::ZERO,
                src: from,
                dst: SERVER,
                size: Bytes::new(512),
            },
            &mut ctx,
        );
        assert_eq!(
            ctx.into_commands(),
            vec![
                AppCommand::Bind { port: 9 },
                AppCommand::Send {
                    src_port: 9,
                    dst: from,
                    size: Bytes::new(512)
                },
            ]
        );
    }
}
