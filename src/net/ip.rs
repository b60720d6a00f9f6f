//! Narrow IPv4 façade: address/netmask/gateway configuration
//! and a single `send` entry point that `udp`/`dhcp` hand fully-formed
//! payloads to. There is no routing, fragmentation or ARP here — those are
//! explicit Non-goals; this is exactly as much IP as a UDP-only, DHCP-only
//! kernel needs.
//!
//! Framing is stubbed rather than driven by a real NIC: `transmit` builds
//! the IPv4 header and hands the finished packet to a pluggable hook
//! (`set_transmit_hook`), which defaults to a no-op that logs and reports
//! success. Swapping in a real driver later means calling
//! `set_transmit_hook` once at boot, not touching `udp`/`dhcp`.

use spin::Mutex;

pub use super::ipv4::{calculate_checksum, IpProtocol, Ipv4Address, Ipv4Header, Ipv4PacketMut};

struct IpConfig {
    address: Ipv4Address,
    netmask: Ipv4Address,
    gateway: Ipv4Address,
}

static CONFIG: Mutex<IpConfig> = Mutex::new(IpConfig {
    address: Ipv4Address::UNSPECIFIED,
    netmask: Ipv4Address::UNSPECIFIED,
    gateway: Ipv4Address::UNSPECIFIED,
});

pub type TransmitHook = fn(dest: Ipv4Address, packet: &[u8]) -> i32;

fn default_transmit(dest: Ipv4Address, packet: &[u8]) -> i32 {
    crate::kdebug!("net::ip: stub transmit {} bytes to {}", packet.len(), dest);
    0
}

static TRANSMIT_HOOK: Mutex<TransmitHook> = Mutex::new(default_transmit);

pub fn set_transmit_hook(hook: TransmitHook) {
    *TRANSMIT_HOOK.lock() = hook;
}

pub fn get_addr() -> Ipv4Address {
    CONFIG.lock().address
}

pub fn set_addr(addr: Ipv4Address) {
    CONFIG.lock().address = addr;
}

pub fn get_netmask() -> Ipv4Address {
    CONFIG.lock().netmask
}

pub fn set_netmask(mask: Ipv4Address) {
    CONFIG.lock().netmask = mask;
}

pub fn get_gateway() -> Ipv4Address {
    CONFIG.lock().gateway
}

pub fn set_gateway(gw: Ipv4Address) {
    CONFIG.lock().gateway = gw;
}

/// Maximum UDP/IP payload this façade will frame.
pub const MAX_PACKET_SIZE: usize = crate::config::UDP_MAX_PAYLOAD + Ipv4Header::MIN_SIZE + 32;

/// Wraps `payload` in an IPv4 header addressed to `dest` and hands it to
/// the transmit hook. Returns the hook's result (0 on success, negative on
/// failure); `-1` if `payload` doesn't fit `MAX_PACKET_SIZE`.
pub fn send(dest: Ipv4Address, protocol: IpProtocol, payload: &[u8]) -> i32 {
    if payload.len() + Ipv4Header::MIN_SIZE > MAX_PACKET_SIZE {
        return -1;
    }
    let mut buf = [0u8; MAX_PACKET_SIZE];
    let total = Ipv4Header::MIN_SIZE + payload.len();
    {
        let mut packet = match Ipv4PacketMut::new(&mut buf[..total]) {
            Some(p) => p,
            None => return -1,
        };
        let src = get_addr();
        packet.set_header(src, dest, protocol, 64, payload.len());
        packet.payload_mut().copy_from_slice(payload);
    }
    let hook = *TRANSMIT_HOOK.lock();
    hook(dest, &buf[..total])
}

/// Called by the (stub) receive path once a frame has been identified as
/// IPv4: validates the header and hands the payload to the protocol
/// dispatcher (today, only UDP).
pub fn receive(packet: &[u8]) {
    let Some(parsed) = super::ipv4::Ipv4Packet::new(packet) else {
        crate::kdebug!("net::ip: dropping malformed IPv4 packet ({} bytes)", packet.len());
        return;
    };
    match parsed.protocol() {
        IpProtocol::UDP => super::udp::udp_input(parsed.src_addr(), parsed.dst_addr(), parsed.payload()),
        other => crate::ktrace!("net::ip: dropping unsupported protocol {:?}", other),
    }
}
