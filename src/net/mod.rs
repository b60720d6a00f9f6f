//! Network stack: Ethernet/IPv4 wire formats, a UDP socket layer, and a
//! DHCP client built on top of it. There is no NIC driver and no ARP/TCP —
//! `ip::send`/`ip::receive` are the seam a real driver would plug into
//! later, via `ip::set_transmit_hook`.
//!
//! Feature-gated pieces:
//! - `net_udp` - the socket table (`udp::bind`/`send_to`/`recv_from`)
//! - `net_dhcp` - the DHCP client built on `net_udp` (enforced in Cargo.toml)

pub mod eth;
pub mod ethernet;
pub mod ip;
pub mod ipv4;

#[cfg(feature = "net_dhcp")]
pub mod dhcp;

#[cfg(feature = "net_udp")]
pub mod udp;

/// Brings up the link-layer/IP-layer defaults and, if enabled, starts DHCP
/// acquisition. Safe to call more than once.
pub fn init() {
    crate::kinfo!("net: link layer up, mac {}", eth::get_mac());

    #[cfg(feature = "net_dhcp")]
    dhcp::configure();

    #[cfg(not(feature = "net_dhcp"))]
    crate::kinfo!("net: dhcp disabled, no address configured");
}

/// Periodic polling hook (timer interrupt): drains queued DHCP replies and
/// advances its retransmission/renewal timers. There is no NIC to drain
/// received frames from yet; once one exists it feeds `ip::receive`.
pub fn poll() {
    #[cfg(feature = "net_dhcp")]
    dhcp::tick();
}
