//! Thin link-layer façade: the kernel's notion of "this machine's Ethernet
//! address". There is no NIC driver behind this yet; the
//! address is either supplied by `net::init` (future DMA/ACPI discovery) or
//! defaults to a locally-administered placeholder so the DHCP client has
//! something stable to put in `chaddr`.

use spin::Mutex;

pub use super::ethernet::{EtherType, EthernetFrame, EthernetFrameMut, EthernetHeader, MacAddress};

/// Locally administered, unicast: the `0x02` high bit of the first octet marks it as not
/// IEEE-assigned, avoiding collision with any real hardware address.
const DEFAULT_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x4e, 0x45, 0x58]);

static MAC: Mutex<MacAddress> = Mutex::new(DEFAULT_MAC);

pub fn get_mac() -> MacAddress {
    *MAC.lock()
}

pub fn set_mac(mac: MacAddress) {
    *MAC.lock() = mac;
}
