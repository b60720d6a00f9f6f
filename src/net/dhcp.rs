//! DHCP client state machine: a kernel-resident client driven by `tick()`
//! rather than blocking `recvfrom` calls, so lease acquisition and renewal
//! progress a step at a time from the scheduler's periodic poll instead of
//! parking a thread on the network round trip.
//!
//! `DhcpPacket` and the option encode/decode helpers mirror the wire
//! format directly; init/selecting/requesting/bound/renewing/rebinding is
//! the state machine that drives them.

extern crate alloc;

use core::mem;

use spin::Mutex;

use super::eth::MacAddress;
use super::ip::Ipv4Address;
use super::udp::{self, SocketHandle};
use crate::config::{DHCP_INITIAL_TIMEOUT_MS, DHCP_MAX_RETRIES};

const SERVER_PORT: u16 = 67;
const CLIENT_PORT: u16 = 68;

const OP_BOOTREQUEST: u8 = 1;
const OP_BOOTREPLY: u8 = 2;
const HTYPE_ETHER: u8 = 1;
const HLEN_ETHER: u8 = 6;
const MAGIC_COOKIE: u32 = 0x6382_5363;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_REQUESTED_IP: u8 = 50;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MSG_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_PARAM_REQ_LIST: u8 = 55;
const OPT_RENEWAL_TIME: u8 = 58;
const OPT_REBINDING_TIME: u8 = 59;
const OPT_END: u8 = 255;

const MSG_DISCOVER: u8 = 1;
const MSG_OFFER: u8 = 2;
const MSG_REQUEST: u8 = 3;
const MSG_DECLINE: u8 = 4;
const MSG_ACK: u8 = 5;
const MSG_NAK: u8 = 6;
const MSG_RELEASE: u8 = 7;

const OPTIONS_SIZE: usize = 64;
const PACKET_SIZE: usize = 236 + 4 + OPTIONS_SIZE;

/// Fixed-format DHCP/BOOTP packet.
#[repr(C, packed)]
struct DhcpPacket {
    op: u8,
    htype: u8,
    hlen: u8,
    hops: u8,
    xid: u32,
    secs: u16,
    flags: u16,
    ciaddr: u32,
    yiaddr: u32,
    siaddr: u32,
    giaddr: u32,
    chaddr: [u8; 16],
    sname: [u8; 64],
    file: [u8; 128],
    magic: u32,
    options: [u8; OPTIONS_SIZE],
}

const _: () = assert!(mem::size_of::<DhcpPacket>() == PACKET_SIZE);

fn new_request_packet(xid: u32, mac: MacAddress) -> DhcpPacket {
    let mut chaddr = [0u8; 16];
    chaddr[..6].copy_from_slice(mac.as_bytes());
    DhcpPacket {
        op: OP_BOOTREQUEST,
        htype: HTYPE_ETHER,
        hlen: HLEN_ETHER,
        hops: 0,
        xid: xid.to_be(),
        secs: 0,
        flags: 0x8000u16.to_be(), // broadcast flag: we can't receive unicast pre-lease
        ciaddr: 0,
        yiaddr: 0,
        siaddr: 0,
        giaddr: 0,
        chaddr,
        sname: [0; 64],
        file: [0; 128],
        magic: MAGIC_COOKIE.to_be(),
        options: [OPT_PAD; OPTIONS_SIZE],
    }
}

/// Appends a TLV option at the first `OPT_END`/pad run, following the
/// userspace script's `add_option` scan-then-insert approach.
fn add_option(options: &mut [u8; OPTIONS_SIZE], code: u8, data: &[u8]) -> bool {
    let mut i = 0;
    while i < OPTIONS_SIZE {
        if options[i] == OPT_PAD {
            break;
        }
        i += 1;
    }
    let needed = 2 + data.len();
    if i + needed + 1 > OPTIONS_SIZE {
        return false;
    }
    options[i] = code;
    options[i + 1] = data.len() as u8;
    options[i + 2..i + 2 + data.len()].copy_from_slice(data);
    options[i + 2 + data.len()] = OPT_END;
    true
}

fn find_option(options: &[u8], code: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < options.len() {
        let opt_code = options[i];
        if opt_code == OPT_END {
            break;
        }
        if opt_code == OPT_PAD {
            i += 1;
            continue;
        }
        if i + 1 >= options.len() {
            break;
        }
        let len = options[i + 1] as usize;
        if i + 2 + len > options.len() {
            break;
        }
        let data = &options[i + 2..i + 2 + len];
        if opt_code == code {
            return Some(data);
        }
        i += 2 + len;
    }
    None
}

fn packet_as_bytes(packet: &DhcpPacket) -> &[u8] {
    unsafe {
        core::slice::from_raw_parts(packet as *const DhcpPacket as *const u8, PACKET_SIZE)
    }
}

fn build_discover(xid: u32, mac: MacAddress) -> DhcpPacket {
    let mut packet = new_request_packet(xid, mac);
    add_option(&mut packet.options, OPT_MSG_TYPE, &[MSG_DISCOVER]);
    add_option(&mut packet.options, OPT_PARAM_REQ_LIST, &[OPT_SUBNET_MASK, OPT_ROUTER, OPT_DNS]);
    packet
}

fn build_request(xid: u32, mac: MacAddress, requested_ip: Option<Ipv4Address>, server_id: Option<Ipv4Address>, ciaddr: Option<Ipv4Address>) -> DhcpPacket {
    let mut packet = new_request_packet(xid, mac);
    if let Some(addr) = ciaddr {
        packet.ciaddr = u32::from_be_bytes(*addr.as_bytes()).to_be();
    }
    add_option(&mut packet.options, OPT_MSG_TYPE, &[MSG_REQUEST]);
    if let Some(addr) = requested_ip {
        add_option(&mut packet.options, OPT_REQUESTED_IP, addr.as_bytes());
    }
    if let Some(addr) = server_id {
        add_option(&mut packet.options, OPT_SERVER_ID, addr.as_bytes());
    }
    add_option(&mut packet.options, OPT_PARAM_REQ_LIST, &[OPT_SUBNET_MASK, OPT_ROUTER, OPT_DNS]);
    packet
}

fn build_release(xid: u32, mac: MacAddress, ciaddr: Ipv4Address, server_id: Ipv4Address) -> DhcpPacket {
    let mut packet = new_request_packet(xid, mac);
    packet.ciaddr = u32::from_be_bytes(*ciaddr.as_bytes()).to_be();
    add_option(&mut packet.options, OPT_MSG_TYPE, &[MSG_RELEASE]);
    add_option(&mut packet.options, OPT_SERVER_ID, server_id.as_bytes());
    packet
}

/// Lease terms handed back by the server.
#[derive(Debug, Clone, Copy)]
pub struct DhcpLease {
    pub address: Ipv4Address,
    pub netmask: Ipv4Address,
    pub gateway: Option<Ipv4Address>,
    pub dns: Option<Ipv4Address>,
    pub server_id: Ipv4Address,
    pub lease_time_s: u32,
    pub renewal_time_s: u32,
    pub rebind_time_s: u32,
}

fn parse_offer_or_ack(options: &[u8]) -> Option<(u8, Ipv4Address, Option<DhcpLease>, Ipv4Address)> {
    let msg_type = *find_option(options, OPT_MSG_TYPE)?.first()?;
    let server_id = find_option(options, OPT_SERVER_ID)
        .filter(|d| d.len() == 4)
        .map(Ipv4Address::from)
        .unwrap_or(Ipv4Address::UNSPECIFIED);
    Some((msg_type, server_id, None, server_id))
}

fn lease_from_ack(yiaddr: Ipv4Address, options: &[u8], server_id: Ipv4Address) -> DhcpLease {
    let netmask = find_option(options, OPT_SUBNET_MASK)
        .filter(|d| d.len() == 4)
        .map(Ipv4Address::from)
        .unwrap_or(Ipv4Address::new(255, 255, 255, 0));
    let gateway = find_option(options, OPT_ROUTER)
        .filter(|d| d.len() >= 4)
        .map(|d| Ipv4Address::from(&d[..4]));
    let dns = find_option(options, OPT_DNS)
        .filter(|d| d.len() >= 4)
        .map(|d| Ipv4Address::from(&d[..4]));
    let lease_time_s = find_option(options, OPT_LEASE_TIME)
        .filter(|d| d.len() == 4)
        .map(|d| u32::from_be_bytes([d[0], d[1], d[2], d[3]]))
        .unwrap_or(DEFAULT_LEASE_SECONDS);
    let renewal_time_s = find_option(options, OPT_RENEWAL_TIME)
        .filter(|d| d.len() == 4)
        .map(|d| u32::from_be_bytes([d[0], d[1], d[2], d[3]]))
        .unwrap_or(lease_time_s / 2);
    let rebind_time_s = find_option(options, OPT_REBINDING_TIME)
        .filter(|d| d.len() == 4)
        .map(|d| u32::from_be_bytes([d[0], d[1], d[2], d[3]]))
        .unwrap_or(lease_time_s * 7 / 8);
    DhcpLease {
        address: yiaddr,
        netmask,
        gateway,
        dns,
        server_id,
        lease_time_s,
        renewal_time_s,
        rebind_time_s,
    }
}

const DEFAULT_LEASE_SECONDS: u32 = 24 * 3600;

/// Client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    Init,
    Selecting,
    Requesting,
    Bound,
    Renewing,
    Rebinding,
}

struct Client {
    state: DhcpState,
    socket: Option<SocketHandle>,
    xid: u32,
    retries: u32,
    timeout_ms: u64,
    next_deadline_ms: u64,
    lease: Option<DhcpLease>,
    offered_server_id: Ipv4Address,
}

impl Client {
    const fn new() -> Self {
        Self {
            state: DhcpState::Init,
            socket: None,
            xid: 0,
            retries: 0,
            timeout_ms: DHCP_INITIAL_TIMEOUT_MS,
            next_deadline_ms: 0,
            lease: None,
            offered_server_id: Ipv4Address::UNSPECIFIED,
        }
    }
}

static CLIENT: Mutex<Client> = Mutex::new(Client::new());

fn next_xid() -> u32 {
    // No hardware RNG wired up yet; the monotonic tick counter is unique
    // per boot, which is all a BOOTP transaction id needs to be.
    crate::mm::timer::now_ms() as u32 ^ 0xA5A5_5A5A
}

fn ensure_socket(client: &mut Client) -> udp::UdpResult<SocketHandle> {
    if let Some(handle) = client.socket {
        return Ok(handle);
    }
    let handle = udp::bind(CLIENT_PORT)?;
    client.socket = Some(handle);
    Ok(handle)
}

fn send_packet(client: &mut Client, packet: &DhcpPacket) {
    let Ok(handle) = ensure_socket(client) else {
        crate::kerror!("net::dhcp: failed to bind client port {}", CLIENT_PORT);
        return;
    };
    let bytes = packet_as_bytes(packet);
    if let Err(e) = udp::send_to(handle, Ipv4Address::BROADCAST, SERVER_PORT, bytes) {
        crate::kwarn!("net::dhcp: send failed: {}", e);
    }
}

/// Starts (or restarts) acquisition: broadcasts DISCOVER and moves to
/// `Selecting`.
pub fn configure() {
    let mut client = CLIENT.lock();
    client.state = DhcpState::Selecting;
    client.xid = next_xid();
    client.retries = 0;
    client.timeout_ms = DHCP_INITIAL_TIMEOUT_MS;
    client.next_deadline_ms = crate::mm::timer::now_ms() + client.timeout_ms;
    let packet = build_discover(client.xid, super::eth::get_mac());
    send_packet(&mut client, &packet);
    crate::kinfo!("net::dhcp: DISCOVER sent (xid {:#x})", client.xid);
}

/// Sends DHCPRELEASE for the current lease (if any) and returns to `Init`.
pub fn release() {
    let mut client = CLIENT.lock();
    if let Some(lease) = client.lease {
        let xid = next_xid();
        let packet = build_release(xid, super::eth::get_mac(), lease.address, lease.server_id);
        send_packet(&mut client, &packet);
    }
    if let Some(handle) = client.socket.take() {
        let _ = udp::close(handle);
    }
    client.state = DhcpState::Init;
    client.lease = None;
    super::ip::set_addr(Ipv4Address::UNSPECIFIED);
}

pub fn state() -> DhcpState {
    CLIENT.lock().state
}

pub fn lease() -> Option<DhcpLease> {
    CLIENT.lock().lease
}

fn apply_lease(lease: &DhcpLease) {
    super::ip::set_addr(lease.address);
    super::ip::set_netmask(lease.netmask);
    if let Some(gw) = lease.gateway {
        super::ip::set_gateway(gw);
    }
    crate::kinfo!(
        "net::dhcp: bound {} netmask {} (lease {}s)",
        lease.address,
        lease.netmask,
        lease.lease_time_s
    );
}

fn handle_incoming(client: &mut Client, packet: &[u8]) {
    if packet.len() < 236 + 4 {
        return;
    }
    let magic = u32::from_be_bytes([packet[236], packet[237], packet[238], packet[239]]);
    if magic != MAGIC_COOKIE {
        return;
    }
    let xid = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
    if xid != client.xid {
        return;
    }
    if packet[28..34] != *super::eth::get_mac().as_bytes() {
        return;
    }
    let yiaddr = Ipv4Address::from(&packet[16..20]);
    let options = &packet[240..];

    let Some(msg_type) = find_option(options, OPT_MSG_TYPE).and_then(|d| d.first().copied()) else {
        return;
    };

    match (client.state, msg_type) {
        (DhcpState::Selecting, MSG_OFFER) => {
            let server_id = find_option(options, OPT_SERVER_ID)
                .filter(|d| d.len() == 4)
                .map(Ipv4Address::from)
                .unwrap_or(Ipv4Address::UNSPECIFIED);
            client.offered_server_id = server_id;
            client.state = DhcpState::Requesting;
            client.retries = 0;
            client.timeout_ms = DHCP_INITIAL_TIMEOUT_MS;
            client.next_deadline_ms = crate::mm::timer::now_ms() + client.timeout_ms;
            let packet = build_request(client.xid, super::eth::get_mac(), Some(yiaddr), Some(server_id), None);
            send_packet(client, &packet);
            crate::kinfo!("net::dhcp: OFFER {} from {}, REQUEST sent", yiaddr, server_id);
        }
        (DhcpState::Requesting, MSG_ACK)
        | (DhcpState::Renewing, MSG_ACK)
        | (DhcpState::Rebinding, MSG_ACK) => {
            let lease = lease_from_ack(yiaddr, options, client.offered_server_id);
            client.lease = Some(lease);
            client.state = DhcpState::Bound;
            client.retries = 0;
            client.next_deadline_ms =
                crate::mm::timer::now_ms() + (lease.renewal_time_s as u64) * 1000;
            apply_lease(&lease);
        }
        (DhcpState::Requesting, MSG_NAK)
        | (DhcpState::Renewing, MSG_NAK)
        | (DhcpState::Rebinding, MSG_NAK) => {
            crate::kwarn!("net::dhcp: NAK received, restarting acquisition");
            drop_lease_and_restart(client);
        }
        _ => {}
    }
}

fn drop_lease_and_restart(client: &mut Client) {
    client.lease = None;
    super::ip::set_addr(Ipv4Address::UNSPECIFIED);
    client.state = DhcpState::Selecting;
    client.xid = next_xid();
    client.retries = 0;
    client.timeout_ms = DHCP_INITIAL_TIMEOUT_MS;
    client.next_deadline_ms = crate::mm::timer::now_ms() + client.timeout_ms;
    let packet = build_discover(client.xid, super::eth::get_mac());
    send_packet(client, &packet);
}

fn handle_timeout(client: &mut Client) {
    match client.state {
        DhcpState::Selecting | DhcpState::Requesting => {
            client.retries += 1;
            if client.retries > DHCP_MAX_RETRIES {
                crate::kwarn!("net::dhcp: giving up after {} retries", client.retries);
                client.state = DhcpState::Init;
                return;
            }
            client.timeout_ms = client.timeout_ms.saturating_mul(2);
            client.next_deadline_ms = crate::mm::timer::now_ms() + client.timeout_ms;
            client.xid = next_xid();
            let packet = build_discover(client.xid, super::eth::get_mac());
            send_packet(client, &packet);
        }
        DhcpState::Bound => {
            if let Some(lease) = client.lease {
                client.state = DhcpState::Renewing;
                client.xid = next_xid();
                client.next_deadline_ms =
                    crate::mm::timer::now_ms() + (lease.rebind_time_s - lease.renewal_time_s) as u64 * 1000;
                let packet = build_request(client.xid, super::eth::get_mac(), None, None, Some(lease.address));
                send_packet(client, &packet);
            }
        }
        DhcpState::Renewing => {
            if let Some(lease) = client.lease {
                client.state = DhcpState::Rebinding;
                client.xid = next_xid();
                client.next_deadline_ms =
                    crate::mm::timer::now_ms() + (lease.lease_time_s - lease.rebind_time_s) as u64 * 1000;
                let packet = build_request(client.xid, super::eth::get_mac(), None, None, Some(lease.address));
                send_packet(client, &packet);
            }
        }
        DhcpState::Rebinding => {
            crate::kwarn!("net::dhcp: lease expired without renewal, restarting");
            drop_lease_and_restart(client);
        }
        DhcpState::Init => {}
    }
}

/// Drains any pending replies and advances retransmission/renewal timers.
/// Called periodically from `net::poll`.
pub fn tick() {
    let mut client = CLIENT.lock();
    if client.state == DhcpState::Init {
        return;
    }
    let Some(handle) = client.socket else { return };

    let mut buf = [0u8; PACKET_SIZE];
    loop {
        match udp::recv_from(handle, &mut buf) {
            Ok((0, _, _)) => break,
            Ok((n, _src, _port)) => handle_incoming(&mut client, &buf[..n.min(buf.len())]),
            Err(_) => break,
        }
    }

    if crate::mm::timer::now_ms() >= client.next_deadline_ms {
        handle_timeout(&mut client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find_option_roundtrip() {
        let mut options = [OPT_PAD; OPTIONS_SIZE];
        assert!(add_option(&mut options, OPT_MSG_TYPE, &[MSG_DISCOVER]));
        assert!(add_option(&mut options, OPT_REQUESTED_IP, &[10, 0, 0, 5]));
        assert_eq!(find_option(&options, OPT_MSG_TYPE), Some(&[MSG_DISCOVER][..]));
        assert_eq!(find_option(&options, OPT_REQUESTED_IP), Some(&[10, 0, 0, 5][..]));
        assert_eq!(find_option(&options, OPT_ROUTER), None);
    }

    #[test]
    fn packet_size_matches_wire_format() {
        assert_eq!(mem::size_of::<DhcpPacket>(), PACKET_SIZE);
    }

    #[test]
    fn lease_defaults_derive_from_lease_time() {
        let mut options = [OPT_PAD; OPTIONS_SIZE];
        add_option(&mut options, OPT_LEASE_TIME, &3600u32.to_be_bytes());
        let lease = lease_from_ack(Ipv4Address::new(10, 0, 0, 5), &options, Ipv4Address::UNSPECIFIED);
        assert_eq!(lease.lease_time_s, 3600);
        assert_eq!(lease.renewal_time_s, 1800);
        assert_eq!(lease.rebind_time_s, 3150);
    }
}
