//! Topologie réseau locale.
//!
//! Une seule requête, partagée par les drivers : le choix de l'adresse IPv4
//! locale (servie aux appareils) et la liste des interfaces où rejoindre les
//! groupes multicast sortent d'ici.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use ipnetwork::IpNetwork;
use pnet_datalink::NetworkInterface;
use tracing::debug;

/// Couple (interface, adresse IPv4) utilisable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub multicast: bool,
}

/// Interfaces actives, hors loopback, triées par préférence
/// (192.168/16, 10/8, 172.16/12, autres, link-local).
pub fn usable_interfaces() -> Vec<LocalInterface> {
    let mut found = Vec::new();
    for iface in pnet_datalink::interfaces() {
        if !iface.is_up() || iface.is_loopback() || !is_running(&iface) {
            continue;
        }
        for ip in &iface.ips {
            if let IpNetwork::V4(v4) = ip {
                found.push(LocalInterface {
                    name: iface.name.clone(),
                    address: v4.ip(),
                    multicast: iface.is_multicast(),
                });
            }
        }
    }
    rank_interfaces(found)
}

/// Trie les interfaces par préférence ; l'ordre d'origine est conservé à rang
/// égal.
pub fn rank_interfaces(mut interfaces: Vec<LocalInterface>) -> Vec<LocalInterface> {
    interfaces.retain(|iface| !iface.address.is_loopback() && !iface.address.is_unspecified());
    interfaces.sort_by_key(|iface| address_rank(iface.address));
    interfaces
}

fn address_rank(address: Ipv4Addr) -> u8 {
    let octets = address.octets();
    match octets {
        [192, 168, ..] => 0,
        [10, ..] => 1,
        [172, second, ..] if (16..=31).contains(&second) => 2,
        _ if address.is_link_local() => 4,
        _ => 3,
    }
}

#[cfg(unix)]
fn is_running(iface: &NetworkInterface) -> bool {
    iface.is_running()
}

#[cfg(not(unix))]
fn is_running(_iface: &NetworkInterface) -> bool {
    true
}

/// Adresse IPv4 locale à annoncer aux appareils.
///
/// Première interface classée ; à défaut, l'adresse de la route par défaut
/// ([`guess_local_ip`]) ; à défaut, `127.0.0.1`.
pub fn primary_ipv4() -> Ipv4Addr {
    if let Some(iface) = usable_interfaces().into_iter().next() {
        debug!(interface = %iface.name, address = %iface.address, "Primary IPv4 selected");
        return iface.address;
    }
    match guess_local_ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => Ipv4Addr::LOCALHOST,
    }
}

/// Devine l'adresse IP locale via la route vers un serveur public.
///
/// Aucun paquet n'est émis : `connect` sur un socket UDP ne fait que choisir
/// l'interface de sortie. Retourne `127.0.0.1` en cas d'échec.
pub fn guess_local_ip() -> IpAddr {
    let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return fallback;
    };
    if socket.connect("8.8.8.8:80").is_err() {
        return fallback;
    }
    socket
        .local_addr()
        .map(|addr| addr.ip())
        .unwrap_or(fallback)
}

/// Toutes les adresses IPv4 de la machine, loopback comprise.
///
/// Sert à reconnaître l'écho de nos propres paquets multicast.
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addresses = vec![Ipv4Addr::LOCALHOST];
    for iface in pnet_datalink::interfaces() {
        for ip in iface.ips {
            if let IpNetwork::V4(v4) = ip {
                if !addresses.contains(&v4.ip()) {
                    addresses.push(v4.ip());
                }
            }
        }
    }
    addresses
}
