//! Sockets UDP des drivers de découverte.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use castitutils::LocalInterface;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

/// Socket UDP IPv4 lié à `0.0.0.0:port`, avec réutilisation d'adresse (et
/// de port sur unix) pour cohabiter avec d'autres répondeurs mDNS.
pub(crate) fn bind_reusable(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true)?;

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_multicast_loop_v4(true)?;
    Ok(socket)
}

/// Rejoint `group` sur chaque interface donnée.
///
/// Les échecs par interface sont journalisés ; si aucune adhésion ne réussit,
/// une adhésion sans interface (choix du noyau) est tentée. Retourne le
/// nombre d'adhésions réussies, ou l'erreur de ce dernier essai.
pub(crate) fn join_group(
    socket: &UdpSocket,
    group: Ipv4Addr,
    interfaces: &[LocalInterface],
) -> io::Result<usize> {
    let mut joined = 0;
    for iface in interfaces {
        match socket.join_multicast_v4(&group, &iface.address) {
            Ok(()) => {
                debug!("joined {} on {} ({})", group, iface.name, iface.address);
                joined += 1;
            }
            Err(e) => {
                warn!("failed to join {} on {} ({}): {}", group, iface.name, iface.address, e);
            }
        }
    }
    if joined > 0 {
        return Ok(joined);
    }

    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    debug!("joined {} on the default interface", group);
    Ok(1)
}

pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
