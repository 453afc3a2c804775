//! Port occupancy checks used for start warnings and status display.

use std::net::TcpListener;

/// True if something is bound to `port` on either loopback or the wildcard
/// address. Some platforms let 127.0.0.1 bind while 0.0.0.0 is taken, so
/// both are tried.
pub fn port_in_use(port: u16) -> bool {
    let localhost_free = TcpListener::bind(("127.0.0.1", port)).is_ok();
    let any_free = TcpListener::bind(("0.0.0.0", port)).is_ok();
    !(localhost_free && any_free)
}
