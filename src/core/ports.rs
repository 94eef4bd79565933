//! Application port draws.

use std::ops::Range;

use rand::Rng;

use crate::config::{DATABASE_REPLICAS, SessionConfig};

/// Range random application ports are drawn from.
pub const APP_PORT_RANGE: Range<u16> = 20_000..30_000;

/// Draws a random port from [`APP_PORT_RANGE`] that is not in `avoid`.
///
/// Passing the current port in `avoid` makes consecutive draws differ.
pub fn random_port(avoid: &[u16]) -> u16 {
    let mut rng = rand::rng();
    loop {
        let port = rng.random_range(APP_PORT_RANGE);
        if !avoid.contains(&port) {
            return port;
        }
    }
}

/// Ports the session listens on itself, which the app must never be given.
///
/// Covers the proxy, the secondary proxy, the debug port and every port a
/// locally managed database may use.
pub fn reserved_ports(cfg: &SessionConfig) -> Vec<u16> {
    let mut reserved = vec![cfg.proxy_port];
    reserved.extend(cfg.secondary_proxy_port);
    reserved.extend(cfg.debug_port);
    if cfg.database.is_managed() {
        let first = cfg.database_port();
        reserved.extend((0..DATABASE_REPLICAS).filter_map(|i| first.checked_add(i)));
    }
    reserved
}
