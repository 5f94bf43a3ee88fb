#![allow(unused)]

use log::{debug, trace};

use jcre_core::{
    apdu::State, ApduSession, Error, Link, MemStore, Memory, SimTransport, Transport,
    DEFAULT_BUFFER_SIZE,
};

/// Initialise logging for test output
pub fn init_log() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Build a short form command APDU
pub fn short_apdu(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8], le: Option<u8>) -> Vec<u8> {
    assert!(data.len() <= 255, "short APDU data limited to 255 bytes");

    let mut f = vec![cla, ins, p1, p2];
    if !data.is_empty() {
        f.push(data.len() as u8);
        f.extend_from_slice(data);
    }
    if let Some(le) = le {
        f.push(le);
    }

    trace!("short apdu: {:02x?}", f);

    f
}

/// Build an extended length command APDU
pub fn extended_apdu(cla: u8, ins: u8, p1: u8, p2: u8, data: &[u8], le: Option<u16>) -> Vec<u8> {
    let mut f = vec![cla, ins, p1, p2, 0x00];
    if !data.is_empty() {
        f.extend_from_slice(&(data.len() as u16).to_be_bytes());
        f.extend_from_slice(data);
    }
    if let Some(le) = le {
        f.extend_from_slice(&le.to_be_bytes());
    }

    f
}

/// Deterministic test payload
pub fn payload(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

/// Zeroed APDU buffer of the default size
pub fn buffer() -> Vec<u8> {
    vec![0u8; DEFAULT_BUFFER_SIZE]
}

pub fn t0(frame: &[u8]) -> SimTransport {
    SimTransport::new(Link::t0(), frame)
}

pub fn t1(frame: &[u8]) -> SimTransport {
    SimTransport::new(Link::default(), frame)
}

/// Assert a sequence of observed states never moves backwards
pub fn assert_monotonic(states: &[State]) {
    debug!("states: {:?}", states);

    for w in states.windows(2) {
        assert!(w[0].can_advance_to(w[1]), "{} -> {}", w[0], w[1]);
    }
}

/// Snapshot of store contents
pub fn snapshot(mem: &Memory<MemStore>) -> Vec<u8> {
    mem.store().as_bytes().to_vec()
}
