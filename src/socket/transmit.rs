//! Newline-delimited batch encoding and the debug wire echo.

use log::info;

/// Log target used for the debug echo of outgoing payloads.
pub const WIRE_TARGET: &str = "ephemeral_socket::wire";

/// Join messages with `\n`, terminating the last one as well so that
/// consecutive writes coalesced by the transport stay separable.
pub fn encode_batch<S: AsRef<str>>(batch: &[S]) -> Vec<u8> {
    let capacity = batch.iter().map(|m| m.as_ref().len() + 1).sum();
    let mut payload = Vec::with_capacity(capacity);
    for message in batch {
        payload.extend_from_slice(message.as_ref().as_bytes());
        payload.push(b'\n');
    }
    payload
}

/// Echo a payload that has just been written to the wire.
pub(crate) fn echo_payload(payload: &[u8]) {
    info!(target: WIRE_TARGET, "{}", String::from_utf8_lossy(payload));
}
