//! Send/Sync guarantees for core types.

use ephemeral_socket::{
    ClientSnapshot, EphemeralSocket, EphemeralSocketBuilder, SocketConfig, SocketOptions,
    rate_limited_warner::RateLimitedWarner, socket::ActiveConnection,
};
use rstest::rstest;
use static_assertions::assert_impl_all;

#[rstest]
fn configuration_is_send_sync() {
    assert_impl_all!(EphemeralSocketBuilder: Send, Sync);
    assert_impl_all!(SocketOptions: Send, Sync);
    assert_impl_all!(SocketConfig: Send, Sync);
}

#[rstest]
fn client_is_send_sync() {
    assert_impl_all!(EphemeralSocket: Send, Sync);
    assert_impl_all!(RateLimitedWarner: Send, Sync);
    assert_impl_all!(ClientSnapshot: Send, Sync);
    assert_impl_all!(ActiveConnection: Send);
}
