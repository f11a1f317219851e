//! Assertion macros shared by test helpers and integration tests.

/// Await a bridge handle's report and panic with contextual diagnostics on
/// failure.
#[macro_export]
macro_rules! join_expect {
    ($handle:expr) => {{
        $handle
            .join()
            .await
            .expect(concat!("bridge join failed at ", file!(), ":", line!()))
    }};
    ($handle:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $handle.join().await.expect(&m)
    }};
}

/// Await the next message from an output queue within five seconds and panic
/// with contextual diagnostics on timeout or a closed queue.
#[macro_export]
macro_rules! recv_expect {
    ($output:expr) => {{
        ::tokio::time::timeout(::std::time::Duration::from_secs(5), $output.recv())
            .await
            .expect(concat!("recv timed out at ", file!(), ":", line!()))
            .expect(concat!("output closed at ", file!(), ":", line!()))
    }};
}

pub use crate::{join_expect, recv_expect};
