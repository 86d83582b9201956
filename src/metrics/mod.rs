// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

//! Process-wide counters for transport events that are not part of any single
//! request's result, such as connections opened or redirects followed.

use metriken::Lazy;

#[rustfmt::skip]
macro_rules! counter {
    ($ident:ident, $name:tt) => {
        #[metriken::metric(
            name = $name,
            crate = metriken
        )]
        pub static $ident: Lazy<metriken::Counter> =
            metriken::Lazy::new(|| metriken::Counter::new());
    };
    ($ident:ident, $name:tt, $description:tt) => {
        #[metriken::metric(
            name = $name,
            description = $description,
            crate = metriken
        )]
        pub static $ident: Lazy<metriken::Counter> =
            metriken::Lazy::new(|| metriken::Counter::new());
    };
}

counter!(CONNECT, "client/connect/total", "connection attempts");
counter!(CONNECT_OK, "client/connect/ok");
counter!(
    CONNECT_EX,
    "client/connect/exception",
    "connection attempts that failed during resolve, connect, or handshake"
);

counter!(REQUEST, "client/request/total", "requests dispatched");
counter!(
    REQUEST_REDIRECT,
    "client/request/redirect",
    "redirects that were followed"
);

counter!(RESPONSE_OK, "client/response/ok");
counter!(RESPONSE_EX, "client/response/exception");
counter!(RESPONSE_TIMEOUT, "client/response/timeout");

counter!(
    SESSION_CLOSED_SERVER,
    "client/session/server_closed",
    "sessions closed because the server sent connection: close"
);

counter!(
    USER_AGENT_FEED_EX,
    "workload/user_agent_feed/exception",
    "user agent feed entries that could not be read or applied"
);
