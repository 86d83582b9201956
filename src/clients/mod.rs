// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

pub mod http1;

pub use http1::{Session, MAX_REDIRECTS};
