mod event_queue;
mod forwarding_log;
mod pending;

pub mod acs;
pub mod actions;
pub mod bundle;
pub mod cla;
pub mod config;
pub mod daemon;
pub mod event;
pub mod fragment;
pub mod link;
pub mod registration;
pub mod router;
pub mod store;
pub mod timer;


pub use event_queue::EventQueue;
pub use forwarding_log::{CustodyTimerSpec, ForwardingAction, ForwardingInfo, ForwardingLog, ForwardingState};

use hardy_bpv6::prelude as bpv6;
use std::sync::Arc;
use trace_err::*;
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "instrument")]
use tracing::instrument;
