use super::*;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// The administrative endpoint of this node.
    #[cfg_attr(feature = "serde", serde(default = "default_local_eid"))]
    pub local_eid: bpv6::Eid,

    /// Generate status reports when bundles request them.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub status_reports: bool,

    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub accept_custody: bool,

    /// Drop a received bundle that duplicates one already held.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub suppress_duplicates: bool,

    /// Treat a send on a reliable link that was never acknowledged as a
    /// failure, so the bundle is sent again.
    #[cfg_attr(feature = "serde", serde(default = "default_true"))]
    pub retry_reliable_unacked: bool,

    pub custody_timer: CustodyTimerSpec,

    pub acs: acs::Config,

    pub metadata_length_mode: bpv6::MetadataLengthMode,

    /// How long a stage waits on its queue before checking for shutdown.
    #[cfg_attr(feature = "serde", serde(default = "default_event_wait"))]
    pub event_wait_ms: u64,

    /// Largest original payload, in bytes, that fragments are reassembled
    /// into. Fragments of anything larger are deleted.
    #[cfg_attr(feature = "serde", serde(default = "default_max_reassembly_length"))]
    pub max_reassembly_length: u64,

    /// Lifetime of generated aggregate custody signals, in seconds.
    #[cfg_attr(feature = "serde", serde(default = "default_admin_expiration"))]
    pub admin_expiration: u64,
}

fn default_local_eid() -> bpv6::Eid {
    "dtn://local".parse().trace_expect("Invalid default local EID")
}

#[cfg(feature = "serde")]
fn default_true() -> bool {
    true
}

fn default_event_wait() -> u64 {
    100
}

fn default_max_reassembly_length() -> u64 {
    fragment::DEFAULT_MAX_REASSEMBLY_LENGTH
}

fn default_admin_expiration() -> u64 {
    86400
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_eid: default_local_eid(),
            status_reports: true,
            accept_custody: true,
            suppress_duplicates: true,
            retry_reliable_unacked: true,
            custody_timer: CustodyTimerSpec::default(),
            acs: acs::Config::default(),
            metadata_length_mode: bpv6::MetadataLengthMode::default(),
            event_wait_ms: default_event_wait(),
            max_reassembly_length: default_max_reassembly_length(),
            admin_expiration: default_admin_expiration(),
        }
    }
}
