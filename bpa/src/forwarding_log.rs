/// What a link was asked to do with a bundle.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForwardingAction {
    /// Forward the bundle, handing on responsibility for it.
    #[default]
    Forward,
    /// Send a copy, keeping the bundle here.
    Copy,
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ForwardingState {
    #[default]
    None,
    Queued,
    Transmitted,
    TransmitFailed,
    Cancelled,
    CustodyTimeout,
    Delivered,
    Suppressed,
    Received,
}

impl std::fmt::Display for ForwardingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ForwardingState::None => "NONE",
            ForwardingState::Queued => "QUEUED",
            ForwardingState::Transmitted => "TRANSMITTED",
            ForwardingState::TransmitFailed => "TRANSMIT_FAILED",
            ForwardingState::Cancelled => "CANCELLED",
            ForwardingState::CustodyTimeout => "CUSTODY_TIMEOUT",
            ForwardingState::Delivered => "DELIVERED",
            ForwardingState::Suppressed => "SUPPRESSED",
            ForwardingState::Received => "RECEIVED",
        })
    }
}

/// How long to wait for a custody signal after transmission.
///
/// The timeout is `min` seconds plus `lifetime_pct` percent of the bundle
/// lifetime, capped at `max` seconds unless `max` is 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CustodyTimerSpec {
    pub min: u64,
    pub lifetime_pct: u64,
    pub max: u64,
}

impl Default for CustodyTimerSpec {
    fn default() -> Self {
        Self {
            min: 30 * 60,
            lifetime_pct: 25,
            max: 0,
        }
    }
}

impl CustodyTimerSpec {
    pub fn timeout(&self, expiration: u64) -> std::time::Duration {
        let mut secs = self
            .min
            .saturating_add(self.lifetime_pct.saturating_mul(expiration) / 100);
        if self.max != 0 {
            secs = secs.min(self.max);
        }
        std::time::Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone)]
pub struct ForwardingInfo {
    /// The link, or registration, the entry refers to.
    pub link: String,
    pub action: ForwardingAction,
    pub state: ForwardingState,
    pub timestamp: time::OffsetDateTime,
    pub custody_spec: CustodyTimerSpec,
}

/// The append-only history of what happened to a bundle on each link.
#[derive(Default, Debug, Clone)]
pub struct ForwardingLog {
    entries: Vec<ForwardingInfo>,
}

impl ForwardingLog {
    pub fn add(
        &mut self,
        link: &str,
        action: ForwardingAction,
        state: ForwardingState,
        custody_spec: CustodyTimerSpec,
    ) {
        self.entries.push(ForwardingInfo {
            link: link.to_string(),
            action,
            state,
            timestamp: time::OffsetDateTime::now_utc(),
            custody_spec,
        });
    }

    pub fn latest(&self, link: &str) -> Option<&ForwardingInfo> {
        self.entries.iter().rev().find(|e| e.link == link)
    }

    pub fn latest_state(&self, link: &str) -> ForwardingState {
        self.latest(link).map(|e| e.state).unwrap_or_default()
    }

    /// Moves the latest entry for `link` to `state`, returning false if there
    /// is no entry for the link.
    pub fn update(&mut self, link: &str, state: ForwardingState) -> bool {
        match self.entries.iter_mut().rev().find(|e| e.link == link) {
            Some(entry) => {
                entry.state = state;
                entry.timestamp = time::OffsetDateTime::now_utc();
                true
            }
            None => false,
        }
    }

    /// The number of links whose latest entry is in one of `states`.
    pub fn count(&self, states: &[ForwardingState]) -> usize {
        let mut seen = Vec::new();
        self.entries
            .iter()
            .rev()
            .filter(|e| {
                if seen.contains(&e.link.as_str()) {
                    false
                } else {
                    seen.push(e.link.as_str());
                    states.contains(&e.state)
                }
            })
            .count()
    }

    pub fn entries(&self) -> &[ForwardingInfo] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_entry_per_link() {
        let mut log = ForwardingLog::default();
        assert_eq!(log.latest_state("a"), ForwardingState::None);

        log.add("a", ForwardingAction::Forward, ForwardingState::Queued, CustodyTimerSpec::default());
        log.add("b", ForwardingAction::Copy, ForwardingState::Queued, CustodyTimerSpec::default());
        assert!(log.update("a", ForwardingState::TransmitFailed));
        log.add("a", ForwardingAction::Forward, ForwardingState::Queued, CustodyTimerSpec::default());
        assert!(log.update("a", ForwardingState::Transmitted));

        assert_eq!(log.latest_state("a"), ForwardingState::Transmitted);
        assert_eq!(log.latest_state("b"), ForwardingState::Queued);
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.entries()[0].state, ForwardingState::TransmitFailed);
        assert!(!log.update("c", ForwardingState::Transmitted));

        assert_eq!(log.count(&[ForwardingState::Queued]), 1);
        assert_eq!(
            log.count(&[ForwardingState::Queued, ForwardingState::Transmitted]),
            2
        );
    }

    #[test]
    fn custody_timeout() {
        let spec = CustodyTimerSpec {
            min: 10,
            lifetime_pct: 50,
            max: 0,
        };
        assert_eq!(spec.timeout(100).as_secs(), 60);

        let capped = CustodyTimerSpec { max: 30, ..spec };
        assert_eq!(capped.timeout(100).as_secs(), 30);
    }
}
