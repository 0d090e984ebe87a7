use super::*;

/// Aggregation parameters for one custodian.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcsParams {
    pub enabled: bool,
    /// Seconds to hold a signal open before sending it.
    pub delay: u64,
    /// The largest signal payload to accumulate, in bytes. 0 for no limit.
    pub size: u64,
}

impl Default for AcsParams {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: 30,
            size: 1000,
        }
    }
}

/// Parameters for custodians matching `pattern`, overriding the defaults.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteConfig {
    pub pattern: bpv6::EidPattern,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub params: AcsParams,
}

/// The default parameters and the per-route overrides.
///
/// Every change bumps the revision, so a pending signal only needs to look
/// its parameters up again when the revision it cached is out of date.
#[derive(Debug)]
pub struct RouteParams {
    defaults: AcsParams,
    routes: Vec<RouteConfig>,
    revision: u64,
}

impl RouteParams {
    pub fn new(defaults: AcsParams, routes: Vec<RouteConfig>) -> Self {
        Self {
            defaults,
            routes,
            revision: 1,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set(&mut self, pattern: bpv6::EidPattern, params: AcsParams) {
        match self.routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(route) => route.params = params,
            None => self.routes.push(RouteConfig { pattern, params }),
        }
        self.revision += 1;
    }

    pub fn delete(&mut self, pattern: &bpv6::EidPattern) -> bool {
        let before = self.routes.len();
        self.routes.retain(|r| &r.pattern != pattern);
        if self.routes.len() == before {
            return false;
        }
        self.revision += 1;
        true
    }

    /// The parameters of the longest matching route, or the defaults.
    pub fn lookup(&self, eid: &bpv6::Eid) -> AcsParams {
        self.routes
            .iter()
            .filter_map(|r| r.pattern.match_len(eid).map(|len| (len, r.params)))
            .max_by_key(|(len, _)| *len)
            .map(|(_, params)| params)
            .unwrap_or(self.defaults)
    }
}
