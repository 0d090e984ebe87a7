use super::*;
use actions::BundleActions;
use bundle::BundleRef;
use event::BundleEvent;

/// Routing policy, consulted by the daemon stages.
///
/// The router sees every event after the daemon has handled it and decides
/// where bundles go by calling back into [`BundleActions`].
pub trait Router: Send + Sync {
    /// Returns false to reject a received bundle, setting `reason`.
    fn accept_bundle(&self, _bundle: &bpv6::Bundle, _reason: &mut bpv6::ReasonCode) -> bool {
        true
    }

    fn accept_custody(&self, _bundle: &bpv6::Bundle) -> bool {
        true
    }

    /// Whether the daemon may drop a bundle it no longer needs.
    fn can_delete_bundle(&self, bundle: &BundleRef) -> bool {
        let state = bundle.lock();
        if state.bundle.local_custody {
            return false;
        }
        state.fwdlog.count(&[ForwardingState::Queued]) == 0
            && state.fwdlog.count(&[
                ForwardingState::Transmitted,
                ForwardingState::Delivered,
            ]) > 0
    }

    fn handle_event(&self, actions: &BundleActions, event: &BundleEvent);
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    pub pattern: bpv6::EidPattern,
    pub link: String,
}

/// A router with a fixed table of destination patterns to links.
///
/// Each bundle goes to every link of the most specific matching pattern.
#[derive(Default)]
pub struct StaticRouter {
    routes: Vec<Route>,
    custody_spec: CustodyTimerSpec,
}

impl StaticRouter {
    pub fn new(routes: Vec<Route>, custody_spec: CustodyTimerSpec) -> Self {
        Self {
            routes,
            custody_spec,
        }
    }

    fn links_for(&self, destination: &bpv6::Eid) -> Vec<&str> {
        let best = self
            .routes
            .iter()
            .filter_map(|r| r.pattern.match_len(destination))
            .max();
        self.routes
            .iter()
            .filter(|r| best.is_some() && r.pattern.match_len(destination) == best)
            .map(|r| r.link.as_str())
            .collect()
    }

    fn route_bundle(&self, actions: &BundleActions, bundle: &BundleRef) {
        let (destination, states) = {
            let state = bundle.lock();
            if state.fwdlog.latest_state(daemon::LOCAL_DELIVERY) == ForwardingState::Delivered {
                trace!("{bundle} was delivered locally, not routing it");
                return;
            }
            let links = self.links_for(&state.bundle.destination);
            let states = links
                .into_iter()
                .map(|l| (l, state.fwdlog.latest_state(l)))
                .collect::<Vec<_>>();
            (state.bundle.destination.clone(), states)
        };

        if states.is_empty() {
            debug!("No route for {bundle} to {destination}");
            return;
        }

        for (link, state) in states {
            match state {
                ForwardingState::None
                | ForwardingState::TransmitFailed
                | ForwardingState::Cancelled
                | ForwardingState::CustodyTimeout => {
                    debug!("Routing {bundle} to {destination} via {link}");
                    actions.queue_bundle(
                        bundle,
                        link,
                        ForwardingAction::Forward,
                        self.custody_spec,
                    );
                }
                _ => trace!("{bundle} already {state} on {link}"),
            }
        }
    }
}

impl Router for StaticRouter {
    fn handle_event(&self, actions: &BundleActions, event: &BundleEvent) {
        match event {
            BundleEvent::BundleReceived { bundle, .. }
            | BundleEvent::CustodyTimeout { bundle, .. } => self.route_bundle(actions, bundle),
            BundleEvent::BundleTransmitted {
                bundle,
                success: true,
                ..
            } => {
                actions.try_to_delete(bundle);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_specific() {
        let router = StaticRouter::new(
            vec![
                Route {
                    pattern: "*".parse().unwrap(),
                    link: "default".into(),
                },
                Route {
                    pattern: "dtn://dst/*".parse().unwrap(),
                    link: "a".into(),
                },
                Route {
                    pattern: "dtn://dst/*".parse().unwrap(),
                    link: "b".into(),
                },
            ],
            CustodyTimerSpec::default(),
        );

        assert_eq!(
            router.links_for(&"dtn://dst/app".parse().unwrap()),
            vec!["a", "b"]
        );
        assert_eq!(
            router.links_for(&"dtn://other/app".parse().unwrap()),
            vec!["default"]
        );
        assert!(StaticRouter::default()
            .links_for(&"dtn://dst/app".parse().unwrap())
            .is_empty());
    }
}
