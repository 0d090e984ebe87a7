use super::*;
use event::BundleEvent;

/// A stage's event queue: FIFO, plus a head lane whose events are taken
/// before anything already queued.
///
/// Posting at the head also drops a wake marker into the FIFO lane so a
/// blocked receiver notices it.
#[derive(Clone)]
pub struct EventQueue {
    head_tx: flume::Sender<BundleEvent>,
    head_rx: flume::Receiver<BundleEvent>,
    tx: flume::Sender<Option<BundleEvent>>,
    rx: flume::Receiver<Option<BundleEvent>>,
    len: Arc<std::sync::atomic::AtomicUsize>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (head_tx, head_rx) = flume::unbounded();
        let (tx, rx) = flume::unbounded();
        Self {
            head_tx,
            head_rx,
            tx,
            rx,
            len: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub fn post(&self, event: BundleEvent) {
        self.len.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.tx
            .send(Some(event))
            .trace_expect("Event queue receiver dropped");
    }

    pub fn post_at_head(&self, event: BundleEvent) {
        self.len.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.head_tx
            .send(event)
            .trace_expect("Event queue receiver dropped");
        self.tx.send(None).trace_expect("Event queue receiver dropped");
    }

    /// Takes the next event without blocking.
    pub fn try_recv(&self) -> Option<BundleEvent> {
        self.taken(self.next())
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<BundleEvent> {
        self.taken(self.wait(timeout))
    }

    fn taken(&self, event: Option<BundleEvent>) -> Option<BundleEvent> {
        if event.is_some() {
            self.len.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
        }
        event
    }

    fn next(&self) -> Option<BundleEvent> {
        if let Ok(event) = self.head_rx.try_recv() {
            return Some(event);
        }
        while let Ok(event) = self.rx.try_recv() {
            if event.is_some() {
                return event;
            }
            if let Ok(event) = self.head_rx.try_recv() {
                return Some(event);
            }
        }
        None
    }

    fn wait(&self, timeout: std::time::Duration) -> Option<BundleEvent> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Ok(event) = self.head_rx.try_recv() {
                return Some(event);
            }
            match self.rx.recv_deadline(deadline) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The number of events waiting.
    pub fn len(&self) -> usize {
        self.len.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired(seconds: u64) -> BundleEvent {
        let bundle = bpv6::Bundle {
            creation_ts: bpv6::CreationTimestamp::new(seconds, 0),
            ..Default::default()
        };
        BundleEvent::BundleExpired {
            bundle: bundle::Bundle::new(seconds, bundle),
        }
    }

    fn seconds(event: Option<BundleEvent>) -> u64 {
        match event {
            Some(BundleEvent::BundleExpired { bundle }) => bundle.bundleid(),
            _ => panic!("Unexpected event"),
        }
    }

    #[test]
    fn head_first() {
        let queue = EventQueue::new();
        queue.post(expired(1));
        queue.post(expired(2));
        queue.post_at_head(expired(3));
        assert_eq!(queue.len(), 3);

        assert_eq!(seconds(queue.try_recv()), 3);
        assert_eq!(seconds(queue.try_recv()), 1);
        assert_eq!(seconds(queue.try_recv()), 2);
        assert!(queue.try_recv().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_times_out() {
        let queue = EventQueue::new();
        assert!(
            queue
                .recv_timeout(std::time::Duration::from_millis(10))
                .is_none()
        );

        let sender = queue.clone();
        let handle = std::thread::spawn(move || sender.post_at_head(expired(7)));
        assert_eq!(
            seconds(queue.recv_timeout(std::time::Duration::from_secs(5))),
            7
        );
        handle.join().unwrap();
    }
}
