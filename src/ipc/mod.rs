//! Named page channels
//!
//! Each connected page gets an unbounded tokio channel. Ports are kept in a
//! registry keyed by a unique name; sending to a port whose receiver has
//! been dropped unregisters it.

mod messages;

use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::rules::PageOrigin;

pub use messages::ChannelMessage;

/// Sending half of one page connection
#[derive(Debug)]
pub struct Port {
    origin: PageOrigin,
    sender: UnboundedSender<ChannelMessage>,
}

impl Port {
    /// Origin of the page this port belongs to
    pub fn origin(&self) -> &PageOrigin {
        &self.origin
    }
}

/// Connected pages keyed by unique port name
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: HashMap<String, Port>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port; a taken name gets `-2`, `-3`, ... appended
    pub fn register(
        &mut self,
        requested: &str,
        origin: PageOrigin,
    ) -> (String, UnboundedReceiver<ChannelMessage>) {
        let name = self.unique_name(requested);
        let (sender, receiver) = mpsc::unbounded_channel();
        info!(port = %name, origin = ?origin, "Port connected");
        self.ports.insert(name.clone(), Port { origin, sender });
        (name, receiver)
    }

    /// Remove a port; returns whether it was registered
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.ports.remove(name).is_some();
        if removed {
            info!(port = %name, "Port disconnected");
        }
        removed
    }

    /// Port registered under `name`
    pub fn get(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    /// Send to one port; a closed port is unregistered and `false` returned
    pub fn send(&mut self, name: &str, message: ChannelMessage) -> bool {
        let Some(port) = self.ports.get(name) else {
            debug!(port = %name, "Dropping message for unknown port");
            return false;
        };
        if port.sender.send(message).is_ok() {
            return true;
        }
        self.unregister(name);
        false
    }

    /// Send to every port, pruning closed ones; returns how many received it
    pub fn broadcast(&mut self, message: &ChannelMessage) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;
        for (name, port) in &self.ports {
            if port.sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(name.clone());
            }
        }
        for name in closed {
            self.unregister(&name);
        }
        debug!(ports = delivered, "Broadcast sent");
        delivered
    }

    /// Number of connected ports
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    fn unique_name(&self, requested: &str) -> String {
        if !self.ports.contains_key(requested) {
            return requested.to_string();
        }
        (2..)
            .map(|n| format!("{requested}-{n}"))
            .find(|candidate| !self.ports.contains_key(candidate))
            .unwrap_or_else(|| requested.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_collisions_get_suffix() {
        let mut registry = PortRegistry::new();
        let (a, _ra) = registry.register("tab", PageOrigin::General);
        let (b, _rb) = registry.register("tab", PageOrigin::General);
        let (c, _rc) = registry.register("tab", PageOrigin::General);
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("tab", "tab-2", "tab-3"));

        registry.unregister("tab-2");
        let (d, _rd) = registry.register("tab", PageOrigin::General);
        assert_eq!(d, "tab-2");
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let mut registry = PortRegistry::new();
        let (name, mut rx) = registry.register("tab", PageOrigin::General);

        assert!(registry.send(&name, ChannelMessage::QueryCss));
        assert!(registry.send(&name, ChannelMessage::UpdateCss { css: "x".into() }));

        assert_eq!(rx.try_recv().unwrap(), ChannelMessage::QueryCss);
        assert_eq!(rx.try_recv().unwrap(), ChannelMessage::UpdateCss { css: "x".into() });
    }

    #[test]
    fn test_broadcast_prunes_closed_ports() {
        let mut registry = PortRegistry::new();
        let (_, mut live) = registry.register("live", PageOrigin::General);
        let (_, dead) = registry.register("dead", PageOrigin::General);
        drop(dead);

        assert_eq!(registry.broadcast(&ChannelMessage::QueryCss), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("dead").is_none());
        assert_eq!(live.try_recv().unwrap(), ChannelMessage::QueryCss);
    }

    #[test]
    fn test_send_to_disconnected_port() {
        let mut registry = PortRegistry::new();
        let (name, _rx) = registry.register("tab", PageOrigin::General);
        assert!(registry.unregister(&name));
        assert!(!registry.send(&name, ChannelMessage::QueryCss));
    }
}
