//! Routes parsed I2NP messages to the subsystem queue that owns their
//! type, per the dispatch table: tunnel-plane types to the tunnel
//! manager, NetDB types to NetDB, Garlic to the owning local destination,
//! DeliveryStatus to the garlic layer's ACK path.

use crate::message::{Message, MessageType};
use crossbeam_channel::Sender;
use std::collections::HashMap;

/// Which subsystem owns a given message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    TunnelManager,
    NetDb,
    GarlicDestination,
    GarlicAck,
}

pub fn route_for(message_type: MessageType) -> Route {
    match message_type {
        MessageType::TunnelData
        | MessageType::TunnelGateway
        | MessageType::TunnelBuild
        | MessageType::TunnelBuildReply
        | MessageType::VariableTunnelBuild
        | MessageType::VariableTunnelBuildReply => Route::TunnelManager,
        MessageType::Garlic => Route::GarlicDestination,
        MessageType::DatabaseStore | MessageType::DatabaseLookup | MessageType::DatabaseSearchReply => {
            Route::NetDb
        }
        MessageType::DeliveryStatus => Route::GarlicAck,
        MessageType::Data => Route::TunnelManager,
    }
}

/// Holds one bounded channel per subsystem and forwards messages by type.
/// A missing route (no handler registered for that subsystem yet) simply
/// drops the message — the dispatch loop never unwinds on a single
/// message regardless of whether anyone is listening.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<Route, Sender<Message>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: Route, sender: Sender<Message>) {
        self.routes.insert(route, sender);
    }

    /// Dispatch one message. Returns `true` if it was handed to a
    /// registered subsystem queue, `false` if there was nowhere to send it
    /// (dropped).
    pub fn dispatch(&self, message: Message) -> bool {
        let route = route_for(message.message_type);
        match self.routes.get(&route) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;
    use crossbeam_channel::unbounded;

    #[test]
    fn tunnel_data_routes_to_tunnel_manager() {
        assert_eq!(route_for(MessageType::TunnelData), Route::TunnelManager);
        assert_eq!(route_for(MessageType::VariableTunnelBuild), Route::TunnelManager);
    }

    #[test]
    fn database_messages_route_to_netdb() {
        assert_eq!(route_for(MessageType::DatabaseStore), Route::NetDb);
        assert_eq!(route_for(MessageType::DatabaseLookup), Route::NetDb);
        assert_eq!(route_for(MessageType::DatabaseSearchReply), Route::NetDb);
    }

    #[test]
    fn garlic_routes_to_destination_delivery_status_to_ack() {
        assert_eq!(route_for(MessageType::Garlic), Route::GarlicDestination);
        assert_eq!(route_for(MessageType::DeliveryStatus), Route::GarlicAck);
    }

    #[test]
    fn dispatch_delivers_to_registered_route() {
        let (tx, rx) = unbounded();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Route::NetDb, tx);

        let msg = message::build(MessageType::DatabaseStore, vec![1, 2, 3], None).unwrap();
        assert!(dispatcher.dispatch(msg.clone()));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.payload, msg.payload);
    }

    #[test]
    fn dispatch_drops_message_with_no_registered_route() {
        let dispatcher = Dispatcher::new();
        let msg = message::build(MessageType::Garlic, vec![], None).unwrap();
        assert!(!dispatcher.dispatch(msg));
    }
}
