use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};

use crate::error::{HandshakeError, LookupError, SendError};
use crate::message_stream::{MessageStream, StreamHandle};
use crate::openflow0x01::message::Message;
use crate::openflow0x01::{MsgCode, PortDesc, PortReason, PortStatus, SwitchFeatures};

/// The 64-bit datapath id a switch reports in its FeaturesReply. Identifies
/// the switch across reconnections.
pub type DatapathId = u64;

/// An inbound message tagged with the switch that produced it.
#[derive(Debug, Clone)]
pub struct SwitchMsg {
    pub dpid: DatapathId,
    pub xid: u32,
    pub message: Message,
}

/// A connected switch: its identity, port table, live connection handle,
/// and the waiters expecting replies from it.
pub struct Switch {
    dpid: DatapathId,
    features: Mutex<SwitchFeatures>,
    ports: Mutex<HashMap<u16, PortDesc>>,
    link: Mutex<StreamHandle>,
    requests: Mutex<HashMap<u32, oneshot::Sender<SwitchMsg>>>,
}

impl Switch {
    fn new(features: SwitchFeatures, link: StreamHandle) -> Switch {
        let ports = port_table(&features);
        Switch {
            dpid: features.datapath_id,
            features: Mutex::new(features),
            ports: Mutex::new(ports),
            link: Mutex::new(link),
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn datapath_id(&self) -> DatapathId {
        self.dpid
    }

    /// The features reported in the most recent handshake.
    pub fn features(&self) -> SwitchFeatures {
        self.features.lock().unwrap().clone()
    }

    /// Look up a port by number.
    pub fn port(&self, port_no: u16) -> Result<PortDesc, LookupError> {
        self.ports
            .lock()
            .unwrap()
            .get(&port_no)
            .cloned()
            .ok_or(LookupError::UnknownPort(port_no))
    }

    /// All ports currently known on this switch.
    pub fn ports(&self) -> Vec<PortDesc> {
        self.ports.lock().unwrap().values().cloned().collect()
    }

    /// Queue a message for this switch without waiting. Success means the
    /// message reached the connection's write queue; failures on the wire
    /// afterwards surface through the disconnect path instead.
    pub fn send(&self, xid: u32, msg: Message) -> Result<(), SendError> {
        self.link.lock().unwrap().send(xid, msg)
    }

    /// Send a request and obtain a receiver that resolves with the reply
    /// carrying the same transaction id. If the send fails the waiter is
    /// rolled back and the error returned; if the connection dies first the
    /// receiver resolves with an error.
    pub fn send_and_receive(
        &self,
        xid: u32,
        msg: Message,
    ) -> Result<oneshot::Receiver<SwitchMsg>, SendError> {
        let (tx, rx) = oneshot::channel();
        self.requests.lock().unwrap().insert(xid, tx);
        match self.send(xid, msg) {
            Ok(()) => Ok(rx),
            Err(e) => {
                self.requests.lock().unwrap().remove(&xid);
                Err(e)
            }
        }
    }

    fn shutdown(&self) {
        self.link.lock().unwrap().shutdown();
    }

    fn take_waiter(&self, xid: u32) -> Option<oneshot::Sender<SwitchMsg>> {
        self.requests.lock().unwrap().remove(&xid)
    }

    /// Point this switch at a new connection, shutting the old one down.
    /// Waiters registered against the old connection will never get replies;
    /// dropping them resolves their receivers with an error.
    fn replace_link(&self, features: SwitchFeatures, link: StreamHandle) {
        let old = {
            let mut current = self.link.lock().unwrap();
            std::mem::replace(&mut *current, link)
        };
        old.shutdown();
        *self.ports.lock().unwrap() = port_table(&features);
        *self.features.lock().unwrap() = features;
        self.requests.lock().unwrap().clear();
    }

    fn link_is(&self, handle: &StreamHandle) -> bool {
        self.link.lock().unwrap().same_stream(handle)
    }

    fn apply_port_status(&self, status: &PortStatus) {
        let mut ports = self.ports.lock().unwrap();
        match status.reason {
            PortReason::PortAdd | PortReason::PortModify => {
                ports.insert(status.desc.port_no, status.desc.clone());
            }
            PortReason::PortDelete => {
                ports.remove(&status.desc.port_no);
            }
        }
    }
}

fn port_table(features: &SwitchFeatures) -> HashMap<u16, PortDesc> {
    features
        .ports
        .iter()
        .map(|p| (p.port_no, p.clone()))
        .collect()
}

/// Registry of connected switches and router of their inbound messages.
///
/// One manager serves a whole controller. Connections enter through
/// `handshake`; decoded messages leave either through a per-request waiter
/// (`Switch::send_and_receive`) or through type-code subscriptions.
pub struct SwitchManager {
    switches: Mutex<HashMap<DatapathId, Arc<Switch>>>,
    subscribers: Mutex<HashMap<u8, Vec<mpsc::Sender<SwitchMsg>>>>,
    xid: AtomicU32,
}

impl SwitchManager {
    pub fn new() -> SwitchManager {
        SwitchManager {
            switches: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            xid: AtomicU32::new(1),
        }
    }

    /// A fresh transaction id. Never zero, so replies cannot pair with
    /// messages that were sent without a waiter.
    pub fn next_xid(&self) -> u32 {
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a connected switch.
    pub fn switch(&self, dpid: DatapathId) -> Result<Arc<Switch>, LookupError> {
        self.switches
            .lock()
            .unwrap()
            .get(&dpid)
            .cloned()
            .ok_or(LookupError::UnknownSwitch(dpid))
    }

    /// All currently connected switches.
    pub fn switches(&self) -> Vec<Arc<Switch>> {
        self.switches.lock().unwrap().values().cloned().collect()
    }

    /// Receive every inbound message of the given type code, from every
    /// switch, on a queue of the given depth. A subscriber that stops
    /// draining its queue loses messages rather than stalling dispatch.
    pub fn subscribe(&self, code: MsgCode, depth: usize) -> mpsc::Receiver<SwitchMsg> {
        let (tx, rx) = mpsc::channel(depth.max(1));
        self.subscribers
            .lock()
            .unwrap()
            .entry(code as u8)
            .or_default()
            .push(tx);
        rx
    }

    /// Drop a switch from the registry and tear its connection down.
    pub fn disconnect(&self, dpid: DatapathId) -> Result<(), LookupError> {
        let switch = self
            .switches
            .lock()
            .unwrap()
            .remove(&dpid)
            .ok_or(LookupError::UnknownSwitch(dpid))?;
        switch.shutdown();
        Ok(())
    }

    /// Run the OpenFlow handshake on a fresh connection and register the
    /// switch. On failure the connection is shut down and the registry is
    /// untouched. A dpid that is already registered keeps its single entry;
    /// the entry is pointed at the new connection.
    pub async fn handshake<C>(self: &Arc<Self>, conn: C) -> Result<DatapathId, HandshakeError>
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut stream = MessageStream::new(conn);
        let features = match self.negotiate(&mut stream).await {
            Ok(features) => features,
            Err(e) => {
                stream.shutdown();
                return Err(e);
            }
        };
        let dpid = features.datapath_id;
        let link = stream.handle();
        let switch = {
            let mut switches = self.switches.lock().unwrap();
            match switches.get(&dpid) {
                Some(existing) => {
                    log::info!("switch {:#018x} reconnected", dpid);
                    existing.replace_link(features, link);
                    existing.clone()
                }
                None => {
                    log::info!(
                        "switch {:#018x} connected with {} ports",
                        dpid,
                        features.ports.len()
                    );
                    let switch = Arc::new(Switch::new(features, link));
                    switches.insert(dpid, switch.clone());
                    switch
                }
            }
        };
        let manager = Arc::clone(self);
        tokio::spawn(manager.run_switch(switch, stream));
        Ok(dpid)
    }

    async fn negotiate(
        &self,
        stream: &mut MessageStream,
    ) -> Result<SwitchFeatures, HandshakeError> {
        stream
            .outbound
            .send((0, Message::Hello))
            .await
            .map_err(|_| HandshakeError::SendFailed("hello"))?;
        let (_, msg) = stream
            .inbound
            .recv()
            .await
            .ok_or(HandshakeError::ConnectionClosed)?;
        if msg != Message::Hello {
            return Err(HandshakeError::UnexpectedMessage {
                expected: "hello",
                received: name_of(&msg),
            });
        }
        let xid = self.next_xid();
        stream
            .outbound
            .send((xid, Message::FeaturesReq))
            .await
            .map_err(|_| HandshakeError::SendFailed("features request"))?;
        let (_, msg) = stream
            .inbound
            .recv()
            .await
            .ok_or(HandshakeError::ConnectionClosed)?;
        match msg {
            Message::FeaturesReply(features) => Ok(features),
            other => Err(HandshakeError::UnexpectedMessage {
                expected: "features reply",
                received: name_of(&other),
            }),
        }
    }

    /// Per-switch receive loop. Exits when the connection does, at which
    /// point the switch leaves the registry unless a reconnection already
    /// repointed it at a newer connection.
    async fn run_switch(self: Arc<Self>, switch: Arc<Switch>, mut stream: MessageStream) {
        let this_link = stream.handle();
        loop {
            tokio::select! {
                msg = stream.inbound.recv() => match msg {
                    None => break,
                    Some((xid, message)) => {
                        if let Message::PortStatus(ref status) = message {
                            switch.apply_port_status(status);
                        }
                        self.dispatch(&switch, SwitchMsg {
                            dpid: switch.dpid,
                            xid,
                            message,
                        });
                    }
                },
                err = stream.errors.recv() => {
                    if let Some(e) = err {
                        log::error!("switch {:#018x}: {}", switch.dpid, e);
                    }
                    stream.shutdown();
                    break;
                }
            }
        }
        let mut switches = self.switches.lock().unwrap();
        if let Some(current) = switches.get(&switch.dpid) {
            if current.link_is(&this_link) {
                switches.remove(&switch.dpid);
                log::info!("switch {:#018x} disconnected", switch.dpid);
                switch.requests.lock().unwrap().clear();
            }
        }
    }

    /// Route one inbound message. A waiter registered under the xid gets it,
    /// exactly once; otherwise it fans out to every subscriber of its type
    /// code. A full subscriber queue drops the message with a warning so one
    /// slow consumer cannot stall the switch's receive loop.
    fn dispatch(&self, switch: &Switch, msg: SwitchMsg) {
        if let Some(waiter) = switch.take_waiter(msg.xid) {
            let _ = waiter.send(msg);
            return;
        }
        let code = Message::msg_code_of_message(&msg.message) as u8;
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(queues) = subscribers.get_mut(&code) {
            queues.retain(|tx| match tx.try_send(msg.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "subscriber queue for type {} is full; dropping message from {:#018x}",
                        code,
                        msg.dpid
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }

    /// Accept switch connections forever, handing each to `handshake`.
    pub async fn listen<A: ToSocketAddrs>(self: Arc<Self>, addr: A) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("listening on {}", listener.local_addr()?);
        loop {
            let (socket, peer) = listener.accept().await?;
            let manager = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = manager.handshake(socket).await {
                    log::warn!("handshake with {} failed: {}", peer, e);
                }
            });
        }
    }
}

impl Default for SwitchManager {
    fn default() -> SwitchManager {
        SwitchManager::new()
    }
}

fn name_of(msg: &Message) -> &'static str {
    match msg {
        Message::Hello => "hello",
        Message::Error(_) => "error",
        Message::EchoRequest(_) => "echo request",
        Message::EchoReply(_) => "echo reply",
        Message::Vendor(_) => "vendor",
        Message::FeaturesReq => "features request",
        Message::FeaturesReply(_) => "features reply",
        Message::GetConfigReq => "get config request",
        Message::GetConfigReply(_) => "get config reply",
        Message::SetConfig(_) => "set config",
        Message::PacketIn(_) => "packet in",
        Message::FlowRemoved(_) => "flow removed",
        Message::PortStatus(_) => "port status",
        Message::PacketOut(_) => "packet out",
        Message::FlowMod(_) => "flow mod",
        Message::StatsRequest(_) => "stats request",
        Message::StatsReply(_) => "stats reply",
        Message::BarrierRequest => "barrier request",
        Message::BarrierReply => "barrier reply",
    }
}
