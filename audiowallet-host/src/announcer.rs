//! Service Announcer (§4.A): publishes `_audiowallet._tcp` over multicast
//! DNS and republishes within one advertisement interval of any room
//! mutation. Owned by a single task; other tasks reach it only through
//! [`AnnouncerHandle::republish`], a one-shot request channel (§5 "the
//! service announcer is owned by a single task; mutations reach it via a
//! 1-shot republish request").
//!
//! Failure to publish is a non-fatal warning (§4.A): the host keeps
//! accepting connections from peers who reach it by other means.

use std::collections::HashMap;

use audiowallet_core::{PROTOCOL_VERSION, SERVICE_TYPE, sanitize_service_name};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The fields that make up one TXT record (§4.A, §6).
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub room_name: String,
    pub room_id: String,
    pub locked: bool,
    pub port: u16,
}

impl Advertisement {
    fn txt_properties(&self) -> HashMap<String, String> {
        HashMap::from([
            ("v".to_owned(), PROTOCOL_VERSION.to_owned()),
            ("room".to_owned(), self.room_name.clone()),
            ("roomId".to_owned(), self.room_id.clone()),
            ("lock".to_owned(), if self.locked { "1" } else { "0" }.to_owned()),
            ("relay".to_owned(), "1".to_owned()),
            ("port".to_owned(), self.port.to_string()),
        ])
    }
}

/// A lightweight sender the dispatcher holds to request a republish
/// whenever room name or lock state changes.
#[derive(Debug, Clone)]
pub struct AnnouncerHandle {
    tx: mpsc::UnboundedSender<Advertisement>,
}

impl AnnouncerHandle {
    pub fn republish(&self, advertisement: Advertisement) {
        // An unbounded send to a detached task never blocks the caller;
        // if the announcer task has already exited (daemon shut down)
        // the request is simply dropped.
        let _ = self.tx.send(advertisement);
    }
}

/// Starts the announcer task and returns a handle plus the first
/// advertisement already published (best-effort).
pub fn spawn(initial: Advertisement) -> (AnnouncerHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Advertisement>();
    let handle = AnnouncerHandle { tx };

    let join = tokio::spawn(async move {
        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(err) => {
                warn!("mdns daemon failed to start, announcer disabled: {}", err);
                return;
            }
        };

        let mut current_fullname: Option<String> = None;
        publish(&daemon, &initial, &mut current_fullname);

        while let Some(advertisement) = rx.recv().await {
            publish(&daemon, &advertisement, &mut current_fullname);
        }

        if let Some(fullname) = current_fullname {
            let _ = daemon.unregister(&fullname);
        }
        let _ = daemon.shutdown();
    });

    (handle, join)
}

fn publish(daemon: &ServiceDaemon, advertisement: &Advertisement, current_fullname: &mut Option<String>) {
    let instance_name = sanitize_service_name(&advertisement.room_name);
    let host_name = format!("{instance_name}.local.");

    let info = match ServiceInfo::new(
        SERVICE_TYPE,
        &instance_name,
        &host_name,
        "",
        advertisement.port,
        advertisement.txt_properties(),
    ) {
        Ok(info) => info.enable_addr_auto(),
        Err(err) => {
            warn!("failed to build mdns service record: {}", err);
            return;
        }
    };

    if let Some(previous) = current_fullname.take()
        && previous != info.get_fullname()
    {
        let _ = daemon.unregister(&previous);
    }

    match daemon.register(info.clone()) {
        Ok(()) => {
            info!(
                instance = %instance_name,
                room_id = %advertisement.room_id,
                locked = advertisement.locked,
                "published _audiowallet._tcp record"
            );
            *current_fullname = Some(info.get_fullname().to_owned());
        }
        Err(err) => {
            warn!("failed to publish mdns service record: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_properties_carry_required_keys() {
        let advertisement = Advertisement {
            room_name: "Club".to_owned(),
            room_id: "r1".to_owned(),
            locked: true,
            port: 8787,
        };
        let props = advertisement.txt_properties();
        assert_eq!(props.get("v").unwrap(), PROTOCOL_VERSION);
        assert_eq!(props.get("lock").unwrap(), "1");
        assert_eq!(props.get("relay").unwrap(), "1");
        assert_eq!(props.get("port").unwrap(), "8787");
    }
}
