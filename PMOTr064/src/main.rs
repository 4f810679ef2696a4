mod logging;

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded, select};
use pmoconfig::get_config;
use pmotr064::{
    ChannelTypeTable, RootSession, SessionEvent, SessionEventBus, SessionState, SubSession,
    Tr064ConfigExt, UreqTransport,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Stand-in for the automation platform: links every discovered channel and
/// logs what the sessions report.
struct Host {
    root: Arc<RootSession>,
    subs: Vec<Arc<SubSession>>,
}

impl Host {
    fn link_all(&self, device: &str, channel_ids: impl Iterator<Item = String>) {
        if device.is_empty() {
            channel_ids.for_each(|id| self.root.link_channel(&id));
        } else if let Some(sub) = self.subs.iter().find(|s| s.uuid() == device) {
            channel_ids.for_each(|id| sub.link_channel(&id));
        }
    }

    fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged { device, status } => {
                info!("🔌 [{}] {}", display_device(&device), status);
                if device.is_empty() && status == SessionState::Online && self.subs.is_empty() {
                    for sub in self.root.get_all_sub_devices() {
                        info!(
                            "  - sub-device {} ({}) can be added to tr064.subdevices",
                            sub.uuid, sub.device_type
                        );
                    }
                }
            }
            SessionEvent::StateUpdated {
                device,
                channel_id,
                value,
            } => {
                info!("[{}] {} = {}", display_device(&device), channel_id, value);
            }
            SessionEvent::ChannelsAdded { device, channels } => {
                info!(
                    "✅ [{}] {} channel(s) added",
                    display_device(&device),
                    channels.len()
                );
                self.link_all(&device, channels.into_iter().map(|c| c.channel_id));
            }
            SessionEvent::ChannelsRemoved {
                device,
                channel_ids,
            } => {
                info!(
                    "[{}] {} channel(s) removed",
                    display_device(&device),
                    channel_ids.len()
                );
            }
            SessionEvent::PropertiesUpdated { device, properties } => {
                for (name, value) in properties {
                    info!("[{}] {}: {}", display_device(&device), name, value);
                }
            }
            SessionEvent::DescriptionsReleased { device } => {
                debug!("[{}] descriptions released", display_device(&device));
            }
        }
    }

    fn run(&self, events: Receiver<SessionEvent>, stop: Receiver<()>) {
        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }
    }
}

fn display_device(device: &str) -> &str {
    if device.is_empty() { "root" } else { device }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = get_config().context("Failed to load PMOTr064 configuration")?;
    logging::init_logging(&config);

    // ========== PHASE 1 : Configuration ==========

    let root_config = config.get_tr064_root()?;
    let sub_configs = config.get_tr064_subdevices()?;
    let options = config.get_tr064_session_options()?;
    let table = Arc::new(ChannelTypeTable::builtin().context("Invalid built-in channel table")?);
    info!("📋 {} channel types loaded", table.len());

    // ========== PHASE 2 : Sessions ==========

    let events = SessionEventBus::new();
    let receiver = events.subscribe();
    let runtime = Handle::current();

    let root = Arc::new(RootSession::new(
        root_config.clone(),
        Arc::new(UreqTransport::new()),
        table.clone(),
        events.clone(),
        runtime.clone(),
        options,
    ));
    let subs: Vec<Arc<SubSession>> = sub_configs
        .into_iter()
        .map(|sub| {
            Arc::new(SubSession::new(
                sub,
                root.link(),
                table.clone(),
                events.clone(),
                runtime.clone(),
                options,
            ))
        })
        .collect();

    let host = Host {
        root: root.clone(),
        subs: subs.clone(),
    };
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let event_loop = thread::Builder::new()
        .name("tr064-events".to_string())
        .spawn(move || host.run(receiver, stop_rx))
        .context("Failed to start event thread")?;

    info!("📡 Connecting to {}...", root_config.host);
    root.start();
    for sub in &subs {
        sub.start();
    }

    // ========== PHASE 3 : Attente ==========

    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("🛑 Stopping sessions...");
    for sub in &subs {
        sub.dispose();
    }
    root.dispose();

    drop(stop_tx);
    if event_loop.join().is_err() {
        warn!("Event thread panicked");
    }

    Ok(())
}
