//! Provisioning state machines
//!
//! One observer per connection, picked from the negotiated protocol
//! version. Each observer consumes decoded messages and answers through
//! the [`Session`]:
//!
//! ```text
//! BOOT ─┬─ unknown device ──────────────► REJECTED
//!       ├─ no plan ─────────────────────► FINISHED
//!       ├─ step FIRMWARE ──► UpdateFirmware ─► Installed ─► Reset ─► BOOT
//!       │                        └─ nothing left ─┐
//!       └─ step CONFIGURATION ◄───────────────────┘
//!              └─► settings ... identity, redirect ─► FINISHED ─► Reset
//! ```
//!
//! The record bookkeeping both versions share lives in [`Provisioner`].

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::firmware::{self, FirmwareStep};
use crate::model::{ChargePoint, Firmware, StatusProcess, Step};
use crate::notify::Notifier;
use crate::ocpp::{DecodeMessage, Session};
use crate::store::{ChargePointStore, SortOrder};

pub mod v16;
pub mod v201;

pub use self::v16::Observer16;
pub use self::v201::Observer201;

/// Version-specific provisioning state machine
pub trait OcppObserver: Send + 'static {
    /// Inbound messages this observer understands
    type Message: DecodeMessage;

    fn new(provisioner: Provisioner) -> Self
    where
        Self: Sized;

    /// Handle one decoded, validated message
    fn on_message(
        &mut self,
        session: &mut Session,
        message: Self::Message,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Called at teardown when no device was ever matched
    fn on_disconnection(&mut self, session: &mut Session) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Where the firmware phase stands after a boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwarePhase {
    /// Push this image
    Install(Firmware),
    /// Firmware is settled; configure now
    Configure,
    /// Nothing to provision
    Done,
}

/// Store, notifier and configuration shared by the observers
#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn ChargePointStore>,
    notifier: Arc<dyn Notifier>,
    config: Arc<ServerConfig>,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn ChargePointStore>,
        notifier: Arc<dyn Notifier>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &dyn ChargePointStore {
        self.store.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Mutate the matched device, persist it and publish its status.
    /// No-op without a matched device.
    pub fn update(&self, session: &mut Session, change: impl FnOnce(&mut ChargePoint)) -> Result<(), Error> {
        let Some(cp) = session.device_mut() else {
            return Ok(());
        };
        change(cp);
        self.store.save(cp)?;
        self.notifier.on_status_changed(cp);
        Ok(())
    }

    /// Publish the outcome of the current phase
    pub fn notify_process(&self, session: &Session) {
        if let Some(cp) = session.device() {
            self.notifier.on_process_finished_or_failed(cp);
        }
    }

    /// Match a booting device against the store.
    ///
    /// On success the device is online, PENDING and attached to the
    /// session. Unknown devices leave the session without a device.
    pub fn authenticate(&self, session: &mut Session, serial_number: &str, vendor: &str) -> Result<bool, Error> {
        let Some(mut cp) = self.store.find_by_identity(serial_number, vendor)? else {
            warn!(
                "[{}] Unknown charge point, serial number: {} ({})",
                session.peer(),
                serial_number,
                vendor
            );
            session.set_device(None);
            return Ok(false);
        };

        cp.set_online(true);
        cp.set_status(StatusProcess::Pending);
        self.store.save(&cp)?;
        self.notifier.on_status_changed(&cp);
        self.notifier.on_connected(&cp);
        info!("Charge point ({}) is authenticated", cp.serial_number());

        session.set_device(Some(cp));
        Ok(true)
    }

    /// Decide the firmware phase for the matched device running `current`
    pub fn firmware_step(&self, session: &mut Session, current: &str) -> Result<FirmwarePhase, Error> {
        let Some(cp) = session.device() else {
            return Ok(FirmwarePhase::Done);
        };
        if cp.plan().is_none() {
            self.update(session, |cp| cp.set_status(StatusProcess::Finished))?;
            return Ok(FirmwarePhase::Done);
        }

        match self.next_firmware(cp, current)? {
            Some(firmware) => {
                self.update(session, |cp| cp.set_status(StatusProcess::Processing))?;
                Ok(FirmwarePhase::Install(firmware))
            }
            None => {
                if let Some(cp) = session.device() {
                    info!("Firmware update for charge point ({}) is done", cp.serial_number());
                }
                self.update(session, |cp| {
                    cp.set_step(Step::Configuration);
                    cp.set_status(StatusProcess::Pending);
                })?;
                self.notify_process(session);
                Ok(FirmwarePhase::Configure)
            }
        }
    }

    /// Next image towards the plan's target, one release at a time
    fn next_firmware(&self, cp: &ChargePoint, current: &str) -> Result<Option<Firmware>, Error> {
        let Some(plan) = cp.plan() else {
            return Ok(None);
        };
        let target = plan.target_firmware.as_str();
        let type_allowed = cp.type_allowed();
        info!(
            "Firmware target ({}) for charge point ({}), running {:?}",
            target,
            cp.serial_number(),
            current
        );

        match self.store.find_firmware(target)? {
            Some(fw) if fw.supports(&type_allowed) => {}
            _ => {
                info!(
                    "Target firmware {} is not cataloged for {}/{}, skipping to CONFIGURATION",
                    target, type_allowed.vendor, type_allowed.device_type
                );
                return Ok(None);
            }
        }

        let catalog = self
            .store
            .list_compatible_firmwares(&type_allowed, SortOrder::Ascending)?;
        match firmware::select_next(&catalog, &type_allowed, current, target) {
            FirmwareStep::Upgrade(fw) => {
                info!(
                    "Updating charge point ({}) with firmware {}",
                    cp.serial_number(),
                    fw.version
                );
                Ok(Some(fw.clone()))
            }
            FirmwareStep::Rollback(fw) => {
                warn!(
                    "Tried to roll back charge point ({}) to firmware {}: forbidden, skipping to CONFIGURATION",
                    cp.serial_number(),
                    fw.version
                );
                Ok(None)
            }
            FirmwareStep::Current => Ok(None),
            FirmwareStep::Exhausted => {
                info!(
                    "No compatible firmware for charge point ({}), skipping to CONFIGURATION",
                    cp.serial_number()
                );
                Ok(None)
            }
        }
    }

    /// Installed image: wait for the reboot that follows
    pub fn firmware_installed(&self, session: &mut Session) -> Result<(), Error> {
        if let Some(cp) = session.device() {
            info!(
                "Charge point ({}) has installed the firmware, rebooting",
                cp.serial_number()
            );
        }
        self.update(session, |cp| cp.set_status(StatusProcess::Pending))
    }

    /// Failed download or installation: pause, then fall back to
    /// configuration on the next boot
    pub async fn firmware_failed(&self, session: &mut Session, reason: &str) -> Result<(), Error> {
        if let Some(cp) = session.device() {
            warn!(
                "Firmware for charge point ({}) could not be installed, {}",
                cp.serial_number(),
                reason
            );
        }
        tokio::time::sleep(self.config.firmware_failure_delay).await;

        self.update(session, |cp| {
            cp.set_step(Step::Configuration);
            cp.set_status(StatusProcess::Pending);
        })?;
        self.notify_process(session);
        Ok(())
    }

    /// Abort the configuration pass
    pub fn fail_pass(&self, session: &mut Session, error: &str) -> Result<(), Error> {
        if let Some(cp) = session.device() {
            warn!(
                "Configuration for charge point ({}) has failed: {}",
                cp.serial_number(),
                error
            );
        }
        self.update(session, |cp| {
            cp.set_status(StatusProcess::Failed);
            cp.set_error(error);
        })?;
        self.notify_process(session);
        Ok(())
    }

    /// Configuration pass complete
    pub fn finish_pass(&self, session: &mut Session) -> Result<(), Error> {
        if let Some(cp) = session.device() {
            info!("Configuration for charge point ({}) is done", cp.serial_number());
        }
        self.update(session, |cp| cp.set_status(StatusProcess::Finished))?;
        self.notify_process(session);
        Ok(())
    }

    /// Device accepted the reset and is about to power-cycle
    pub fn reset_acknowledged(&self, session: &mut Session) -> Result<(), Error> {
        self.update(session, |cp| {
            cp.set_status(StatusProcess::Finished);
            cp.set_online(false);
        })
    }
}
