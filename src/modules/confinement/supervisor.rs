//! Confinement state machine.
//!
//! Every mutation touching a user's confinement or presence happens under that
//! user's slot lock, so events, commands and timer expiries for one user are
//! applied in a single order while other users proceed independently.
//! A slot only lives in the map while someone holds it or a confinement is
//! active; idle slots are reaped as soon as the last holder lets go.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use std::time::Duration;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{error::ConfinementError, transport::ChannelTransport};
use crate::modules::presence::store::PresenceStore;

/// A membership change delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStateChange {
    pub guild_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub previous_channel: Option<u64>,
    pub new_channel: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ConfineRequest {
    pub guild_id: u64,
    pub user_id: u64,
    pub duration: Duration,
    /// Where escape notices are posted; defaults to the holding channel.
    pub notify_channel: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfinementRecord {
    pub user_id: u64,
    pub guild_id: u64,
    pub confinement_channel: u64,
    pub original_channel: Option<u64>,
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    pub notify_channel: Option<u64>,
}

impl ConfinementRecord {
    /// Saturates at the latest representable instant instead of overflowing.
    pub fn ends_at(&self) -> DateTime<Utc> {
        i64::try_from(self.duration.as_secs())
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|d| self.start_time.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug)]
struct ActiveConfinement {
    record: ConfinementRecord,
    generation: u64,
    timer: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<ActiveConfinement>>>;

#[derive(Debug)]
pub struct ConfinementSupervisor {
    transport: Arc<dyn ChannelTransport>,
    presence: Arc<PresenceStore>,
    holding_channel: String,
    slots: DashMap<u64, Slot>,
    generation: AtomicU64,
}

impl ConfinementSupervisor {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        presence: Arc<PresenceStore>,
        holding_channel: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            presence,
            holding_channel: holding_channel.into(),
            slots: DashMap::new(),
            generation: AtomicU64::new(0),
        })
    }

    fn slot(&self, user_id: u64) -> Slot {
        Arc::clone(&self.slots.entry(user_id).or_default())
    }

    /// Drops the user's slot if it is empty and nobody else holds it. The
    /// check runs under the map's shard lock, which is also where `slot`
    /// hands out clones, so a slot in use is never removed.
    fn reap(&self, user_id: u64) {
        self.slots.remove_if(&user_id, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|active| active.is_none())
        });
    }

    /// Moves the target into the holding channel and arms its release timer.
    ///
    /// Confining an already confined member replaces the record and restarts
    /// the timer from now.
    pub async fn confine(
        self: &Arc<Self>,
        request: ConfineRequest,
    ) -> Result<ConfinementRecord, ConfinementError> {
        if request.duration.is_zero() {
            return Err(ConfinementError::InvalidArgument(
                "duration must be at least one second".into(),
            ));
        }

        let user_id = request.user_id;
        let result = {
            let slot = self.slot(user_id);
            let mut active = slot.lock().await;
            let result = self.install(&mut active, request).await;
            result
        };
        self.reap(user_id);
        result
    }

    async fn install(
        self: &Arc<Self>,
        active: &mut Option<ActiveConfinement>,
        request: ConfineRequest,
    ) -> Result<ConfinementRecord, ConfinementError> {
        let current = self
            .transport
            .current_channel(request.guild_id, request.user_id)
            .await
            .map_err(|e| ConfinementError::Transport(e.to_string()))?
            .ok_or(ConfinementError::NotInChannel)?;

        let holding = self
            .transport
            .resolve_channel(request.guild_id, &self.holding_channel)
            .await
            .map_err(|e| ConfinementError::Transport(e.to_string()))?
            .ok_or_else(|| ConfinementError::NoHoldingChannel(self.holding_channel.clone()))?;

        // Someone already sitting in the holding channel keeps the channel
        // they will eventually be returned to.
        let original_channel = if current == holding {
            active.as_ref().and_then(|a| a.record.original_channel)
        } else {
            Some(current)
        };

        if current != holding {
            self.transport
                .move_member(request.guild_id, request.user_id, holding)
                .await
                .map_err(|e| {
                    error!("Failed to move {} into holding channel: {}", request.user_id, e);
                    ConfinementError::Transport(e.to_string())
                })?;
        }

        if let Some(previous) = active.take() {
            previous.timer.abort();
            debug!("Superseded confinement of {}", request.user_id);
        }

        let record = ConfinementRecord {
            user_id: request.user_id,
            guild_id: request.guild_id,
            confinement_channel: holding,
            original_channel,
            duration: request.duration,
            start_time: Utc::now(),
            notify_channel: request.notify_channel,
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let timer = self.arm_timer(request.user_id, generation, request.duration);

        info!(
            "Confined {} in guild {} for {:?} (original channel {:?})",
            record.user_id, record.guild_id, record.duration, record.original_channel
        );

        *active = Some(ActiveConfinement {
            record: record.clone(),
            generation,
            timer,
        });

        Ok(record)
    }

    fn arm_timer(self: &Arc<Self>, user_id: u64, generation: u64, duration: Duration) -> JoinHandle<()> {
        let supervisor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(supervisor) = supervisor.upgrade() {
                supervisor.expire(user_id, generation).await;
            }
        })
    }

    /// Timer path. Only the confinement the timer was armed for is released;
    /// anything released or replaced in the meantime is left alone.
    async fn expire(&self, user_id: u64, generation: u64) {
        {
            let slot = self.slot(user_id);
            let mut active = slot.lock().await;

            match active.take() {
                Some(expired) if expired.generation == generation => {
                    info!("Confinement of {} expired", user_id);
                    self.restore(&expired.record).await;
                }
                other => {
                    debug!("Stale confinement timer for {} ignored", user_id);
                    *active = other;
                }
            };
        }
        self.reap(user_id);
    }

    /// Explicit release: cancels the pending timer and returns the member to
    /// their original channel right away.
    pub async fn release(&self, user_id: u64) -> Result<ConfinementRecord, ConfinementError> {
        let released = {
            let slot = self.slot(user_id);
            let mut active = slot.lock().await;
            let released = match active.take() {
                Some(released) => {
                    released.timer.abort();
                    info!("Confinement of {} released early", user_id);
                    self.restore(&released.record).await;
                    Ok(released.record)
                }
                None => Err(ConfinementError::NotConfined),
            };
            released
        };
        self.reap(user_id);
        released
    }

    async fn restore(&self, record: &ConfinementRecord) {
        let Some(original) = record.original_channel else {
            return;
        };

        match self
            .transport
            .current_channel(record.guild_id, record.user_id)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("{} left voice, nothing to restore", record.user_id);
                return;
            }
            Err(e) => warn!("Could not look up voice state of {}: {}", record.user_id, e),
        }

        if let Err(e) = self
            .transport
            .move_member(record.guild_id, record.user_id, original)
            .await
        {
            error!("Failed to return {} to channel {}: {}", record.user_id, original, e);
        }
    }

    /// Gateway path. Returns `true` when an escape was corrected.
    ///
    /// Events are applied in the order they reach the slot lock. The event
    /// manager dispatches each gateway event on its own task, so two events
    /// for the same user that arrive back to back may be applied in either
    /// order.
    pub async fn handle_channel_change(&self, change: ChannelStateChange) -> bool {
        let now = Utc::now();
        debug!(
            "Voice state change: {} ({}) {:?} -> {:?}",
            change.display_name, change.user_id, change.previous_channel, change.new_channel
        );

        self.presence.prune(now).await;

        let user_id = change.user_id;
        let corrected = {
            let slot = self.slot(user_id);
            let active = slot.lock().await;

            let mut corrected = false;
            if let (Some(confinement), Some(new_channel)) = (active.as_ref(), change.new_channel) {
                let record = &confinement.record;
                if new_channel != record.confinement_channel && !self.is_stale(record, &change).await {
                    corrected = true;
                    self.correct_escape(record, &change.display_name).await;
                }
            }

            match (change.previous_channel, change.new_channel) {
                (None, Some(_)) => {
                    self.presence
                        .record_connect(user_id, change.display_name, now)
                        .await
                }
                (Some(_), None) => self.presence.record_disconnect(user_id, now).await,
                _ => {}
            }

            corrected
        };
        self.reap(user_id);
        corrected
    }

    /// A move out of the original channel that is delivered after the
    /// confinement was installed describes where the member was before being
    /// confined. If they already sit in the holding channel there is nothing
    /// to correct.
    async fn is_stale(&self, record: &ConfinementRecord, change: &ChannelStateChange) -> bool {
        if change.previous_channel.is_none() || change.previous_channel != record.original_channel {
            return false;
        }

        match self
            .transport
            .current_channel(record.guild_id, record.user_id)
            .await
        {
            Ok(current) => {
                let stale = current == Some(record.confinement_channel);
                if stale {
                    debug!("Ignoring pre-confinement move of {}", record.user_id);
                }
                stale
            }
            Err(e) => {
                warn!("Could not look up voice state of {}: {}", record.user_id, e);
                false
            }
        }
    }

    async fn correct_escape(&self, record: &ConfinementRecord, display_name: &str) {
        info!("{} tried to leave the holding channel", record.user_id);

        if let Err(e) = self
            .transport
            .move_member(record.guild_id, record.user_id, record.confinement_channel)
            .await
        {
            error!("Failed to move {} back into holding: {}", record.user_id, e);
        }

        let notice = format!(
            "🚨 **{}** (<@{}>) tried to leave <#{}> and was moved back. Release <t:{}:R>.",
            display_name,
            record.user_id,
            record.confinement_channel,
            record.ends_at().timestamp()
        );
        let target = record.notify_channel.unwrap_or(record.confinement_channel);
        if let Err(e) = self.transport.send_message(target, &notice).await {
            warn!("Failed to post escape notice: {}", e);
        }
    }

    pub async fn get(&self, user_id: u64) -> Option<ConfinementRecord> {
        let slot = self.slots.get(&user_id).map(|s| Arc::clone(s.value()))?;
        let active = slot.lock().await;
        active.as_ref().map(|a| a.record.clone())
    }

    pub async fn active(&self) -> Vec<ConfinementRecord> {
        let slots: Vec<Slot> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();

        let mut records = Vec::new();
        for slot in slots {
            if let Some(active) = slot.lock().await.as_ref() {
                records.push(active.record.clone());
            }
        }
        records.sort_by_key(|r| r.start_time);
        records
    }
}
