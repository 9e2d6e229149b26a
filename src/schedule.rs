use std::{fmt, sync::Arc};

use chrono::{DateTime, Datelike, Days, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    device::{Device, DeviceCommand, DeviceState},
    dispatch::{dispatch_commands, DeviceCommandChannel},
    store::{HomeSettings, KeyByteValueStore},
};

pub const SCHEDULES_KEY: &str = "schedules";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleAction {
    LampOn,
    LampOff,
    LedOn,
    LedOff,
    PrizaOn,
    PrizaOff,
    BarrierOpen,
    BarrierClose,
}

impl ScheduleAction {
    pub const ALL: [ScheduleAction; 8] = [
        ScheduleAction::LampOn,
        ScheduleAction::LampOff,
        ScheduleAction::LedOn,
        ScheduleAction::LedOff,
        ScheduleAction::PrizaOn,
        ScheduleAction::PrizaOff,
        ScheduleAction::BarrierOpen,
        ScheduleAction::BarrierClose,
    ];

    pub fn command(&self) -> DeviceCommand {
        match self {
            ScheduleAction::LampOn => (Device::Lamp, DeviceState::On),
            ScheduleAction::LampOff => (Device::Lamp, DeviceState::Off),
            ScheduleAction::LedOn => (Device::Led, DeviceState::On),
            ScheduleAction::LedOff => (Device::Led, DeviceState::Off),
            ScheduleAction::PrizaOn => (Device::Priza, DeviceState::On),
            ScheduleAction::PrizaOff => (Device::Priza, DeviceState::Off),
            ScheduleAction::BarrierOpen => (Device::Barrier, DeviceState::Open),
            ScheduleAction::BarrierClose => (Device::Barrier, DeviceState::Close),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ScheduleAction::LampOn => "lamp_on",
            ScheduleAction::LampOff => "lamp_off",
            ScheduleAction::LedOn => "led_on",
            ScheduleAction::LedOff => "led_off",
            ScheduleAction::PrizaOn => "priza_on",
            ScheduleAction::PrizaOff => "priza_off",
            ScheduleAction::BarrierOpen => "barrier_open",
            ScheduleAction::BarrierClose => "barrier_close",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.key() == key)
    }
}

impl fmt::Display for ScheduleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (device, state) = self.command();
        write!(f, "{} {state}", device.label())
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("select at least one day")]
    NoDays,
    #[error("{hour:02}:{minute:02} is not a time of day")]
    InvalidTime { hour: u32, minute: u32 },
    #[error("for today the time has to be in the future")]
    TimeInPast,
    #[error("no schedule with id {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// An action repeated every week at a fixed local time on the selected days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: String,
    pub action: ScheduleAction,
    pub hour: u32,
    pub minute: u32,
    pub days: Vec<Weekday>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    #[serde(default)]
    pub last_executed: Option<NaiveDateTime>,
}

impl RecurringSchedule {
    pub fn new(action: ScheduleAction, hour: u32, minute: u32, days: Vec<Weekday>) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("{:x}", created_at.timestamp_millis()),
            action,
            hour,
            minute,
            days,
            created_at,
            enabled: true,
            last_executed: None,
        }
    }

    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }

    fn runs_on(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }

    /// Checks the schedule can be saved at local time `now`.
    pub fn validate(&self, now: NaiveDateTime) -> Result<(), ScheduleError> {
        if self.days.is_empty() {
            return Err(ScheduleError::NoDays);
        }
        let time = self.time().ok_or(ScheduleError::InvalidTime {
            hour: self.hour,
            minute: self.minute,
        })?;
        if self.runs_on(now.weekday()) && now.date().and_time(time) <= now {
            return Err(ScheduleError::TimeInPast);
        }
        Ok(())
    }

    /// First occurrence strictly after `now`.
    pub fn next_run_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if !self.enabled {
            return None;
        }
        let time = self.time()?;
        // a week and a day covers "same weekday, earlier time"
        (0..=7u64)
            .filter_map(|offset| now.date().checked_add_days(Days::new(offset)))
            .filter(|date| self.runs_on(date.weekday()))
            .map(|date| date.and_time(time))
            .find(|candidate| *candidate > now)
    }

    /// Whether today's occurrence has come and not been executed yet.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        let Some(time) = self.time() else {
            return false;
        };
        if !self.enabled || !self.runs_on(now.weekday()) {
            return false;
        }
        let scheduled = now.date().and_time(time);
        scheduled <= now && self.last_executed.map_or(true, |last| last < scheduled)
    }

    pub fn describe(&self) -> String {
        let days = if self.days.len() == 7 {
            "every day".to_string()
        } else {
            let mut days = self.days.clone();
            days.sort_by_key(|d| d.num_days_from_monday());
            days.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        };
        format!("{} at {:02}:{:02}, {days}", self.action, self.hour, self.minute)
    }
}

impl<S> HomeSettings<S>
where S: KeyByteValueStore
{
    /// All schedules, newest first.
    pub fn schedules(&self) -> anyhow::Result<Vec<RecurringSchedule>> {
        let mut schedules: Vec<RecurringSchedule> =
            self.get_json(SCHEDULES_KEY)?.unwrap_or_default();
        schedules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(schedules)
    }

    fn save_schedules(&mut self, schedules: &[RecurringSchedule]) -> anyhow::Result<()> {
        self.set_json(SCHEDULES_KEY, &schedules)
    }

    /// Validates and stores `schedule`, returning its id.
    pub fn add_schedule(
        &mut self,
        mut schedule: RecurringSchedule,
        now: NaiveDateTime,
    ) -> Result<String, ScheduleError> {
        schedule.validate(now)?;
        let mut schedules = self.schedules()?;
        let base = schedule.id.clone();
        let mut n = 1;
        while schedules.iter().any(|s| s.id == schedule.id) {
            schedule.id = format!("{base}-{n}");
            n += 1;
        }
        let id = schedule.id.clone();
        log::info!("adding schedule {id}: {}", schedule.describe());
        schedules.push(schedule);
        self.save_schedules(&schedules)?;
        Ok(id)
    }

    pub fn remove_schedule(&mut self, id: &str) -> Result<(), ScheduleError> {
        let mut schedules = self.schedules()?;
        let before = schedules.len();
        schedules.retain(|s| s.id != id);
        if schedules.len() == before {
            return Err(ScheduleError::NotFound(id.to_string()));
        }
        self.save_schedules(&schedules)?;
        Ok(())
    }

    /// Flips `enabled`, returning the new value.
    pub fn toggle_schedule(&mut self, id: &str) -> Result<bool, ScheduleError> {
        let mut schedules = self.schedules()?;
        let schedule = schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        schedule.enabled = !schedule.enabled;
        let enabled = schedule.enabled;
        self.save_schedules(&schedules)?;
        Ok(enabled)
    }

    pub fn due_schedules(&self, now: NaiveDateTime) -> anyhow::Result<Vec<RecurringSchedule>> {
        Ok(self
            .schedules()?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect())
    }

    pub fn mark_executed(&mut self, id: &str, at: NaiveDateTime) -> Result<(), ScheduleError> {
        let mut schedules = self.schedules()?;
        let schedule = schedules
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        schedule.last_executed = Some(at);
        self.save_schedules(&schedules)?;
        Ok(())
    }
}

/// Sends the commands of all schedules due at `now` and marks them executed.
///
/// A schedule counts as executed even if its command failed, so an
/// unreachable device doesn't get the command again on every tick.
pub async fn run_due_schedules<S>(
    settings: &Arc<Mutex<HomeSettings<S>>>,
    channel: &Arc<dyn DeviceCommandChannel>,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<RecurringSchedule>>
where S: KeyByteValueStore
{
    let due = {
        let mut settings = settings.lock().await;
        let due = settings.due_schedules(now)?;
        for schedule in &due {
            settings.mark_executed(&schedule.id, now)?;
        }
        due
    };

    if due.is_empty() {
        return Ok(due);
    }

    let commands: Vec<_> = due.iter().map(|s| s.action.command()).collect();
    let report = dispatch_commands(channel, &commands).await;
    for schedule in &due {
        log::info!("ran schedule {}: {}", schedule.id, schedule.describe());
    }
    if !report.all_succeeded() {
        log::warn!("{} scheduled command(s) failed", report.failed.len());
    }
    Ok(due)
}
