//! Date and time selection for booking an appointment.
//!
//! Slots are offered every 30 minutes from 09:00 to 17:00 (UTC). The current
//! instant is always passed in so callers and tests control the clock.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::types::CreateAppointment;

const FIRST_SLOT_MINUTES: u32 = 9 * 60;
const LAST_SLOT_MINUTES: u32 = 17 * 60;
const SLOT_STEP_MINUTES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("{0} is in the past")]
    DateInPast(NaiveDate),
    #[error("select a date first")]
    NoDate,
    #[error("select a time first")]
    NoTime,
    #[error("{0} is not an available time")]
    TimeNotOffered(NaiveTime),
    #[error("a reason is required")]
    MissingReason,
}

/// Selection state behind the booking screen's date and time pickers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSelection {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
}

impl ScheduleSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    /// Times offered on `date`, skipping those already past at `now`.
    pub fn offered_times(date: NaiveDate, now: DateTime<Utc>) -> Vec<NaiveTime> {
        (FIRST_SLOT_MINUTES..=LAST_SLOT_MINUTES)
            .step_by(SLOT_STEP_MINUTES as usize)
            .filter_map(|minutes| NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0))
            .filter(|time| date.and_time(*time).and_utc() > now)
            .collect()
    }

    /// Times for the selected date; empty until a date is chosen.
    pub fn available_times(&self, now: DateTime<Utc>) -> Vec<NaiveTime> {
        self.date
            .map(|date| Self::offered_times(date, now))
            .unwrap_or_default()
    }

    /// Choose a date. A previously chosen time that is not offered on the
    /// new date is cleared.
    pub fn select_date(&mut self, date: NaiveDate, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        if date < now.date_naive() {
            return Err(ScheduleError::DateInPast(date));
        }
        self.date = Some(date);
        if let Some(time) = self.time {
            if !Self::offered_times(date, now).contains(&time) {
                self.time = None;
            }
        }
        Ok(())
    }

    pub fn select_time(&mut self, time: NaiveTime, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let date = self.date.ok_or(ScheduleError::NoDate)?;
        if !Self::offered_times(date, now).contains(&time) {
            return Err(ScheduleError::TimeNotOffered(time));
        }
        self.time = Some(time);
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        Some(self.date?.and_time(self.time?).and_utc())
    }

    /// Build the booking payload. The selection is re-checked against `now`
    /// so a slot that expired while the screen was open is refused.
    pub fn to_request(
        &self,
        pet_id: Uuid,
        clinic_id: Option<Uuid>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CreateAppointment, ScheduleError> {
        let date = self.date.ok_or(ScheduleError::NoDate)?;
        let time = self.time.ok_or(ScheduleError::NoTime)?;
        if !Self::offered_times(date, now).contains(&time) {
            return Err(ScheduleError::TimeNotOffered(time));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ScheduleError::MissingReason);
        }
        Ok(CreateAppointment {
            pet_id,
            clinic_id,
            scheduled_at: date.and_time(time).and_utc(),
            reason: reason.to_string(),
            notes: None,
        })
    }
}

/// The first day a booking can be made from `now`: today while slots remain,
/// otherwise tomorrow.
pub fn first_bookable_date(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    if ScheduleSelection::offered_times(today, now).is_empty() {
        (now + Duration::days(1)).date_naive()
    } else {
        today
    }
}
