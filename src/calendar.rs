//! Slot allocator: the calendar of bookable (date, window, truck) slots.
//!
//! Slots are created once over the scheduling horizon and only change
//! occupancy afterwards. `book` is the single path that sets an occupant and
//! `release` its inverse.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::config::CalendarConfig;
use crate::error::PlanningError;
use crate::model::{
    BookingSource, LoadId, Occupant, SizeMix, SlotKey, TimeSlot, TimeWindow, TruckId, TruckLoad, TruckSpec,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    slots: BTreeMap<SlotKey, TimeSlot>,
    trucks: Vec<TruckSpec>,
}

impl Calendar {
    /// Every (date, window, truck) triple over the configured horizon, all free.
    pub fn new(config: &CalendarConfig) -> Self {
        let dates = (0..config.days).filter_map(|offset| config.start_date.checked_add_days(Days::new(offset.into())));
        let mut slots = BTreeMap::new();
        for date in dates {
            for window in &config.windows {
                for truck in &config.trucks {
                    let key = SlotKey {
                        date,
                        window: *window,
                        truck: truck.id.clone(),
                    };
                    slots.insert(key.clone(), TimeSlot::free(key));
                }
            }
        }
        Self {
            slots,
            trucks: config.trucks.clone(),
        }
    }

    /// Rebuild from persisted slots.
    pub fn from_slots(trucks: Vec<TruckSpec>, slots: impl IntoIterator<Item = TimeSlot>) -> Self {
        Self {
            slots: slots.into_iter().map(|slot| (slot.key.clone(), slot)).collect(),
            trucks,
        }
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&TimeSlot> {
        self.slots.get(key)
    }

    /// All slots in (date, window, truck) order.
    pub fn slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.values()
    }

    pub fn trucks(&self) -> &[TruckSpec] {
        &self.trucks
    }

    pub fn truck(&self, id: &TruckId) -> Option<&TruckSpec> {
        self.trucks.iter().find(|truck| &truck.id == id)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.slots.keys().any(|key| key.date == date)
    }

    pub fn has_window(&self, window: &TimeWindow) -> bool {
        self.slots.keys().any(|key| &key.window == window)
    }

    /// Slot currently held by `load`, if any.
    pub fn slot_of(&self, load: LoadId) -> Option<&SlotKey> {
        self.slots
            .values()
            .find(|slot| slot.occupant.is_some_and(|occupant| occupant.load == load))
            .map(|slot| &slot.key)
    }

    /// Book the earliest free slot inside the load's date window whose truck
    /// can carry the load.
    pub fn allocate(&mut self, load: &TruckLoad, source: BookingSource) -> Result<SlotKey, PlanningError> {
        let key = self
            .slots
            .values()
            .filter(|slot| !slot.is_occupied())
            .filter(|slot| load.date_window.is_none_or(|window| window.contains(slot.key.date)))
            .find(|slot| self.truck_carries(&slot.key.truck, &load.signature))
            .map(|slot| slot.key.clone())
            .ok_or_else(|| {
                PlanningError::no_availability(format!("no free slot can take {} ({})", load.id, load.signature))
            })?;

        self.book(&key, Occupant { load: load.id, source })?;
        Ok(key)
    }

    /// First free slot at `date` and `window` whose truck can carry `mix`.
    pub fn find_free(&self, date: NaiveDate, window: &TimeWindow, mix: &SizeMix) -> Option<SlotKey> {
        self.slots
            .values()
            .filter(|slot| slot.key.date == date && &slot.key.window == window && !slot.is_occupied())
            .find(|slot| self.truck_carries(&slot.key.truck, mix))
            .map(|slot| slot.key.clone())
    }

    /// Occupy one explicit slot.
    pub fn book(&mut self, key: &SlotKey, occupant: Occupant) -> Result<(), PlanningError> {
        let slot = self
            .slots
            .get_mut(key)
            .ok_or_else(|| PlanningError::no_availability(format!("slot {key} is outside the calendar")))?;
        if let Some(current) = slot.occupant {
            return Err(PlanningError::SlotConflict {
                slot: key.clone(),
                occupant: current.load,
            });
        }
        slot.occupant = Some(occupant);
        debug!(slot = %key, load = %occupant.load, "slot booked");
        Ok(())
    }

    /// Free a slot, returning its former occupant.
    pub fn release(&mut self, key: &SlotKey) -> Option<Occupant> {
        let occupant = self.slots.get_mut(key)?.occupant.take();
        if let Some(occupant) = occupant {
            debug!(slot = %key, load = %occupant.load, "slot released");
        }
        occupant
    }

    /// Free every slot taken by a planning pass.
    pub fn release_planned(&mut self) -> usize {
        let mut released = 0;
        for slot in self.slots.values_mut() {
            if slot.occupant.is_some_and(|occupant| occupant.source == BookingSource::Planned) {
                slot.occupant = None;
                released += 1;
            }
        }
        released
    }

    /// Occupied share of each truck's slots, in percent.
    pub fn utilisation(&self) -> BTreeMap<TruckId, f64> {
        let mut counts: BTreeMap<TruckId, (usize, usize)> = self
            .trucks
            .iter()
            .map(|truck| (truck.id.clone(), (0, 0)))
            .collect();
        for slot in self.slots.values() {
            let (occupied, total) = counts.entry(slot.key.truck.clone()).or_default();
            *total += 1;
            if slot.is_occupied() {
                *occupied += 1;
            }
        }
        counts
            .into_iter()
            .map(|(truck, (occupied, total))| {
                let percent = if total == 0 {
                    0.0
                } else {
                    occupied as f64 * 100.0 / total as f64
                };
                (truck, percent)
            })
            .collect()
    }

    fn truck_carries(&self, truck: &TruckId, mix: &SizeMix) -> bool {
        self.truck(truck).is_some_and(|spec| spec.can_carry(mix))
    }
}
