//! Time-slot and cooldown gate.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use sp_core::config::SlotAnchors;
use sp_core::{Slot, SlotPolicy};

/// Maps `now` (already in the publication timezone) onto a slot, if any.
pub fn current_slot(now: DateTime<Tz>, policy: &SlotPolicy) -> Option<Slot> {
    match policy {
        SlotPolicy::FixedWindows => fixed_window_slot(now.hour()),
        SlotPolicy::Anchored {
            anchors,
            enabled,
            window_minutes,
        } => anchored_slot(now.hour(), now.minute(), anchors, enabled, *window_minutes),
    }
}

/// Three contiguous windows: 09:00-13:00, 13:00-20:00, 20:00-23:59.
pub fn fixed_window_slot(hour: u32) -> Option<Slot> {
    match hour {
        9..=12 => Some(Slot::First),
        13..=19 => Some(Slot::Second),
        20..=23 => Some(Slot::Third),
        _ => None,
    }
}

/// A slot is open during its anchor hour, from the anchor minute up to
/// `window_minutes` past it. Disabled slots never match.
pub fn anchored_slot(
    hour: u32,
    minute: u32,
    anchors: &SlotAnchors,
    enabled: &BTreeSet<Slot>,
    window_minutes: u32,
) -> Option<Slot> {
    Slot::ALL.into_iter().find(|slot| {
        let anchor = anchors.get(*slot);
        enabled.contains(slot)
            && hour == anchor.hour
            && minute >= anchor.minute
            && minute - anchor.minute <= window_minutes
    })
}

/// Whether enough time has passed since the last publication. No previous
/// publication always passes.
pub fn cooldown_elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    let Some(last) = last else {
        return true;
    };
    match (now - last).to_std() {
        Ok(elapsed) => elapsed >= cooldown,
        // Last post is in the future: clock skew, treat as just published.
        Err(_) => cooldown.is_zero(),
    }
}
