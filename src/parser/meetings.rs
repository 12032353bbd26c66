use crate::models::MeetingTime;

use super::fields::MeetingBlock;

/// Day tokens the layout can emit: single days plus the contiguous
/// combinations the page is known to print in one slot.
const DAY_TOKENS: &[&str] = &["M", "T", "W", "R", "F", "S", "MW", "TR", "MWF", "MTWR", "MTWRF"];

/// Slot positions inside the 8-cell block reserved for day groups; the
/// unused ones stay blank. The final slot carries the time range.
const DAY_SLOTS: &[usize] = &[1, 3, 5];
const TIME_SLOT: usize = 7;

/// Interpret the meeting-time block plus the location string into meeting
/// entries. Always returns at least one entry, so consumers never
/// special-case "no meeting time".
pub fn interpret(block: &MeetingBlock, location: &str) -> Vec<MeetingTime> {
    let slots = match block {
        // Merged free text ("arr in addition to ...") carries no slot
        // structure; the extractor keeps the text, we fall to location.
        MeetingBlock::Merged(_) => return vec![fallback(location)],
        MeetingBlock::Slots(slots) => slots,
    };

    // An arrangement marker anywhere in the block wins over partial
    // day/time tokens elsewhere in it.
    let joined = slots.join(" ");
    if joined.to_lowercase().contains("arr") {
        return vec![MeetingTime::arranged("ARR")];
    }

    if slots.len() >= 8 {
        let days: String = DAY_SLOTS
            .iter()
            .map(|&i| slots[i].trim())
            .filter(|tok| DAY_TOKENS.contains(tok))
            .collect();

        let time = slots[TIME_SLOT].trim();
        // A real clock range has both a colon and a range separator.
        if !days.is_empty() && time.contains(':') && time.contains('-') {
            if let Some((start, end)) = time.split_once('-') {
                return vec![MeetingTime::scheduled(days, start.trim(), end.trim())];
            }
        }
    }

    vec![fallback(location)]
}

/// The page never leaves the block silently empty: either the location says
/// asynchronous online, or the time is simply to be announced.
fn fallback(location: &str) -> MeetingTime {
    let loc = location.to_lowercase();
    if loc.contains("online") && loc.contains("async") {
        MeetingTime::arranged("ASYNC")
    } else {
        MeetingTime::arranged("TBA")
    }
}

// ── Tests ──
