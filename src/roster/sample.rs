//! Sample roster generation for drills and demos

use crate::events::TrackedPerson;
use crate::storage::Settings;
use rand::seq::SliceRandom;
use rand::Rng;

const NAMES: [&str; 15] = [
    "Juan Cruz",
    "Maria Santos",
    "Jose Reyes",
    "Ana Garcia",
    "Pedro Lopez",
    "Sofia Torres",
    "Miguel Ramos",
    "Isabel Flores",
    "Carlos Mendoza",
    "Lucia Hernandez",
    "Diego Fernandez",
    "Carmen Morales",
    "Rafael Silva",
    "Elena Rodriguez",
    "Antonio Diaz",
];
const GROUPS: [&str; 6] = [
    "Grade 7", "Grade 8", "Grade 9", "Grade 10", "Grade 11", "Grade 12",
];
const SECTIONS: [&str; 4] = ["A", "B", "C", "D"];

/// Share of generated people who carry a GPS locator
const LOCATOR_SHARE: f64 = 0.7;
/// Half-width in degrees of the square around the campus centre
const SPREAD: f64 = 0.005;

/// Generate `count` people scattered around the campus
///
/// Identifiers continue from `existing`, so appending a sample to a roster of
/// 10 people yields `STU0011` onwards.
pub fn sample_roster<R: Rng + ?Sized>(
    count: usize,
    existing: usize,
    campus: &Settings,
    rng: &mut R,
) -> Vec<TrackedPerson> {
    (1..=count)
        .map(|i| {
            let n = existing + i;
            let name = NAMES.choose(rng).copied().unwrap_or("Student");
            let group = GROUPS.choose(rng).copied().unwrap_or("Grade 7");
            let section = SECTIONS.choose(rng).copied().unwrap_or("A");

            let mut person = TrackedPerson::new(
                format!("STU{:04}", n),
                format!("{} {}", name, n),
                group,
                campus.latitude + rng.gen_range(-SPREAD..SPREAD),
                campus.longitude + rng.gen_range(-SPREAD..SPREAD),
            )
            .with_section(section)
            .with_contact(format!("+63 9{:09}", rng.gen_range(0..1_000_000_000u32)))
            .with_tag(format!("RFID{:05}", rng.gen_range(0..100_000u32)));

            if rng.gen_bool(LOCATOR_SHARE) {
                person = person.with_locator(format!("GPS{:04}", rng.gen_range(0..10_000u32)));
            }
            person
        })
        .collect()
}
