use std::collections::HashSet;

use tracing::debug;

use crate::domain::candidate::{Candidate, CandidateId, CandidateSpecs, RecommendationSetId};
use crate::domain::price::parse_price;
use crate::recommendation::grounding::RawListing;

const SEGMENT_SEPARATORS: [char; 5] = [',', ';', '|', '\n', '•'];

const CPU_MARKERS: [&str; 11] = [
    "intel", "ryzen", "core i", "core ultra", "apple m", "snapdragon", "celeron", "pentium",
    "mediatek", "processor", "cpu",
];
const GPU_MARKERS: [&str; 9] =
    ["nvidia", "geforce", "rtx", "gtx", "radeon", "iris", "uhd graphics", "graphics", "gpu"];
const RAM_MARKERS: [&str; 5] = ["ram", "memory", "ddr", "lpddr", "unified"];
const STORAGE_MARKERS: [&str; 6] = ["ssd", "hdd", "nvme", "emmc", "storage", "pcie"];
const DISPLAY_MARKERS: [&str; 12] =
    ["inch", "\"", "display", "screen", "fhd", "qhd", "uhd", "oled", "ips", "hz", "retina", "wuxga"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpecSlot {
    Cpu,
    Ram,
    Gpu,
    Storage,
    Display,
}

/// Keyword extraction of the five core attributes from a free-text spec blob.
///
/// Each attribute keeps the first segment that mentions it; `key: value`
/// segments are routed by their key.
pub fn parse_specs(blob: &str) -> CandidateSpecs {
    let mut specs = CandidateSpecs::default();

    for segment in blob.split(SEGMENT_SEPARATORS) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (slot, value) = match keyed_segment(segment) {
            Some((slot, value)) => (Some(slot), value),
            None => (classify(segment), segment),
        };
        let Some(slot) = slot else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        let target = match slot {
            SpecSlot::Cpu => &mut specs.cpu,
            SpecSlot::Ram => &mut specs.ram,
            SpecSlot::Gpu => &mut specs.gpu,
            SpecSlot::Storage => &mut specs.storage,
            SpecSlot::Display => &mut specs.display,
        };
        if target.is_none() {
            *target = Some(value.to_string());
        }
    }

    specs
}

fn keyed_segment(segment: &str) -> Option<(SpecSlot, &str)> {
    let (key, value) = segment.split_once(':')?;
    let slot = match key.trim().to_lowercase().as_str() {
        "cpu" | "processor" | "chip" | "chipset" => SpecSlot::Cpu,
        "ram" | "memory" => SpecSlot::Ram,
        "gpu" | "graphics" | "graphics card" => SpecSlot::Gpu,
        "storage" | "ssd" | "hdd" | "disk" => SpecSlot::Storage,
        "display" | "screen" | "panel" => SpecSlot::Display,
        _ => return None,
    };
    Some((slot, value))
}

fn classify(segment: &str) -> Option<SpecSlot> {
    let lower = segment.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|marker| lower.contains(marker));

    let has_size = lower.contains("gb") || lower.contains("tb");
    let tokens = lower.split(|character: char| !character.is_ascii_alphanumeric()).collect::<Vec<_>>();
    let cpu_model = tokens
        .iter()
        .any(|token| matches!(*token, "i3" | "i5" | "i7" | "i9" | "m1" | "m2" | "m3" | "m4"));

    if lower.contains("iris") || lower.contains("uhd graphics") {
        return Some(SpecSlot::Gpu);
    }
    // "Ryzen 5 with Radeon Graphics" describes the processor, not a discrete GPU.
    if (mentions(&CPU_MARKERS) || cpu_model) && !lower.contains("rtx") && !lower.contains("gtx") {
        return Some(SpecSlot::Cpu);
    }
    if mentions(&GPU_MARKERS) || tokens.contains(&"arc") {
        return Some(SpecSlot::Gpu);
    }
    if has_size && mentions(&STORAGE_MARKERS) {
        return Some(SpecSlot::Storage);
    }
    if has_size && mentions(&RAM_MARKERS) {
        return Some(SpecSlot::Ram);
    }
    if mentions(&DISPLAY_MARKERS) {
        return Some(SpecSlot::Display);
    }
    if lower.contains("tb") {
        return Some(SpecSlot::Storage);
    }
    None
}

/// Turns raw listings into candidates for one set, dropping duplicates by listing key.
///
/// Listings without a title or a readable price are dropped here; the
/// core-spec check happens in the viability filter.
pub fn build_candidates(listings: &[RawListing], set_id: &RecommendationSetId) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for listing in listings {
        let title = listing.title.trim();
        if title.is_empty() {
            continue;
        }
        let id = CandidateId::from_title(title);
        if !seen.insert(id.clone()) {
            debug!(
                event_name = "recommendation.listing.duplicate_dropped",
                candidate_id = %id.0,
                "dropping duplicate listing"
            );
            continue;
        }
        let Some(price) = parse_price(&listing.price) else {
            debug!(
                event_name = "recommendation.listing.unpriced_dropped",
                candidate_id = %id.0,
                "dropping listing without a readable price"
            );
            continue;
        };

        let link = listing.link.as_deref().map(str::trim).filter(|link| !link.is_empty());
        candidates.push(Candidate::new(
            id,
            set_id.clone(),
            title.to_string(),
            parse_specs(&listing.specs),
            price,
            listing.price.trim().to_string(),
            link.map(str::to_string),
            clean_notes(&listing.pros),
            clean_notes(&listing.cons),
        ));
    }

    candidates
}

fn clean_notes(notes: &[String]) -> Vec<String> {
    notes.iter().map(|note| note.trim()).filter(|note| !note.is_empty()).map(str::to_string).collect()
}

/// Extracts the largest capacity in gigabytes from text like "16GB" or "1TB SSD".
pub(crate) fn capacity_gb(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let chars = lower.chars().collect::<Vec<_>>();
    let mut best: Option<f64> = None;
    let mut index = 0;

    while index < chars.len() {
        if !chars[index].is_ascii_digit() {
            index += 1;
            continue;
        }
        let start = index;
        while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
            index += 1;
        }
        let Ok(amount) = chars[start..index].iter().collect::<String>().parse::<f64>() else {
            continue;
        };
        let unit = chars[index..].iter().collect::<String>();
        let unit = unit.trim_start();
        let gigabytes = if unit.starts_with("tb") {
            amount * 1024.0
        } else if unit.starts_with("gb") {
            amount
        } else {
            continue;
        };
        best = Some(best.map_or(gigabytes, |current: f64| current.max(gigabytes)));
    }

    best
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{build_candidates, capacity_gb, parse_specs};
    use crate::domain::candidate::RecommendationSetId;
    use crate::recommendation::grounding::RawListing;

    #[test]
    fn spec_blobs_are_split_into_core_attributes() {
        let specs = parse_specs(
            "AMD Ryzen 7 7840HS with Radeon Graphics, 16GB DDR5 RAM, 1TB NVMe SSD, \
             NVIDIA GeForce RTX 4060 8GB, 15.6\" FHD 144Hz IPS",
        );

        assert_eq!(specs.cpu.as_deref(), Some("AMD Ryzen 7 7840HS with Radeon Graphics"));
        assert_eq!(specs.ram.as_deref(), Some("16GB DDR5 RAM"));
        assert_eq!(specs.storage.as_deref(), Some("1TB NVMe SSD"));
        assert_eq!(specs.gpu.as_deref(), Some("NVIDIA GeForce RTX 4060 8GB"));
        assert_eq!(specs.display.as_deref(), Some("15.6\" FHD 144Hz IPS"));
    }

    #[test]
    fn keyed_segments_override_keyword_guessing() {
        let specs = parse_specs("Processor: Apple M3 | Memory: 8GB unified | Storage: 256GB | Screen: 13.6 Liquid Retina");

        assert_eq!(specs.cpu.as_deref(), Some("Apple M3"));
        assert_eq!(specs.ram.as_deref(), Some("8GB unified"));
        assert_eq!(specs.storage.as_deref(), Some("256GB"));
        assert_eq!(specs.display.as_deref(), Some("13.6 Liquid Retina"));
        assert!(specs.gpu.is_none());
    }

    #[test]
    fn candidates_are_deduplicated_and_require_a_price() {
        let set_id = RecommendationSetId("set-1".to_string());
        let listings = vec![
            RawListing::new("HP Victus 15", "i5-12450H, 16GB RAM", "Rs 58,990").with_link(" https://example.test/victus "),
            RawListing::new("HP  Victus 15", "i7, 16GB RAM", "Rs 69,990"),
            RawListing::new("Mystery Laptop", "8GB RAM", "price on request"),
            RawListing::new("   ", "16GB RAM", "50000"),
        ];

        let candidates = build_candidates(&listings, &set_id);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].price(), Decimal::from(58_990));
        assert_eq!(candidates[0].link(), Some("https://example.test/victus"));
        assert_eq!(candidates[0].specs().cpu.as_deref(), Some("i5-12450H"));
        assert_eq!(candidates[0].set_id(), &set_id);
    }

    #[test]
    fn capacities_normalise_to_gigabytes() {
        assert_eq!(capacity_gb("16GB"), Some(16.0));
        assert_eq!(capacity_gb("1TB SSD"), Some(1024.0));
        assert_eq!(capacity_gb("512 GB SSD + 1 TB HDD"), Some(1024.0));
        assert_eq!(capacity_gb("plenty"), None);
    }
}
