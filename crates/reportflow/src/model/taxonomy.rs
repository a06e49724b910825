//! Canonical chapter taxonomy. Every report is materialized with exactly
//! these sections, numbered 1..=N in this order.

pub const SECTION_TITLES: [&str; 8] = [
    "Market overview",
    "Market size and growth",
    "Competitive landscape",
    "Barriers to entry",
    "Customer segments",
    "Technology trends",
    "Regulatory environment",
    "Outlook",
];

pub fn section_count() -> u32 {
    SECTION_TITLES.len() as u32
}

/// Title for a 1-based order number.
pub fn title_for(order_no: u32) -> Option<&'static str> {
    let index = usize::try_from(order_no).ok()?.checked_sub(1)?;
    SECTION_TITLES.get(index).copied()
}

/// `(order_no, title)` pairs in order.
pub fn sections() -> impl Iterator<Item = (u32, &'static str)> {
    SECTION_TITLES
        .iter()
        .enumerate()
        .map(|(i, title)| (i as u32 + 1, *title))
}
