// src/filter.rs
use crate::model::Item;

/// Keep items with at least `min_likes` likes. Pure and total; the cheap
/// pre-filter that runs before any oracle spend.
pub fn by_engagement(items: Vec<Item>, min_likes: u64) -> Vec<Item> {
    items.into_iter().filter(|i| i.likes >= min_likes).collect()
}
