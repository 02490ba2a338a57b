//! Newznab category conventions and kind routing

use outpost_core::models::MediaKind;

pub const CAT_MOVIES: i32 = 2000;
pub const CAT_TV: i32 = 5000;
pub const CAT_MUSIC: i32 = 3000;
pub const CAT_BOOKS: i32 = 7000;

/// What a numeric newznab category denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Movie,
    Tv,
    Anime,
    Music,
    Book,
    Other,
}

/// Classify one numeric category per the newznab conventions:
/// 2000-range movies, 5000-5069 tv, 5070-5079 and 100000+ anime,
/// 3000-range music, 7000-range books.
pub fn kind_for_category(category: i32) -> CategoryKind {
    match category {
        2000..=2999 => CategoryKind::Movie,
        5070..=5079 => CategoryKind::Anime,
        5000..=5069 => CategoryKind::Tv,
        5080..=5999 => CategoryKind::Tv,
        3000..=3999 => CategoryKind::Music,
        7000..=7999 => CategoryKind::Book,
        c if c >= 100_000 => CategoryKind::Anime,
        _ => CategoryKind::Other,
    }
}

/// Whether every category of an indexer is anime.
pub fn is_anime_only(categories: &[i32]) -> bool {
    !categories.is_empty()
        && categories
            .iter()
            .all(|&c| kind_for_category(c) == CategoryKind::Anime)
}

/// Whether an indexer with the given category set should be queried for a
/// media kind. Indexers with no declared categories are treated as general
/// purpose. Anime-only indexers are excluded from movie/tv searches.
pub fn indexer_supports_kind(categories: &[i32], kind: MediaKind) -> bool {
    if categories.is_empty() {
        return true;
    }
    if is_anime_only(categories) {
        return false;
    }
    let wanted = match kind {
        MediaKind::Movie => CategoryKind::Movie,
        MediaKind::Show => CategoryKind::Tv,
    };
    categories.iter().any(|&c| {
        let k = kind_for_category(c);
        k == wanted || (kind == MediaKind::Show && k == CategoryKind::Anime)
    })
}
