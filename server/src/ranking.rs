//! Hotel scoring, per-city normalization and ranking order
//!
//! Each hotel gets three raw scores: quality (mean of its category averages),
//! quantity (review count) and relevance (how recent its reviews are). They
//! are rescaled onto 0..=10 against the city's maxima and summed into a
//! ranking score between 0 and 30.
//!
//! Normalized values are relative to every other hotel in the city, so a
//! pass always rescores the whole city, never a single hotel.

use crate::utils::elapsed_minutes;
use shared::{Hotel, Review};
use std::cmp::Ordering;

pub const NORMALIZED_MAX: f64 = 10.0;

/// Per-city maxima that normalized scores are measured against
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CityStats {
    pub max_quality: f64,
    pub max_quantity: f64,
    pub max_relevance: f64,
}

/// Mean over `reviews` of `1 / (whole minutes since the review + 1)`.
/// Zero when there are no reviews.
pub fn relevance(reviews: &[Review], now_ms: u64) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: f64 = reviews
        .iter()
        .map(|review| 1.0 / (elapsed_minutes(review.time, now_ms) as f64 + 1.0))
        .sum();
    total / reviews.len() as f64
}

/// Rescales `value` onto 0..=10 relative to `max`
pub fn normalize(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        0.0
    } else {
        NORMALIZED_MAX * value / max
    }
}

/// Full scoring pass over one city.
///
/// `relevances[i]` is the relevance of `hotels[i]`. Quality and quantity
/// maxima only ever rise; the relevance maximum is taken from this pass alone
/// because relevance decays for every hotel at once.
pub fn rescore_city(hotels: &mut [Hotel], relevances: &[f64], stats: &mut CityStats) {
    debug_assert_eq!(hotels.len(), relevances.len());

    let mut pass_max_relevance: f64 = 0.0;
    for (hotel, &relevance) in hotels.iter_mut().zip(relevances) {
        let scores = &mut hotel.scores;
        scores.original_quality = hotel.ratings.average();
        scores.original_quantity = f64::from(hotel.number_of_reviews);
        scores.original_relevance = relevance;

        stats.max_quality = stats.max_quality.max(scores.original_quality);
        stats.max_quantity = stats.max_quantity.max(scores.original_quantity);
        pass_max_relevance = pass_max_relevance.max(relevance);
    }
    stats.max_relevance = pass_max_relevance;

    for hotel in hotels.iter_mut() {
        let scores = &mut hotel.scores;
        scores.normalized_quality = normalize(scores.original_quality, stats.max_quality);
        scores.normalized_quantity = normalize(scores.original_quantity, stats.max_quantity);
        scores.normalized_relevance = normalize(scores.original_relevance, stats.max_relevance);
        scores.ranking_score =
            scores.normalized_quality + scores.normalized_quantity + scores.normalized_relevance;
    }
}

/// Best hotel first: higher ranking score, then shorter name, then name order
pub fn compare(a: &Hotel, b: &Hotel) -> Ordering {
    b.scores
        .ranking_score
        .total_cmp(&a.scores.ranking_score)
        .then_with(|| a.name.len().cmp(&b.name.len()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sorts a city whose scores were just recomputed
pub fn sort_city(hotels: &mut [Hotel]) {
    hotels.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::Ratings;

    const MINUTE: u64 = 60_000;

    fn review_at(time: u64) -> Review {
        Review {
            user_id: "bob".to_string(),
            time,
            hotel_name: "Plaza".to_string(),
            city: "Rome".to_string(),
            global_score: 4,
            single_scores: Ratings::from_scores([4, 4, 4, 4]),
        }
    }

    fn hotel(name: &str, reviews: u32, average: f64) -> Hotel {
        let mut hotel = Hotel::new(0, name, "Rome");
        hotel.number_of_reviews = reviews;
        hotel.ratings = Ratings::new(average, average, average, average);
        hotel
    }

    #[test]
    fn test_relevance_of_fresh_and_old_reviews() {
        let now = 100 * MINUTE;
        assert_approx_eq!(relevance(&[review_at(now)], now), 1.0, 1e-9);
        assert_approx_eq!(relevance(&[review_at(now - 59_000)], now), 1.0, 1e-9);
        assert_approx_eq!(relevance(&[review_at(now - 3 * MINUTE)], now), 0.25, 1e-9);
        assert_approx_eq!(
            relevance(&[review_at(now), review_at(now - MINUTE)], now),
            0.75,
            1e-9
        );
        assert_eq!(relevance(&[], now), 0.0);
    }

    #[test]
    fn test_normalize_with_zero_max() {
        assert_eq!(normalize(3.0, 0.0), 0.0);
        assert_approx_eq!(normalize(2.5, 5.0), 5.0, 1e-9);
    }

    #[test]
    fn test_rescore_bounds() {
        let mut hotels = vec![
            hotel("Plaza", 3, 4.0),
            hotel("Grand", 1, 5.0),
            hotel("Empty", 0, 0.0),
        ];
        let mut stats = CityStats::default();
        rescore_city(&mut hotels, &[0.5, 1.0, 0.0], &mut stats);

        for hotel in &hotels {
            let scores = &hotel.scores;
            for value in [
                scores.normalized_quality,
                scores.normalized_quantity,
                scores.normalized_relevance,
            ] {
                assert!((0.0..=10.0).contains(&value));
            }
            assert!(scores.ranking_score <= 30.0);
        }

        assert_approx_eq!(hotels[0].scores.normalized_quantity, 10.0, 1e-9);
        assert_approx_eq!(hotels[1].scores.normalized_quality, 10.0, 1e-9);
        assert_approx_eq!(hotels[1].scores.normalized_relevance, 10.0, 1e-9);
        assert_eq!(hotels[2].scores.ranking_score, 0.0);
    }

    #[test]
    fn test_quality_and_quantity_maxima_are_sticky() {
        let mut stats = CityStats {
            max_quality: 5.0,
            max_quantity: 10.0,
            max_relevance: 1.0,
        };
        let mut hotels = vec![hotel("Plaza", 5, 2.5)];
        rescore_city(&mut hotels, &[0.2], &mut stats);

        assert_eq!(stats.max_quality, 5.0);
        assert_eq!(stats.max_quantity, 10.0);
        assert_approx_eq!(stats.max_relevance, 0.2, 1e-9);
        assert_approx_eq!(hotels[0].scores.normalized_quality, 5.0, 1e-9);
        assert_approx_eq!(hotels[0].scores.normalized_quantity, 5.0, 1e-9);
        assert_approx_eq!(hotels[0].scores.normalized_relevance, 10.0, 1e-9);
    }

    #[test]
    fn test_rising_maximum_renormalizes_every_hotel() {
        let mut stats = CityStats::default();
        let mut hotels = vec![hotel("Plaza", 1, 1.0), hotel("Grand", 1, 1.0)];
        rescore_city(&mut hotels, &[0.0, 0.0], &mut stats);
        assert_approx_eq!(hotels[0].scores.normalized_quantity, 10.0, 1e-9);

        hotels[1].number_of_reviews = 4;
        rescore_city(&mut hotels, &[0.0, 0.0], &mut stats);
        assert_approx_eq!(hotels[0].scores.normalized_quantity, 2.5, 1e-9);
        assert_approx_eq!(hotels[1].scores.normalized_quantity, 10.0, 1e-9);
    }

    #[test]
    fn test_order_tie_breaks() {
        let mut hotels = vec![
            hotel("Bbb", 0, 0.0),
            hotel("Aaaa", 0, 0.0),
            hotel("Aaa", 0, 0.0),
            hotel("Zz", 2, 3.0),
        ];
        let mut stats = CityStats::default();
        rescore_city(&mut hotels, &[0.0; 4], &mut stats);
        sort_city(&mut hotels);

        let names: Vec<&str> = hotels.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Zz", "Aaa", "Bbb", "Aaaa"]);
    }

    #[test]
    fn test_order_is_strict_for_distinct_names() {
        let a = hotel("Plaza", 0, 0.0);
        let b = hotel("Roma", 0, 0.0);
        assert_eq!(compare(&a, &b), Ordering::Greater);
        assert_eq!(compare(&b, &a), Ordering::Less);
        assert_eq!(compare(&a, &a), Ordering::Equal);
    }
}
