//! Domain records exchanged between the server and its clients
//!
//! Field names follow the camelCase layout of the hotel, review and user data
//! files so snapshots written by earlier deployments keep loading.

use serde::{Deserialize, Serialize};

/// Per-category rating block shared by hotels (running averages) and reviews
/// (the integer scores a reviewer submitted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratings {
    pub cleaning: f64,
    pub position: f64,
    pub services: f64,
    pub quality: f64,
}

impl Ratings {
    pub fn new(cleaning: f64, position: f64, services: f64, quality: f64) -> Self {
        Self {
            cleaning,
            position,
            services,
            quality,
        }
    }

    /// Builds a rating block from the four validated category scores in
    /// cleaning, position, services, quality order.
    pub fn from_scores(scores: [u8; 4]) -> Self {
        Self::new(
            f64::from(scores[0]),
            f64::from(scores[1]),
            f64::from(scores[2]),
            f64::from(scores[3]),
        )
    }

    /// Mean of the four categories
    pub fn average(&self) -> f64 {
        (self.cleaning + self.position + self.services + self.quality) / 4.0
    }

    /// Folds one more sample into a running mean that currently covers `count` samples
    pub fn fold(&mut self, sample: &Ratings, count: u32) {
        let n = f64::from(count);
        self.cleaning = (self.cleaning * n + sample.cleaning) / (n + 1.0);
        self.position = (self.position * n + sample.position) / (n + 1.0);
        self.services = (self.services * n + sample.services) / (n + 1.0);
        self.quality = (self.quality * n + sample.quality) / (n + 1.0);
    }
}

/// Scoring state kept inline in every hotel.
///
/// The `original_*` values are raw scores, the `normalized_*` values are the
/// raw scores rescaled onto 0..=10 against the city maxima, and
/// `ranking_score` is the sum of the three normalized components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreState {
    pub original_quality: f64,
    pub original_quantity: f64,
    pub original_relevance: f64,
    pub normalized_quality: f64,
    pub normalized_quantity: f64,
    pub normalized_relevance: f64,
    pub ranking_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub services: Vec<String>,
    /// Mean of the global scores of every review received
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub ratings: Ratings,
    #[serde(default)]
    pub number_of_reviews: u32,
    #[serde(flatten)]
    pub scores: ScoreState,
}

impl Hotel {
    pub fn new(id: u32, name: &str, city: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            city: city.to_string(),
            phone: String::new(),
            services: Vec::new(),
            rate: 0.0,
            ratings: Ratings::default(),
            number_of_reviews: 0,
            scores: ScoreState::default(),
        }
    }

    /// Applies a new review to the aggregate rate and category averages.
    ///
    /// The first review replaces whatever aggregate the hotel was loaded with;
    /// later reviews are folded into the running means.
    pub fn record_review(&mut self, review: &Review) {
        let count = self.number_of_reviews;
        if count == 0 {
            self.rate = f64::from(review.global_score);
            self.ratings = review.single_scores;
        } else {
            let n = f64::from(count);
            self.rate = (self.rate * n + f64::from(review.global_score)) / (n + 1.0);
            self.ratings.fold(&review.single_scores, count);
        }
        self.number_of_reviews = count + 1;
    }

    pub fn summary(&self) -> HotelSummary {
        HotelSummary::from(self)
    }
}

/// Client-facing view of a hotel: everything except the normalization state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelSummary {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub city: String,
    pub phone: String,
    pub services: Vec<String>,
    pub rate: f64,
    pub ratings: Ratings,
    pub ranking_score: f64,
    pub number_of_reviews: u32,
}

impl From<&Hotel> for HotelSummary {
    fn from(hotel: &Hotel) -> Self {
        Self {
            id: hotel.id,
            name: hotel.name.clone(),
            description: hotel.description.clone(),
            city: hotel.city.clone(),
            phone: hotel.phone.clone(),
            services: hotel.services.clone(),
            rate: hotel.rate,
            ratings: hotel.ratings,
            ranking_score: hotel.scores.ranking_score,
            number_of_reviews: hotel.number_of_reviews,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub user_id: String,
    /// Submission time in milliseconds since the Unix epoch
    pub time: u64,
    pub hotel_name: String,
    pub city: String,
    pub global_score: u8,
    pub single_scores: Ratings,
}

/// Experience tiers, ordered by the number of reviews needed to reach them
///
/// Users files that store the upper-case tier names (`RECENSORE`,
/// `CONTRIBUTORE_ESPERTO`, ...) load as the matching tier and are written
/// back with the English labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Badge {
    #[serde(rename = "Reviewer", alias = "RECENSORE")]
    Reviewer,
    #[serde(rename = "Expert reviewer", alias = "RECENSORE_ESPERTO")]
    ExpertReviewer,
    #[serde(rename = "Contributor", alias = "CONTRIBUTORE")]
    Contributor,
    #[serde(rename = "Expert contributor", alias = "CONTRIBUTORE_ESPERTO")]
    ExpertContributor,
    #[serde(rename = "Super contributor", alias = "CONTRIBUTORE_SUPER")]
    SuperContributor,
}

impl Badge {
    pub const LADDER: [Badge; 5] = [
        Badge::Reviewer,
        Badge::ExpertReviewer,
        Badge::Contributor,
        Badge::ExpertContributor,
        Badge::SuperContributor,
    ];

    /// Reviews required to hold this badge
    pub fn threshold(self) -> u32 {
        match self {
            Badge::Reviewer => 0,
            Badge::ExpertReviewer => 10,
            Badge::Contributor => 20,
            Badge::ExpertContributor => 30,
            Badge::SuperContributor => 40,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Badge::Reviewer => "Reviewer",
            Badge::ExpertReviewer => "Expert reviewer",
            Badge::Contributor => "Contributor",
            Badge::ExpertContributor => "Expert contributor",
            Badge::SuperContributor => "Super contributor",
        }
    }

    /// Highest tier whose threshold `reviews` meets
    pub fn for_review_count(reviews: u32) -> Self {
        Self::LADDER
            .iter()
            .rev()
            .copied()
            .find(|badge| reviews >= badge.threshold())
            .unwrap_or(Badge::Reviewer)
    }
}

impl Default for Badge {
    fn default() -> Self {
        Badge::Reviewer
    }
}
