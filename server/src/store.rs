//! Concurrent domain registries shared by the event loop and the schedulers
//!
//! The store owns four maps: users by username, hotels grouped by city,
//! reviews grouped by (city, hotel name), and normalization maxima per city.
//! Every map is a [`DashMap`], so handlers and background tasks can read and
//! write without a global lock.
//!
//! Lock order is hotels → reviews → city stats. The users map is never held
//! while another registry is locked, and no entry guard is held while the
//! same map is accessed again.

use crate::credentials::{self, CredentialError};
use crate::ranking::{self, CityStats};
use crate::ConnectionId;
use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::{Badge, Hotel, HotelSummary, Review};
use thiserror::Error;

type ReviewKey = (String, String);

fn review_key(city: &str, hotel: &str) -> ReviewKey {
    (city.to_string(), hotel.to_string())
}

/// A registered account as kept in memory and in the users file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    /// SHA-256 hex digest of the password
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub number_of_reviews_written: u32,
    #[serde(default)]
    pub level: Badge,
    /// Connection that owns the session; `-1` on disk when there is none
    #[serde(default, with = "owner_id")]
    pub id_client: Option<ConnectionId>,
}

impl User {
    pub fn new(username: &str, password_hash: String) -> Self {
        Self {
            username: username.to_string(),
            password_hash,
            is_logged_in: false,
            number_of_reviews_written: 0,
            level: Badge::Reviewer,
            id_client: None,
        }
    }

    fn log_out(&mut self) {
        self.is_logged_in = false;
        self.id_client = None;
    }
}

mod owner_id {
    use crate::ConnectionId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        owner: &Option<ConnectionId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match owner {
            Some(id) => serializer.serialize_u64(*id),
            None => serializer.serialize_i64(-1),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ConnectionId>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Ok(ConnectionId::try_from(raw).ok())
    }
}

/// Full contents of the store, as loaded at startup and saved periodically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub hotels: Vec<Hotel>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccountError {
    #[error("username already exists")]
    UsernameExists,
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("unknown username")]
    UnknownUser,
    #[error("user already logged in")]
    AlreadyLoggedIn,
    #[error("wrong password")]
    WrongPassword,
    #[error("user not logged in")]
    NotLoggedIn,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("no hotels in that city")]
    CityNotFound,
    #[error("no such hotel in that city")]
    HotelNotFound,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReviewError {
    #[error("reviewer not logged in")]
    NotLoggedIn,
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("reviewed the same hotel too recently")]
    TooSoon,
}

/// A city whose top-ranked hotel changed during a ranking pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderChange {
    pub city: String,
    pub hotel: String,
}

#[derive(Debug, Default)]
pub struct Store {
    users: DashMap<String, User>,
    hotels: DashMap<String, Vec<Hotel>>,
    reviews: DashMap<ReviewKey, Vec<Review>>,
    city_stats: DashMap<String, CityStats>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from persisted data and ranks every city once.
    ///
    /// Sessions never survive a restart, so every user comes back logged out.
    pub fn from_snapshot(snapshot: Snapshot, now_ms: u64) -> Self {
        let store = Self::new();

        for mut user in snapshot.users {
            user.log_out();
            store.users.insert(user.username.clone(), user);
        }
        for hotel in snapshot.hotels {
            store.hotels.entry(hotel.city.clone()).or_default().push(hotel);
        }
        for review in snapshot.reviews {
            store
                .reviews
                .entry(review_key(&review.city, &review.hotel_name))
                .or_default()
                .push(review);
        }

        store.rank_all(now_ms);
        info!(
            "Loaded {} users, {} hotels in {} cities",
            store.users.len(),
            store.hotel_count(),
            store.hotels.len()
        );
        store
    }

    /// Copies the current contents out for persistence
    pub fn snapshot(&self) -> Snapshot {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));

        let mut hotels: Vec<Hotel> = self
            .hotels
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        hotels.sort_by_key(|hotel| hotel.id);

        let mut reviews: Vec<Review> = self
            .reviews
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        reviews.sort_by_key(|review| review.time);

        Snapshot {
            users,
            hotels,
            reviews,
        }
    }

    pub fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        credentials::validate_username(username)?;
        if self.users.contains_key(username) {
            return Err(AccountError::UsernameExists);
        }
        credentials::validate_password(password)?;

        let hash = credentials::hash_password(password);
        match self.users.entry(username.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AccountError::UsernameExists),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(User::new(username, hash));
                info!("Registered user {}", username);
                Ok(())
            }
        }
    }

    /// Opens a session for `username` owned by `connection`.
    ///
    /// The logged-in check and the update happen under the user's entry lock,
    /// so two connections racing for the same account cannot both win.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        connection: ConnectionId,
    ) -> Result<(), AccountError> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or(AccountError::UnknownUser)?;
        if user.is_logged_in {
            return Err(AccountError::AlreadyLoggedIn);
        }
        if !credentials::verify_password(password, &user.password_hash) {
            return Err(AccountError::WrongPassword);
        }
        user.is_logged_in = true;
        user.id_client = Some(connection);
        debug!("User {} logged in on connection {}", username, connection);
        Ok(())
    }

    pub fn logout(&self, username: &str) -> Result<(), AccountError> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or(AccountError::NotLoggedIn)?;
        if !user.is_logged_in {
            return Err(AccountError::NotLoggedIn);
        }
        user.log_out();
        debug!("User {} logged out", username);
        Ok(())
    }

    /// Ends every session `connection` owned. Returns the affected usernames.
    pub fn release_connection(&self, connection: ConnectionId) -> Vec<String> {
        let mut released = Vec::new();
        for mut entry in self.users.iter_mut() {
            if entry.id_client == Some(connection) {
                entry.log_out();
                released.push(entry.username.clone());
            }
        }
        released
    }

    pub fn logout_all(&self) {
        for mut entry in self.users.iter_mut() {
            entry.log_out();
        }
    }

    pub fn is_logged_in(&self, username: &str) -> bool {
        self.users
            .get(username)
            .map(|user| user.is_logged_in)
            .unwrap_or(false)
    }

    pub fn badge(&self, username: &str) -> Result<Badge, AccountError> {
        let user = self.users.get(username).ok_or(AccountError::UnknownUser)?;
        if !user.is_logged_in {
            return Err(AccountError::NotLoggedIn);
        }
        Ok(user.level)
    }

    pub fn user(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|user| user.value().clone())
    }

    /// Case-insensitive name match within `city`
    pub fn search_hotel(&self, name: &str, city: &str) -> Result<HotelSummary, LookupError> {
        let hotels = self.city(city)?;
        let wanted = name.to_lowercase();
        hotels
            .iter()
            .find(|hotel| hotel.name.to_lowercase() == wanted)
            .map(Hotel::summary)
            .ok_or(LookupError::HotelNotFound)
    }

    /// Every hotel of `city` in current ranking order
    pub fn hotels_in(&self, city: &str) -> Result<Vec<HotelSummary>, LookupError> {
        let hotels = self.city(city)?;
        Ok(hotels.iter().map(Hotel::summary).collect())
    }

    /// Checks that `hotel` (exact name) exists in `city`
    pub fn locate_hotel(&self, city: &str, hotel: &str) -> Result<(), LookupError> {
        let hotels = self.city(city)?;
        if hotels.iter().any(|candidate| candidate.name == hotel) {
            Ok(())
        } else {
            Err(LookupError::HotelNotFound)
        }
    }

    #[cfg(test)]
    pub(crate) fn hotel(&self, city: &str, name: &str) -> Option<Hotel> {
        self.hotels
            .get(city)?
            .iter()
            .find(|hotel| hotel.name == name)
            .cloned()
    }

    pub fn top_hotel(&self, city: &str) -> Option<String> {
        self.hotels.get(city)?.first().map(|hotel| hotel.name.clone())
    }

    pub fn hotel_count(&self) -> usize {
        self.hotels.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn review_count(&self) -> usize {
        self.reviews.iter().map(|entry| entry.value().len()).sum()
    }

    fn city(
        &self,
        city: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Vec<Hotel>>, LookupError> {
        match self.hotels.get(city) {
            Some(hotels) if !hotels.is_empty() => Ok(hotels),
            _ => Err(LookupError::CityNotFound),
        }
    }

    /// Records a validated review and rescores the hotel's city.
    ///
    /// The review is rejected when its author reviewed the same hotel less
    /// than `cooldown_ms` before `review.time`. The city is rescored but not
    /// re-sorted; ordering changes are left to the periodic ranking pass so
    /// it can detect a new leader.
    pub fn insert_review(&self, review: Review, cooldown_ms: u64) -> Result<(), ReviewError> {
        if !self.is_logged_in(&review.user_id) {
            return Err(ReviewError::NotLoggedIn);
        }

        {
            let mut hotels = self
                .hotels
                .get_mut(&review.city)
                .filter(|hotels| !hotels.is_empty())
                .ok_or(LookupError::CityNotFound)?;
            let index = hotels
                .iter()
                .position(|hotel| hotel.name == review.hotel_name)
                .ok_or(LookupError::HotelNotFound)?;

            {
                let mut queue = self
                    .reviews
                    .entry(review_key(&review.city, &review.hotel_name))
                    .or_default();
                let last_by_author = queue
                    .iter()
                    .filter(|previous| previous.user_id == review.user_id)
                    .map(|previous| previous.time)
                    .max();
                if let Some(last) = last_by_author {
                    if review.time.saturating_sub(last) < cooldown_ms {
                        return Err(ReviewError::TooSoon);
                    }
                }
                queue.push(review.clone());
            }

            hotels[index].record_review(&review);
            self.rescore_locked(&review.city, &mut hotels, review.time);
        }

        if let Some(mut user) = self.users.get_mut(&review.user_id) {
            user.number_of_reviews_written += 1;
            user.level = Badge::for_review_count(user.number_of_reviews_written);
        }

        debug!(
            "Review by {} for {} in {} recorded",
            review.user_id, review.hotel_name, review.city
        );
        Ok(())
    }

    /// Rescores and re-sorts every city, reporting cities whose leader changed
    pub fn rank_all(&self, now_ms: u64) -> Vec<LeaderChange> {
        let cities: Vec<String> = self.hotels.iter().map(|entry| entry.key().clone()).collect();
        let mut changes = Vec::new();

        for city in cities {
            let Some(mut hotels) = self.hotels.get_mut(&city) else {
                continue;
            };
            let previous = hotels.first().map(|hotel| hotel.name.clone());

            self.rescore_locked(&city, &mut hotels, now_ms);
            ranking::sort_city(&mut hotels);

            let current = hotels.first().map(|hotel| hotel.name.clone());
            if let Some(hotel) = current {
                if previous.as_deref() != Some(hotel.as_str()) {
                    changes.push(LeaderChange {
                        city: city.clone(),
                        hotel,
                    });
                }
            }
        }

        changes
    }

    /// Full scoring pass over a city whose hotel list the caller holds
    fn rescore_locked(&self, city: &str, hotels: &mut [Hotel], now_ms: u64) {
        let relevances: Vec<f64> = hotels
            .iter()
            .map(|hotel| {
                self.reviews
                    .get(&review_key(city, &hotel.name))
                    .map(|queue| ranking::relevance(&queue, now_ms))
                    .unwrap_or(0.0)
            })
            .collect();

        let mut stats = self.city_stats.entry(city.to_string()).or_default();
        ranking::rescore_city(hotels, &relevances, &mut stats);
    }
}
