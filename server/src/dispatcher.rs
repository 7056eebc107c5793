//! Turns one decoded request into one response
//!
//! The dispatcher knows nothing about sockets: it takes the request text and
//! the id of the connection it arrived on, runs the matching handler against
//! the store, and returns a [`ServerResponse`].

use crate::credentials::CredentialError;
use crate::store::{AccountError, LookupError, ReviewError, Store};
use crate::utils::{duration_millis, get_timestamp};
use crate::ConnectionId;
use log::debug;
use shared::{
    Ratings, Request, Review, ServerResponse, CATEGORY_COUNT, MAX_SCORE, MIN_SCORE, NOT_LOGGED_IN,
};
use std::sync::Arc;
use std::time::Duration;

/// Source of the review timestamps, swappable in tests
pub type Clock = fn() -> u64;

pub struct Dispatcher {
    store: Arc<Store>,
    review_cooldown: Duration,
    clock: Clock,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, review_cooldown: Duration) -> Self {
        Self {
            store,
            review_cooldown,
            clock: get_timestamp,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn dispatch(&self, message: &str, connection: ConnectionId) -> ServerResponse {
        let request = Request::parse(message);
        let response = match request {
            Request::Register { username, password } => self.register(&username, &password),
            Request::Login { username, password } => self.login(&username, &password, connection),
            Request::Logout { username } => self.logout(&username),
            Request::SearchHotel { name, city } => self.search_hotel(&name, &city),
            Request::SearchAllHotels { city } => self.search_all_hotels(&city),
            Request::InsertReview {
                username,
                hotel,
                city,
                global_score,
                single_scores,
            } => self.insert_review(&username, &hotel, &city, &global_score, &single_scores),
            Request::ShowMyBadge { username } => self.show_badge(&username),
            Request::Invalid { command } => {
                debug!("Connection {} sent invalid request {:?}", connection, command);
                ServerResponse::InvalidRequest
            }
        };
        if response.is_success() {
            debug!("Connection {} answered with {}", connection, response.code());
        } else {
            debug!(
                "Connection {} refused with {}: {}",
                connection,
                response.code(),
                response.reason_phrase()
            );
        }
        response
    }

    /// Forgets the session owned by a connection that went away
    pub fn release(&self, connection: ConnectionId) {
        for username in self.store.release_connection(connection) {
            debug!("Logged out {} after connection {} closed", username, connection);
        }
    }

    fn register(&self, username: &str, password: &str) -> ServerResponse {
        match self.store.register(username, password) {
            Ok(()) => ServerResponse::RegisterSuccess,
            Err(AccountError::UsernameExists) => ServerResponse::UsernameExists,
            Err(AccountError::Credentials(CredentialError::InvalidUsername)) => {
                ServerResponse::InvalidUsername
            }
            Err(_) => ServerResponse::InvalidPassword,
        }
    }

    fn login(&self, username: &str, password: &str, connection: ConnectionId) -> ServerResponse {
        match self.store.login(username, password, connection) {
            Ok(()) => ServerResponse::LoginSuccess,
            Err(AccountError::AlreadyLoggedIn) => ServerResponse::AlreadyLoggedIn,
            Err(AccountError::WrongPassword) => ServerResponse::WrongPassword,
            Err(_) => ServerResponse::UnknownUsername,
        }
    }

    fn logout(&self, username: &str) -> ServerResponse {
        match self.store.logout(username) {
            Ok(()) => ServerResponse::LogoutSuccess,
            Err(_) => ServerResponse::LogoutNotLoggedIn,
        }
    }

    fn search_hotel(&self, name: &str, city: &str) -> ServerResponse {
        match self.store.search_hotel(name, city) {
            Ok(hotel) => ServerResponse::HotelFound(hotel),
            Err(LookupError::CityNotFound) => ServerResponse::HotelSearchCityNotFound,
            Err(LookupError::HotelNotFound) => ServerResponse::HotelNotInCity,
        }
    }

    fn search_all_hotels(&self, city: &str) -> ServerResponse {
        match self.store.hotels_in(city) {
            Ok(hotels) => ServerResponse::AllHotels(hotels),
            Err(_) => ServerResponse::AllHotelsCityNotFound,
        }
    }

    fn insert_review(
        &self,
        username: &str,
        hotel: &str,
        city: &str,
        global_score: &str,
        single_scores: &[String],
    ) -> ServerResponse {
        if username == NOT_LOGGED_IN {
            return ServerResponse::ReviewNoSession;
        }
        if !self.store.is_logged_in(username) {
            return ServerResponse::ReviewNotLoggedIn;
        }
        match self.store.locate_hotel(city, hotel) {
            Ok(()) => {}
            Err(LookupError::CityNotFound) => return ServerResponse::ReviewCityNotFound,
            Err(LookupError::HotelNotFound) => return ServerResponse::ReviewHotelNotFound,
        }

        let global_score = match parse_score(global_score) {
            Ok(score) => score,
            Err(ScoreError::NotInteger) => return ServerResponse::GlobalScoreNotInteger,
            Err(ScoreError::OutOfRange) => return ServerResponse::GlobalScoreOutOfRange,
        };

        if single_scores.len() != CATEGORY_COUNT {
            return ServerResponse::WrongScoreCount;
        }
        let mut scores = [0u8; CATEGORY_COUNT];
        for (slot, raw) in scores.iter_mut().zip(single_scores) {
            *slot = match parse_score(raw) {
                Ok(score) => score,
                Err(ScoreError::NotInteger) => return ServerResponse::ScoreNotInteger,
                Err(ScoreError::OutOfRange) => return ServerResponse::ScoreOutOfRange,
            };
        }

        let review = Review {
            user_id: username.to_string(),
            time: (self.clock)(),
            hotel_name: hotel.to_string(),
            city: city.to_string(),
            global_score,
            single_scores: Ratings::from_scores(scores),
        };

        match self
            .store
            .insert_review(review, duration_millis(self.review_cooldown))
        {
            Ok(()) => ServerResponse::ReviewInserted,
            Err(ReviewError::TooSoon) => ServerResponse::ReviewTooSoon,
            Err(ReviewError::NotLoggedIn) => ServerResponse::ReviewNotLoggedIn,
            Err(ReviewError::Lookup(LookupError::CityNotFound)) => {
                ServerResponse::ReviewCityNotFound
            }
            Err(ReviewError::Lookup(LookupError::HotelNotFound)) => {
                ServerResponse::ReviewHotelNotFound
            }
        }
    }

    fn show_badge(&self, username: &str) -> ServerResponse {
        if username == NOT_LOGGED_IN {
            return ServerResponse::BadgeNoSession;
        }
        match self.store.badge(username) {
            Ok(badge) => ServerResponse::Badge(badge),
            Err(AccountError::UnknownUser) => ServerResponse::BadgeUnknownUser,
            Err(_) => ServerResponse::BadgeNotLoggedIn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScoreError {
    NotInteger,
    OutOfRange,
}

fn parse_score(raw: &str) -> Result<u8, ScoreError> {
    let value: i64 = raw.parse().map_err(|_| ScoreError::NotInteger)?;
    if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
        return Err(ScoreError::OutOfRange);
    }
    u8::try_from(value).map_err(|_| ScoreError::OutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Snapshot;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Badge, Hotel};

    const START: u64 = 1_700_000_000_000;

    fn fixed_clock() -> u64 {
        START
    }

    fn dispatcher() -> Dispatcher {
        let snapshot = Snapshot {
            hotels: vec![
                Hotel::new(1, "Plaza", "Rome"),
                Hotel::new(2, "Grand Hotel", "Rome"),
                Hotel::new(3, "Ritz", "Paris"),
            ],
            ..Snapshot::default()
        };
        let store = Arc::new(Store::from_snapshot(snapshot, START));
        Dispatcher::new(store, Duration::from_secs(60)).with_clock(fixed_clock)
    }

    fn code(dispatcher: &Dispatcher, message: &str, connection: ConnectionId) -> u16 {
        dispatcher.dispatch(message, connection).code()
    }

    fn logged_in(dispatcher: &Dispatcher, username: &str, connection: ConnectionId) {
        let register = format!("register,{},Secret123", username);
        let login = format!("login,{},Secret123", username);
        assert_eq!(code(dispatcher, &register, connection), 200);
        assert_eq!(code(dispatcher, &login, connection), 201);
    }

    #[test]
    fn test_registration_codes() {
        let d = dispatcher();
        assert_eq!(code(&d, "register,bad user,Valid123", 1), 401);
        assert_eq!(code(&d, "register,,Valid123", 1), 401);
        assert_eq!(code(&d, "register,alice,short1A", 1), 402);
        assert_eq!(code(&d, "register,alice,Valid123", 1), 200);
        assert_eq!(code(&d, "register,alice,Valid123", 1), 400);
    }

    #[test]
    fn test_login_logout_codes() {
        let d = dispatcher();
        assert_eq!(code(&d, "login,alice,Valid123", 1), 404);
        assert_eq!(code(&d, "register,alice,Valid123", 1), 200);
        assert_eq!(code(&d, "login,alice,Wrong1234", 1), 405);
        assert_eq!(code(&d, "login,alice,Valid123", 1), 201);
        assert_eq!(code(&d, "login,alice,Valid123", 2), 403);
        assert_eq!(code(&d, "logout,alice", 1), 202);
        assert_eq!(code(&d, "logout,alice", 1), 406);
        assert_eq!(code(&d, "logout,ghost", 1), 406);
        assert_eq!(code(&d, "login,alice,Valid123", 2), 201);
    }

    #[test]
    fn test_search_codes() {
        let d = dispatcher();
        match d.dispatch("searchHotel,plaza,Rome", 1) {
            ServerResponse::HotelFound(hotel) => assert_eq!(hotel.name, "Plaza"),
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(code(&d, "searchHotel,Plaza,Milan", 1), 407);
        assert_eq!(code(&d, "searchHotel,Ritz,Rome", 1), 408);
        match d.dispatch("searchAllHotels,Rome", 1) {
            ServerResponse::AllHotels(hotels) => assert_eq!(hotels.len(), 2),
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(code(&d, "searchAllHotels,Milan", 1), 409);
    }

    #[test]
    fn test_review_validation_order() {
        let d = dispatcher();
        assert_eq!(code(&d, "insertReview,null,Plaza,Rome,4,5.4.3.5", 1), 411);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4,5.4.3.5", 1), 410);

        logged_in(&d, "carol", 1);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Milan,x,5.4", 1), 412);
        assert_eq!(code(&d, "insertReview,carol,plaza,Rome,x,5.4", 1), 413);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,x,5.4", 1), 415);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4.5,5.4.3.5", 1), 415);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,6,5.4", 1), 414);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,-1,5.4.3.5", 1), 414);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4,5.4", 1), 416);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4,5.4.3.5.1", 1), 416);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4,5.x.9.5", 1), 417);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4,5.9.x.5", 1), 418);
        assert_eq!(code(&d, "insertReview,carol,Plaza,Rome,4,5..3.5", 1), 417);
        assert_eq!(d.store().review_count(), 0);
    }

    #[test]
    fn test_end_to_end_review_flow() {
        let d = dispatcher();
        assert_eq!(code(&d, "register,bob,Secret123", 1), 200);
        assert_eq!(code(&d, "login,bob,Secret123", 1), 201);
        assert_eq!(code(&d, "insertReview,bob,Plaza,Rome,4,5.4.3.5", 1), 205);

        let plaza = d.store().hotel("Rome", "Plaza").unwrap();
        assert_eq!(plaza.number_of_reviews, 1);
        assert_approx_eq!(plaza.rate, 4.0, 1e-9);

        assert_eq!(code(&d, "insertReview,bob,Plaza,Rome,4,5.4.3.5", 1), 419);
        assert_eq!(d.store().hotel("Rome", "Plaza").unwrap().number_of_reviews, 1);
    }

    #[test]
    fn test_badge_codes() {
        let d = dispatcher();
        assert_eq!(code(&d, "showMyBadge,null", 1), 421);
        assert_eq!(code(&d, "showMyBadge,ghost", 1), 422);
        assert_eq!(code(&d, "register,dave,Secret123", 1), 200);
        assert_eq!(code(&d, "showMyBadge,dave", 1), 420);
        assert_eq!(code(&d, "login,dave,Secret123", 1), 201);
        assert_eq!(
            d.dispatch("showMyBadge,dave", 1),
            ServerResponse::Badge(Badge::Reviewer)
        );
    }

    #[test]
    fn test_invalid_requests() {
        let d = dispatcher();
        assert_eq!(code(&d, "dance,now", 1), 500);
        assert_eq!(code(&d, "login,bob", 1), 500);
        assert_eq!(code(&d, "", 1), 500);
        assert_eq!(code(&d, "insertReview,bob", 1), 500);
    }

    #[test]
    fn test_release_frees_the_session() {
        let d = dispatcher();
        logged_in(&d, "erin", 5);
        d.release(5);
        assert!(!d.store().is_logged_in("erin"));
        assert_eq!(code(&d, "login,erin,Secret123", 6), 201);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("0"), Ok(0));
        assert_eq!(parse_score("5"), Ok(5));
        assert_eq!(parse_score("+3"), Ok(3));
        assert_eq!(parse_score("6"), Err(ScoreError::OutOfRange));
        assert_eq!(parse_score("-2"), Err(ScoreError::OutOfRange));
        assert_eq!(parse_score(""), Err(ScoreError::NotInteger));
        assert_eq!(parse_score(" 3"), Err(ScoreError::NotInteger));
        assert_eq!(parse_score("99999999999999999999"), Err(ScoreError::NotInteger));
    }
}
